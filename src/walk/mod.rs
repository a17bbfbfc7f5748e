pub(crate) mod srt;
pub(crate) mod walker;
