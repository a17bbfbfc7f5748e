pub(crate) mod fetch;
pub(crate) mod placeholder;
pub(crate) mod provider;
pub(crate) mod reference;
