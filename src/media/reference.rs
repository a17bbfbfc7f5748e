use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Kind of a resolved asset.
pub enum MediaKind {
    /// Still image.
    Image,
    /// Video.
    Video,
    /// Audio (speech or music).
    Audio,
}

impl MediaKind {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Fallback file extension when the bytes carry no recognizable signature.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Image => "png",
            Self::Video => "mp4",
            Self::Audio => "wav",
        }
    }
}

/// Pick a file extension for `bytes`, sniffing common container signatures first.
pub fn sniff_extension(bytes: &[u8], kind: MediaKind) -> &'static str {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "png"
    } else if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
        "jpg"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        "wav"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "webp"
    } else if bytes.starts_with(b"ID3") || bytes.starts_with(&[0xff, 0xfb]) {
        "mp3"
    } else if bytes.len() >= 8 && &bytes[4..8] == b"ftyp" {
        if kind == MediaKind::Audio { "m4a" } else { "mp4" }
    } else {
        kind.extension()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Where a resolved asset's content lives.
pub enum MediaPayload {
    /// Local path or URL.
    Location(String),
    /// In-memory bytes; must be materialized before export or persistence.
    #[serde(skip)]
    Bytes(Arc<Vec<u8>>),
}

impl MediaPayload {
    /// Location string, if this payload is not in-memory.
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Location(l) => Some(l),
            Self::Bytes(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// Resolved asset: the output of media resolution and an entry of a timeline's asset table.
pub struct MediaReference {
    /// Stable asset id (the cache key digest).
    pub id: String,
    /// Asset kind.
    pub kind: MediaKind,
    /// Content location or bytes.
    pub payload: MediaPayload,
    /// Whether this asset stands in for failed or skipped generation.
    #[serde(default)]
    pub is_placeholder: bool,
    /// Intrinsic duration in seconds (video/audio).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Pixel width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Prompt text this asset was generated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_text: Option<String>,
    /// Provider or resolver notes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MediaReference {
    /// Reference to an existing file or URL.
    pub fn located(id: impl Into<String>, kind: MediaKind, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            payload: MediaPayload::Location(location.into()),
            is_placeholder: false,
            duration: None,
            width: None,
            height: None,
            prompt_text: None,
            warnings: Vec::new(),
        }
    }

    /// Whether the payload still lives in memory.
    pub fn is_in_memory(&self) -> bool {
        matches!(self.payload, MediaPayload::Bytes(_))
    }

    /// File extension suited to this asset's content.
    pub fn extension(&self) -> &'static str {
        match &self.payload {
            MediaPayload::Bytes(b) => sniff_extension(b, self.kind),
            MediaPayload::Location(l) => std::path::Path::new(l)
                .extension()
                .and_then(|e| e.to_str())
                .and_then(|e| match e.to_ascii_lowercase().as_str() {
                    "png" => Some("png"),
                    "jpg" | "jpeg" => Some("jpg"),
                    "webp" => Some("webp"),
                    "wav" => Some("wav"),
                    "mp3" => Some("mp3"),
                    "m4a" => Some("m4a"),
                    "mov" => Some("mov"),
                    "mp4" => Some("mp4"),
                    _ => None,
                })
                .unwrap_or(self.kind.extension()),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/reference.rs"]
mod tests;
