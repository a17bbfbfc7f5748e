use serde::Serialize;

use crate::{
    composition::model::LayoutKind,
    foundation::core::{Fps, Size, Vec2},
    media::provider::ResolveMode,
    media::reference::MediaReference,
};

#[derive(Clone, Debug, Serialize)]
/// Resolved, absolutely timed edit produced by the scene walker.
///
/// All times are seconds on the render timeline. A timeline is a pure data value: it can be
/// inspected in memory, serialized as JSON for debugging, or handed to
/// [`crate::build_interchange`] to produce an editor project file.
pub struct Timeline {
    /// Frame rate.
    pub fps: Fps,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Total duration in seconds.
    pub duration: f64,
    /// Video tracks, primary first.
    pub video_tracks: Vec<Track>,
    /// Audio tracks (clip speech, clip music, then global tracks).
    pub audio_tracks: Vec<Track>,
    /// Title, subtitle and caption overlays.
    pub text_items: Vec<TextItem>,
    /// Transitions between consecutive sequenced clips.
    pub transitions: Vec<Transition>,
    /// Asset table; every item's `asset_id` appears exactly once.
    pub assets: Vec<MediaReference>,
    /// Run information.
    pub metadata: TimelineMetadata,
    /// Warnings collected while resolving and walking.
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Debug, Default, Serialize)]
/// Run information carried by a [`Timeline`].
pub struct TimelineMetadata {
    /// Project name.
    pub name: Option<String>,
    /// Resolution mode used.
    pub mode: ResolveMode,
    /// Number of sequenced clips placed on the timeline.
    pub clip_count: usize,
    /// Number of clips skipped because nothing in them resolved.
    pub skipped_clip_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Media kind of a track.
pub enum TrackKind {
    /// Visual track.
    Video,
    /// Audio track.
    Audio,
}

#[derive(Clone, Debug, Serialize)]
/// Named lane of clip items.
pub struct Track {
    /// Track name (`V1`, `A1`, `M1`, `GM1`, ...).
    pub name: String,
    /// Track kind.
    pub kind: TrackKind,
    /// Items in ascending start order.
    pub items: Vec<ClipItem>,
}

impl Track {
    /// Empty track.
    pub fn new(name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            name: name.into(),
            kind,
            items: Vec::new(),
        }
    }

    /// End time of the last item, or `0.0`.
    pub fn end(&self) -> f64 {
        self.items
            .iter()
            .map(|i| i.start + i.duration)
            .fold(0.0, f64::max)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Placement of one asset on a track.
pub struct ClipItem {
    /// Id of an entry in [`Timeline::assets`].
    pub asset_id: String,
    /// Start on the timeline in seconds.
    pub start: f64,
    /// Duration on the timeline in seconds.
    pub duration: f64,
    /// Source in-point in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim_start: Option<f64>,
    /// Source out-point in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim_end: Option<f64>,
    /// Volume multiplier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Placement offset in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec2>,
    /// Displayed size in pixels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    /// Zoom factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    /// Spatial composite this item stands for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutDescriptor>,
    /// Index of the sequenced clip this item belongs to; `None` for render-level media.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_index: Option<usize>,
}

impl ClipItem {
    /// Item of `asset_id` over `[start, start + duration)` with no overrides.
    pub fn new(asset_id: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            asset_id: asset_id.into(),
            start,
            duration,
            trim_start: None,
            trim_end: None,
            volume: None,
            position: None,
            size: None,
            zoom: None,
            layout: None,
            clip_index: None,
        }
    }

    /// End time in seconds.
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Inspection record for split/slider/swipe/grid composites.
pub struct LayoutDescriptor {
    /// Composite kind.
    pub kind: LayoutKind,
    /// Grid column count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<u32>,
    /// Asset ids of every resolved child, in document order.
    pub asset_ids: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Origin of a text overlay.
pub enum TextKind {
    /// Title overlay.
    Title,
    /// Subtitle overlay.
    Subtitle,
    /// Caption cue.
    Caption,
}

impl TextKind {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Subtitle => "subtitle",
            Self::Caption => "caption",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Timed text overlay.
pub struct TextItem {
    /// Overlay origin.
    pub kind: TextKind,
    /// Text.
    pub text: String,
    /// Start in seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
    /// Opaque style passed through from the composition.
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub style: serde_json::Value,
}

impl TextItem {
    /// End time in seconds.
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Overlap between two consecutive sequenced clips.
pub struct Transition {
    /// Transition kind.
    pub kind: String,
    /// Overlap in seconds.
    pub duration: f64,
    /// Index of the incoming clip.
    pub clip_index: usize,
    /// Timeline time at which the overlap begins (the incoming clip's start).
    pub start: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Warning categories.
pub enum WarningKind {
    /// A placeholder stands in for an asset.
    PlaceholderSubstituted,
    /// A whole clip was dropped.
    SkippedClip,
    /// A single node was dropped.
    SkippedNode,
    /// A transition was shortened or ignored.
    TransitionAdjusted,
    /// A provider reported a note.
    Provider,
    /// The cache could not be read or written.
    Cache,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Non-fatal diagnostic.
pub struct Warning {
    /// Category.
    pub kind: WarningKind,
    /// Human-readable message.
    pub message: String,
    /// Node id or path the warning is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

impl Warning {
    /// Build a warning.
    pub fn new(kind: WarningKind, message: impl Into<String>, node: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            node,
        }
    }
}

impl Timeline {
    /// Every track, video first.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.video_tracks.iter().chain(self.audio_tracks.iter())
    }

    /// Number of tracks, counting each text lane.
    pub fn track_count(&self) -> usize {
        self.video_tracks.len() + self.audio_tracks.len() + self.text_lanes().len()
    }

    /// Text items packed greedily onto non-overlapping lanes, in start order.
    pub fn text_lanes(&self) -> Vec<Vec<&TextItem>> {
        let mut items: Vec<&TextItem> = self.text_items.iter().collect();
        items.sort_by(|a, b| a.start.total_cmp(&b.start));
        let mut lanes: Vec<Vec<&TextItem>> = Vec::new();
        for item in items {
            let free = lanes.iter_mut().find(|lane| {
                lane.last()
                    .is_none_or(|last| last.end() <= item.start + f64::EPSILON)
            });
            match free {
                Some(lane) => lane.push(item),
                None => lanes.push(vec![item]),
            }
        }
        lanes
    }

    /// Asset with `id`.
    pub fn asset(&self, id: &str) -> Option<&MediaReference> {
        self.assets.iter().find(|a| a.id == id)
    }

    /// Number of placeholder assets.
    pub fn placeholder_count(&self) -> usize {
        self.assets.iter().filter(|a| a.is_placeholder).count()
    }

    /// Track named `name`.
    pub fn track(&self, name: &str) -> Option<&Track> {
        self.tracks().find(|t| t.name == name)
    }

    /// Warnings of `kind`.
    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/model.rs"]
mod tests;
