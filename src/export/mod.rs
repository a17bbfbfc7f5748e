//! Interchange serialization of [`Timeline`] values.
//!
//! Two encodings are supported: an OTIO-style JSON document and an xmeml (version 5) XML
//! document. Both quantize time to frames with [`Fps::secs_to_frames_round`]; an item's frame
//! span is `q(start)..q(start + duration)` so adjacent items never drift apart.

pub(crate) mod otio;
pub(crate) mod xml;
pub(crate) mod xmeml;

use std::{collections::HashMap, str::FromStr};

use serde::Serialize;

use crate::{
    foundation::core::Fps,
    foundation::error::{ClipforgeError, ClipforgeResult},
    media::reference::{MediaPayload, MediaReference},
    media::fetch::is_remote,
    timeline::model::{ClipItem, Timeline, Track},
};

/// Name prefix of the lanes text overlays are laid out on.
pub const TEXT_TRACK_PREFIX: &str = "T";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Interchange encodings.
pub enum InterchangeFormat {
    /// OTIO-style JSON (`.otio`).
    #[default]
    Json,
    /// xmeml v5 XML (`.xml`).
    Xml,
}

impl InterchangeFormat {
    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "otio",
            Self::Xml => "xml",
        }
    }
}

impl FromStr for InterchangeFormat {
    type Err = ClipforgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "otio" => Ok(Self::Json),
            "xml" | "xmeml" | "fcpxml7" => Ok(Self::Xml),
            other => Err(ClipforgeError::validation(format!(
                "unknown interchange format '{other}' (expected json or xml)"
            ))),
        }
    }
}

/// Serialize `timeline` in `format`.
#[tracing::instrument(level = "debug", skip(timeline))]
pub fn build_interchange(timeline: &Timeline, format: InterchangeFormat) -> ClipforgeResult<String> {
    let assets = check_exportable(timeline)?;
    match format {
        InterchangeFormat::Json => otio::build(timeline, &assets),
        InterchangeFormat::Xml => xmeml::build(timeline, &assets),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Time span in seconds.
pub struct Span {
    /// Start in seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Spans of one track, in placement order.
pub struct TrackSpans {
    /// Track name.
    pub name: String,
    /// Item spans.
    pub spans: Vec<Span>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Per-track item layout, used to verify interchange round trips.
pub struct TrackLayout {
    /// Frame rate of the layout.
    pub rate: f64,
    /// Tracks in serialization order: video, text lanes, audio.
    pub tracks: Vec<TrackSpans>,
    /// Number of transition elements.
    pub transitions: usize,
}

impl TrackLayout {
    /// Exact (unquantized) layout of an in-memory timeline.
    ///
    /// Overlapping items end where the next item on their track starts, which is how both
    /// encodings place them.
    pub fn from_timeline(timeline: &Timeline) -> Self {
        let media = |t: &Track| {
            let items = sorted_items(t);
            let spans = items
                .iter()
                .enumerate()
                .map(|(n, i)| {
                    let mut duration = i.duration;
                    if let Some(end) = i.trim_end {
                        duration = duration.min(end - i.trim_start.unwrap_or(0.0));
                    }
                    if let Some(next) = items.get(n + 1) {
                        duration = duration.min(next.start - i.start);
                    }
                    Span {
                        start: i.start,
                        duration,
                    }
                })
                .collect();
            TrackSpans {
                name: t.name.clone(),
                spans,
            }
        };
        let mut tracks: Vec<TrackSpans> = timeline.video_tracks.iter().map(media).collect();
        for (n, lane) in timeline.text_lanes().iter().enumerate() {
            tracks.push(TrackSpans {
                name: format!("{TEXT_TRACK_PREFIX}{}", n + 1),
                spans: lane
                    .iter()
                    .map(|i| Span {
                        start: i.start,
                        duration: i.duration,
                    })
                    .collect(),
            });
        }
        tracks.extend(timeline.audio_tracks.iter().map(media));
        Self {
            rate: timeline.fps.as_f64(),
            tracks,
            transitions: timeline.transitions.len(),
        }
    }

    /// Track named `name`.
    pub fn track(&self, name: &str) -> Option<&TrackSpans> {
        self.tracks.iter().find(|t| t.name == name)
    }
}

/// Recover the track layout from serialized interchange text.
pub fn read_layout(text: &str, format: InterchangeFormat) -> ClipforgeResult<TrackLayout> {
    match format {
        InterchangeFormat::Json => otio::read_layout(text),
        InterchangeFormat::Xml => xmeml::read_layout(text),
    }
}

/// Items of `track` in ascending start order.
pub(crate) fn sorted_items(track: &Track) -> Vec<&ClipItem> {
    let mut items: Vec<&ClipItem> = track.items.iter().collect();
    items.sort_by(|a, b| a.start.total_cmp(&b.start));
    items
}

/// A media item as laid out on its track, in frames.
///
/// Tracks are strictly sequential: when an item overlaps the next one it is cut at the next
/// item's start, and the frames past the cut become the tail handle played under the transition.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CutItem<'a> {
    pub(crate) item: &'a ClipItem,
    /// Record start frame.
    pub(crate) start: u64,
    /// Record length after the cut.
    pub(crate) duration: u64,
    /// First source frame.
    pub(crate) source_in: u64,
    /// Frames this item keeps playing past its cut.
    pub(crate) tail: u64,
}

impl CutItem<'_> {
    pub(crate) fn end(&self) -> u64 {
        self.start + self.duration
    }
}

/// Quantize and cut the items of `track` so that no two items overlap.
pub(crate) fn cut_track(track: &Track, q: Quantizer) -> ClipforgeResult<Vec<CutItem<'_>>> {
    let what = format!("{} item", track.name);
    let mut placed = Vec::with_capacity(track.items.len());
    for item in sorted_items(track) {
        let (start, mut duration) = q.span(item.start, item.duration, &what)?;
        let source_in = q.frames(item.trim_start.unwrap_or(0.0), &what)?;
        if let Some(end) = item.trim_end {
            let source_end = q.frames(end, &what)?;
            duration = duration.min(source_end.saturating_sub(source_in));
        }
        placed.push(CutItem {
            item,
            start,
            duration,
            source_in,
            tail: 0,
        });
    }
    for i in 1..placed.len() {
        let next_start = placed[i].start;
        let prev = &mut placed[i - 1];
        if prev.end() > next_start {
            let cut = next_start - prev.start;
            prev.tail = prev.duration - cut;
            prev.duration = cut;
        }
    }
    Ok(placed)
}

/// Seconds-to-frames conversion with finite/non-negative checks.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Quantizer {
    pub(crate) fps: Fps,
}

impl Quantizer {
    pub(crate) fn frames(self, secs: f64, what: &str) -> ClipforgeResult<u64> {
        if !secs.is_finite() {
            return Err(ClipforgeError::serialization(format!(
                "{what} is not a finite time ({secs})"
            )));
        }
        if secs < 0.0 {
            return Err(ClipforgeError::serialization(format!(
                "{what} is negative ({secs})"
            )));
        }
        Ok(self.fps.secs_to_frames_round(secs))
    }

    /// Frame span of `[start, start + duration)`.
    pub(crate) fn span(self, start: f64, duration: f64, what: &str) -> ClipforgeResult<(u64, u64)> {
        let s = self.frames(start, what)?;
        let e = self.frames(start + duration, what)?;
        Ok((s, e.saturating_sub(s)))
    }
}

/// URL form of a location: remote URLs unchanged, absolute paths as `file://` URLs.
pub(crate) fn to_url(location: &str) -> String {
    if is_remote(location) || location.starts_with("file://") {
        return location.to_string();
    }
    let p = location.replace('\\', "/");
    let encoded = p.replace('%', "%25").replace(' ', "%20");
    if p.starts_with('/') {
        format!("file://{encoded}")
    } else if p.len() > 1 && p.as_bytes()[1] == b':' {
        format!("file:///{encoded}")
    } else {
        encoded
    }
}

/// Index assets by id and reject timelines that cannot be serialized.
fn check_exportable(timeline: &Timeline) -> ClipforgeResult<HashMap<&str, &MediaReference>> {
    let assets: HashMap<&str, &MediaReference> =
        timeline.assets.iter().map(|a| (a.id.as_str(), a)).collect();
    if !timeline.duration.is_finite() || timeline.duration < 0.0 {
        return Err(ClipforgeError::serialization(format!(
            "timeline duration is not a finite time ({})",
            timeline.duration
        )));
    }
    for track in timeline.tracks() {
        for item in &track.items {
            let Some(asset) = assets.get(item.asset_id.as_str()) else {
                return Err(ClipforgeError::serialization(format!(
                    "track {} references unknown asset '{}'",
                    track.name, item.asset_id
                )));
            };
            if let MediaPayload::Bytes(_) = asset.payload {
                return Err(ClipforgeError::serialization(format!(
                    "asset '{}' is still in memory; materialize it before export",
                    asset.id
                )));
            }
            for (what, v) in [("start", item.start), ("duration", item.duration)] {
                if !v.is_finite() || v < 0.0 {
                    return Err(ClipforgeError::serialization(format!(
                        "track {} item {what} is not a finite non-negative time ({v})",
                        track.name
                    )));
                }
            }
        }
    }
    for t in &timeline.text_items {
        if !t.start.is_finite() || !t.duration.is_finite() {
            return Err(ClipforgeError::serialization(format!(
                "text item '{}' has a non-finite time",
                t.text
            )));
        }
    }
    Ok(assets)
}

#[cfg(test)]
#[path = "../../tests/unit/export/mod.rs"]
mod tests;
