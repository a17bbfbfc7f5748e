use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    foundation::core::{Fps, Size, Vec2},
    foundation::error::{ClipforgeError, ClipforgeResult},
    media::reference::MediaKind,
};

/// Default frame rate when a render node does not declare one.
pub const DEFAULT_FPS: u32 = 30;

/// Default transition kind when a clip declares a transition without a type.
pub const DEFAULT_TRANSITION_KIND: &str = "fade";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// One element of the declarative composition tree.
///
/// JSON form: an object with a `"type"` discriminator, e.g.
/// `{"type": "image", "prompt": "a red fox"}`.
pub enum Node {
    /// Root node carrying output geometry and frame rate.
    Render(RenderNode),
    /// Sequential time segment.
    Clip(ClipNode),
    /// Still image (generated or literal).
    Image(MediaNode),
    /// Video (generated or literal).
    Video(MediaNode),
    /// Spoken audio (generated or literal).
    Speech(MediaNode),
    /// Music bed (generated or literal).
    Music(MediaNode),
    /// Title overlay.
    Title(TextNode),
    /// Subtitle overlay.
    Subtitle(TextNode),
    /// Caption track.
    Captions(CaptionsNode),
    /// Side-by-side layout.
    Split(LayoutNode),
    /// Before/after slider layout.
    Slider(LayoutNode),
    /// Swipe-reveal layout.
    Swipe(LayoutNode),
    /// Grid layout.
    Grid(LayoutNode),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
/// Root of a composition.
pub struct RenderNode {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Frames per `fps_den` seconds.
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Frame rate denominator; `1001` gives NTSC rates such as `30000/1001`.
    #[serde(default = "default_fps_den", alias = "fpsDen")]
    pub fps_den: u32,
    /// Optional project name used by interchange exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Clips (sequenced) and global nodes.
    #[serde(default)]
    pub children: Vec<Node>,
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

fn default_fps_den() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
/// A sequential time segment.
pub struct ClipNode {
    /// Optional stable id used in warnings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Explicit duration in seconds, or `"auto"`.
    #[serde(default)]
    pub duration: ClipDuration,
    /// Transition into the next clip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionSpec>,
    /// Visual, audio and text children.
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
/// Clip duration declaration.
pub enum ClipDuration {
    /// Infer from child media, falling back to a fixed default.
    #[default]
    Auto,
    /// Explicit seconds.
    Seconds(f64),
}

impl Serialize for ClipDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Auto => serializer.serialize_str("auto"),
            Self::Seconds(s) => serializer.serialize_f64(*s),
        }
    }
}

impl<'de> Deserialize<'de> for ClipDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Secs(f64),
            Keyword(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Secs(s) => Ok(Self::Seconds(s)),
            Repr::Keyword(k) if k == "auto" => Ok(Self::Auto),
            Repr::Keyword(k) => Err(serde::de::Error::custom(format!(
                "clip duration must be a number or \"auto\", got \"{k}\""
            ))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
/// Transition from a clip into its successor.
pub struct TransitionSpec {
    /// Transition kind (`fade`, `wipe`, ...).
    #[serde(rename = "type", default = "default_transition_kind")]
    pub kind: String,
    /// Overlap in seconds.
    pub duration: f64,
}

fn default_transition_kind() -> String {
    DEFAULT_TRANSITION_KIND.to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
/// Media-producing node (image, video, speech, music).
pub struct MediaNode {
    /// Optional stable id used in warnings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Generation prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptInput>,
    /// Literal source locator (local path or URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// Named model handle overriding the default binding for this kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Generation aspect ratio, e.g. `9:16`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    /// Generation size, e.g. `1024x1792`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Generation seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Requested/declared media duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Voice identity for speech.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    /// Playback volume multiplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Start offset in seconds for render-level (global) media.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    /// Source trim start in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_start: Option<f64>,
    /// Source trim end in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_end: Option<f64>,
    /// Placement offset in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec2>,
    /// Displayed size in pixels.
    #[serde(default, alias = "scale_to", skip_serializing_if = "Option::is_none")]
    pub display_size: Option<Size>,
    /// Zoom factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
/// Prompt as written in the composition: plain text or text with references.
pub enum PromptInput {
    /// Plain prompt text.
    Text(String),
    /// Prompt text with ordered reference assets.
    Structured {
        /// Prompt text.
        text: String,
        /// Reference assets, literal locators or embedded media nodes.
        #[serde(default, alias = "images")]
        references: Vec<ReferenceInput>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
/// One prompt reference as written in the composition.
pub enum ReferenceInput {
    /// Local path or URL.
    Literal(String),
    /// Embedded producible node.
    Node(Box<Node>),
}

#[derive(Clone, Debug)]
/// Canonical prompt representation used past the resolver boundary.
pub struct Prompt {
    /// Prompt text.
    pub text: String,
    /// Ordered references.
    pub references: Vec<PromptReference>,
}

#[derive(Clone, Debug)]
/// Canonical prompt reference.
pub enum PromptReference {
    /// Literal locator.
    Literal(String),
    /// Producible media node that must be resolved before the outer node.
    Media(MediaNodeKind, Box<MediaNode>),
}

impl PromptInput {
    /// Normalize either prompt shape into [`Prompt`].
    pub fn normalize(&self) -> ClipforgeResult<Prompt> {
        match self {
            Self::Text(text) => Ok(Prompt {
                text: text.clone(),
                references: Vec::new(),
            }),
            Self::Structured { text, references } => {
                let references = references
                    .iter()
                    .map(|r| match r {
                        ReferenceInput::Literal(s) => Ok(PromptReference::Literal(s.clone())),
                        ReferenceInput::Node(node) => match node.as_media() {
                            Some((kind, media)) => {
                                Ok(PromptReference::Media(kind, Box::new(media.clone())))
                            }
                            None => Err(ClipforgeError::resolution(format!(
                                "prompt reference must be a media node, got '{}'",
                                node.kind_name()
                            ))),
                        },
                    })
                    .collect::<ClipforgeResult<Vec<_>>>()?;
                Ok(Prompt {
                    text: text.clone(),
                    references,
                })
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Media-producing node kinds.
pub enum MediaNodeKind {
    /// Still image.
    Image,
    /// Video.
    Video,
    /// Speech audio.
    Speech,
    /// Music audio.
    Music,
}

impl MediaNodeKind {
    /// Kind of asset this node produces.
    pub fn media_kind(self) -> MediaKind {
        match self {
            Self::Image => MediaKind::Image,
            Self::Video => MediaKind::Video,
            Self::Speech | Self::Music => MediaKind::Audio,
        }
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Speech => "speech",
            Self::Music => "music",
        }
    }

    /// Whether the node contributes visuals.
    pub fn is_visual(self) -> bool {
        matches!(self, Self::Image | Self::Video)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
/// Title or subtitle overlay.
pub struct TextNode {
    /// Overlay text.
    pub text: String,
    /// Start offset in seconds, relative to the containing interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    /// End offset in seconds, relative to the containing interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    /// Opaque style object passed through to exports.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub style: serde_json::Value,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
/// Caption track.
pub struct CaptionsNode {
    /// Explicit cues.
    #[serde(default)]
    pub cues: Vec<CaptionCue>,
    /// Single caption spanning the whole render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// SRT file locator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// Opaque style object passed through to exports.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub style: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// One caption cue in render time.
pub struct CaptionCue {
    /// Cue text.
    pub text: String,
    /// Start in seconds.
    pub start: f64,
    /// End in seconds.
    pub end: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
/// Multi-child spatial layout.
pub struct LayoutNode {
    /// Layout children.
    #[serde(default)]
    pub children: Vec<Node>,
    /// Grid column count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<u32>,
    /// Layout direction hint (`horizontal` / `vertical`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Spatial composite kinds.
pub enum LayoutKind {
    /// Side by side.
    Split,
    /// Before/after slider.
    Slider,
    /// Swipe reveal.
    Swipe,
    /// Grid.
    Grid,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Nested, inspection-only description of a node and its children.
pub struct NodeDescriptor {
    /// Node kind name.
    pub kind: &'static str,
    /// Short human label (prompt text, source, overlay text).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Child descriptors.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDescriptor>,
}

impl Node {
    /// Stable lowercase kind name.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Render(_) => "render",
            Self::Clip(_) => "clip",
            Self::Image(_) => "image",
            Self::Video(_) => "video",
            Self::Speech(_) => "speech",
            Self::Music(_) => "music",
            Self::Title(_) => "title",
            Self::Subtitle(_) => "subtitle",
            Self::Captions(_) => "captions",
            Self::Split(_) => "split",
            Self::Slider(_) => "slider",
            Self::Swipe(_) => "swipe",
            Self::Grid(_) => "grid",
        }
    }

    /// Media payload of a media-producing node.
    pub fn as_media(&self) -> Option<(MediaNodeKind, &MediaNode)> {
        match self {
            Self::Image(m) => Some((MediaNodeKind::Image, m)),
            Self::Video(m) => Some((MediaNodeKind::Video, m)),
            Self::Speech(m) => Some((MediaNodeKind::Speech, m)),
            Self::Music(m) => Some((MediaNodeKind::Music, m)),
            _ => None,
        }
    }

    /// Layout payload of a structural composite.
    pub fn as_layout(&self) -> Option<(LayoutKind, &LayoutNode)> {
        match self {
            Self::Split(l) => Some((LayoutKind::Split, l)),
            Self::Slider(l) => Some((LayoutKind::Slider, l)),
            Self::Swipe(l) => Some((LayoutKind::Swipe, l)),
            Self::Grid(l) => Some((LayoutKind::Grid, l)),
            _ => None,
        }
    }

    /// Describe this node and its children recursively.
    pub fn describe(&self) -> NodeDescriptor {
        let (label, children): (Option<String>, &[Node]) = match self {
            Self::Render(r) => (r.name.clone(), &r.children),
            Self::Clip(c) => (c.id.clone(), &c.children),
            Self::Image(m) | Self::Video(m) | Self::Speech(m) | Self::Music(m) => {
                (media_label(m), &[])
            }
            Self::Title(t) | Self::Subtitle(t) => (Some(t.text.clone()), &[]),
            Self::Captions(c) => (c.text.clone().or_else(|| c.src.clone()), &[]),
            Self::Split(l) | Self::Slider(l) | Self::Swipe(l) | Self::Grid(l) => {
                (None, &l.children)
            }
        };
        NodeDescriptor {
            kind: self.kind_name(),
            label,
            children: children.iter().map(Node::describe).collect(),
        }
    }
}

fn media_label(m: &MediaNode) -> Option<String> {
    match (&m.prompt, &m.src) {
        (Some(PromptInput::Text(t)), _) => Some(t.clone()),
        (Some(PromptInput::Structured { text, .. }), _) => Some(text.clone()),
        (None, Some(src)) => Some(src.clone()),
        (None, None) => None,
    }
}

impl RenderNode {
    /// Parse a render tree from a JSON reader. The root must be a `render` node.
    pub fn from_reader<R: std::io::Read>(r: R) -> ClipforgeResult<Self> {
        let node: Node = serde_json::from_reader(r)
            .map_err(|e| ClipforgeError::validation(format!("parse composition JSON: {e}")))?;
        Self::from_node(node)
    }

    /// Parse a render tree from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> ClipforgeResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            ClipforgeError::validation(format!("open composition JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Unwrap a root [`Node::Render`].
    pub fn from_node(node: Node) -> ClipforgeResult<Self> {
        match node {
            Node::Render(r) => Ok(r),
            other => Err(ClipforgeError::validation(format!(
                "composition root must be a render node, got '{}'",
                other.kind_name()
            ))),
        }
    }

    /// Validated frame rate.
    pub fn frame_rate(&self) -> ClipforgeResult<Fps> {
        Fps::new(self.fps, self.fps_den)
    }

    /// Number of immediate `clip` children.
    pub fn clip_count(&self) -> usize {
        self.children
            .iter()
            .filter(|c| matches!(c, Node::Clip(_)))
            .count()
    }

    /// Validate structural and numeric invariants.
    ///
    /// Missing prompts/sources are not validation failures; the walker skips such nodes with a
    /// warning.
    pub fn validate(&self) -> ClipforgeResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ClipforgeError::validation("render width/height must be > 0"));
        }
        if self.fps == 0 || self.fps_den == 0 {
            return Err(ClipforgeError::validation("render fps must be > 0"));
        }
        for child in &self.children {
            validate_node(child)?;
        }
        Ok(())
    }
}

fn validate_node(node: &Node) -> ClipforgeResult<()> {
    match node {
        Node::Render(_) => Err(ClipforgeError::validation(
            "render nodes must not be nested",
        )),
        Node::Clip(c) => {
            if let ClipDuration::Seconds(s) = c.duration
                && (!s.is_finite() || s <= 0.0)
            {
                return Err(ClipforgeError::validation(
                    "clip duration must be finite and > 0",
                ));
            }
            if let Some(tr) = &c.transition {
                tr.validate()?;
            }
            for child in &c.children {
                if matches!(child, Node::Clip(_)) {
                    return Err(ClipforgeError::validation("clips must not be nested"));
                }
                validate_node(child)?;
            }
            Ok(())
        }
        Node::Image(m) | Node::Video(m) | Node::Speech(m) | Node::Music(m) => {
            validate_media(m, node.kind_name())
        }
        Node::Title(t) | Node::Subtitle(t) => {
            if t.text.trim().is_empty() {
                return Err(ClipforgeError::validation(format!(
                    "{} text must be non-empty",
                    node.kind_name()
                )));
            }
            validate_window(t.start, t.end, node.kind_name())
        }
        Node::Captions(c) => {
            for cue in &c.cues {
                if !cue.start.is_finite() || !cue.end.is_finite() || cue.start < 0.0 {
                    return Err(ClipforgeError::validation(
                        "caption cue times must be finite and >= 0",
                    ));
                }
                if cue.end <= cue.start {
                    return Err(ClipforgeError::validation(
                        "caption cue end must be > start",
                    ));
                }
            }
            Ok(())
        }
        Node::Split(l) | Node::Slider(l) | Node::Swipe(l) | Node::Grid(l) => {
            if matches!(node, Node::Grid(_)) && l.columns == Some(0) {
                return Err(ClipforgeError::validation("grid columns must be > 0"));
            }
            for child in &l.children {
                if matches!(child, Node::Clip(_) | Node::Render(_)) {
                    return Err(ClipforgeError::validation(format!(
                        "{} children must not be clips",
                        node.kind_name()
                    )));
                }
                validate_node(child)?;
            }
            Ok(())
        }
    }
}

fn validate_media(m: &MediaNode, kind: &str) -> ClipforgeResult<()> {
    for (name, value) in [
        ("duration", m.duration),
        ("trim_start", m.trim_start),
        ("trim_end", m.trim_end),
        ("start", m.start),
        ("volume", m.volume),
        ("zoom", m.zoom),
    ] {
        if let Some(v) = value
            && (!v.is_finite() || v < 0.0)
        {
            return Err(ClipforgeError::validation(format!(
                "{kind} {name} must be finite and >= 0",
            )));
        }
    }
    if let Some(d) = m.duration
        && d == 0.0
    {
        return Err(ClipforgeError::validation(format!(
            "{kind} duration must be > 0 when set"
        )));
    }
    if let (Some(a), Some(b)) = (m.trim_start, m.trim_end)
        && b <= a
    {
        return Err(ClipforgeError::validation(format!(
            "{kind} trim_end must be > trim_start"
        )));
    }
    if let Some(PromptInput::Structured { references, .. }) = &m.prompt {
        for r in references {
            if let ReferenceInput::Node(n) = r {
                validate_node(n)?;
            }
        }
    }
    Ok(())
}

fn validate_window(start: Option<f64>, end: Option<f64>, kind: &str) -> ClipforgeResult<()> {
    for v in [start, end].into_iter().flatten() {
        if !v.is_finite() || v < 0.0 {
            return Err(ClipforgeError::validation(format!(
                "{kind} start/end must be finite and >= 0"
            )));
        }
    }
    if let (Some(s), Some(e)) = (start, end)
        && e <= s
    {
        return Err(ClipforgeError::validation(format!(
            "{kind} end must be > start"
        )));
    }
    Ok(())
}

impl TransitionSpec {
    /// Validate transition payload invariants.
    pub fn validate(&self) -> ClipforgeResult<()> {
        if self.kind.trim().is_empty() {
            return Err(ClipforgeError::validation("transition kind must be non-empty"));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(ClipforgeError::validation(
                "transition duration must be finite and > 0",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/composition/model.rs"]
mod tests;
