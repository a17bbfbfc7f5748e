//! Clipforge compiles declarative video compositions into editor-importable timelines.
//!
//! A composition is a tree of clips, generated or literal media, captions and overlays. The
//! compiler walks that tree, resolves every media node (cache hit, model generation, literal
//! source or placeholder), assigns absolute timing and produces a [`Timeline`], which can be
//! serialized as OTIO-style JSON or xmeml XML:
//!
//! - Load and validate a [`RenderNode`] (or build one with [`RenderBuilder`])
//! - Configure [`ModelBindings`] and a [`MediaCache`] in [`ResolveOpts`]
//! - Call [`resolve_composition`] or [`export_timeline`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub(crate) mod cache;
pub(crate) mod composition;
pub(crate) mod export;
pub(crate) mod media;
pub(crate) mod pipeline;
pub(crate) mod resolve;
pub(crate) mod timeline;
pub(crate) mod walk;

pub use crate::foundation::core::{Canvas, Fps, Size, Vec2};
pub use crate::foundation::error::{ClipforgeError, ClipforgeResult};

pub use crate::cache::key::{CacheKey, KeyPart, ParamValue, derive_key};
pub use crate::cache::store::{CacheEntry, FsMediaCache, MediaCache, MemoryMediaCache};
pub use crate::composition::dsl::{
    ClipBuilder, MediaBuilder, RenderBuilder, image, music, speech, subtitle, title, video,
};
pub use crate::composition::model::{
    CaptionCue, CaptionsNode, ClipDuration, ClipNode, DEFAULT_FPS, DEFAULT_TRANSITION_KIND,
    LayoutKind, LayoutNode, MediaNode, MediaNodeKind, Node, NodeDescriptor, Prompt, PromptInput,
    PromptReference, ReferenceInput, RenderNode, TextNode, TransitionSpec,
};
pub use crate::export::{
    InterchangeFormat, Span, TEXT_TRACK_PREFIX, TrackLayout, TrackSpans, build_interchange,
    read_layout,
};
pub use crate::media::fetch::{LocalFetcher, SourceFetcher, is_remote};
pub use crate::media::placeholder::{
    DEFAULT_PLACEHOLDER_SECS, PlaceholderGenerator, PlaceholderRequest, SolidPlaceholder,
};
pub use crate::media::provider::{
    Generated, GeneratedOutput, GenerationParams, ModelBinding, ModelBindings, PromptAttachment,
    PromptPayload, ResolveMode, UNBOUND_MODEL, model_identity,
};
pub use crate::media::reference::{MediaKind, MediaPayload, MediaReference, sniff_extension};
pub use crate::pipeline::{
    ExportOpts, ExportResult, ExportSummary, ResolveOpts, export_timeline, media_dir_for,
    resolve_composition,
};
pub use crate::resolve::resolver::{MediaResolver, ResolveContext};
pub use crate::timeline::model::{
    ClipItem, LayoutDescriptor, TextItem, TextKind, Timeline, TimelineMetadata, Track, TrackKind,
    Transition, Warning, WarningKind,
};
pub use crate::walk::srt::parse_srt;
pub use crate::walk::walker::{DEFAULT_AUTO_CLIP_SECS, SceneWalker};
