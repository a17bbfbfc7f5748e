use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::store::{FsMediaCache, MediaCache, MemoryMediaCache},
    composition::model::RenderNode,
    export::{InterchangeFormat, build_interchange},
    foundation::core::Canvas,
    foundation::error::{ClipforgeError, ClipforgeResult},
    media::fetch::{LocalFetcher, SourceFetcher},
    media::placeholder::{PlaceholderGenerator, SolidPlaceholder},
    media::provider::{ModelBindings, ResolveMode},
    media::reference::{MediaPayload, MediaReference},
    resolve::resolver::{MediaResolver, ResolveContext},
    timeline::model::{Timeline, Warning},
    walk::walker::SceneWalker,
};

#[derive(Clone, Default)]
/// Options for [`resolve_composition`].
pub struct ResolveOpts {
    /// Failure policy for unbound or failing generations.
    pub mode: ResolveMode,
    /// Durable cache directory; `None` keeps the cache in memory for this run only.
    pub cache_dir: Option<PathBuf>,
    /// Lifetime of new cache entries; `None` never expires them.
    pub cache_ttl: Option<Duration>,
    /// Explicit cache, taking precedence over `cache_dir`.
    pub cache: Option<Arc<dyn MediaCache>>,
    /// Model bindings per node kind.
    pub bindings: ModelBindings,
    /// Placeholder drawing; defaults to [`SolidPlaceholder`].
    pub placeholder: Option<Arc<dyn PlaceholderGenerator>>,
    /// Literal source loading; defaults to [`LocalFetcher`].
    pub fetcher: Option<Arc<dyn SourceFetcher>>,
    /// Stops new provider calls when cancelled.
    pub cancel: CancellationToken,
}

impl ResolveOpts {
    fn context(&self, canvas: Canvas) -> ResolveContext {
        let cache: Arc<dyn MediaCache> = match (&self.cache, &self.cache_dir) {
            (Some(c), _) => Arc::clone(c),
            (None, Some(dir)) => {
                let fs = FsMediaCache::new(dir);
                Arc::new(match self.cache_ttl {
                    Some(ttl) => fs.with_ttl(ttl),
                    None => fs,
                })
            }
            (None, None) => Arc::new(MemoryMediaCache::new()),
        };
        let mut ctx = ResolveContext::new(canvas)
            .with_bindings(self.bindings.clone())
            .with_cache(cache)
            .with_mode(self.mode)
            .with_cancel(self.cancel.clone());
        if let Some(p) = &self.placeholder {
            ctx = ctx.with_placeholder(Arc::clone(p));
        }
        if let Some(f) = &self.fetcher {
            ctx = ctx.with_fetcher(Arc::clone(f));
        }
        ctx
    }
}

/// Compile `render` into an in-memory [`Timeline`].
///
/// Media is resolved through the configured cache, bindings and placeholder generator. Payloads
/// generated as raw bytes without a durable cache stay in memory; use [`export_timeline`] to
/// materialize them.
#[tracing::instrument(level = "info", skip_all, fields(mode = %opts.mode))]
pub async fn resolve_composition(render: &RenderNode, opts: &ResolveOpts) -> ClipforgeResult<Timeline> {
    let canvas = Canvas {
        width: render.width,
        height: render.height,
    };
    let resolver = MediaResolver::new(opts.context(canvas));
    let timeline = SceneWalker::new(&resolver).walk(render).await?;
    tracing::debug!(
        provider_calls = resolver.provider_calls(),
        assets = timeline.assets.len(),
        warnings = timeline.warnings.len(),
        "composition resolved"
    );
    Ok(timeline)
}

#[derive(Clone)]
/// Options for [`export_timeline`].
pub struct ExportOpts {
    /// Resolution options.
    pub resolve: ResolveOpts,
    /// Interchange encoding.
    pub format: InterchangeFormat,
    /// Output file path.
    pub out_path: PathBuf,
    /// Whether to replace an existing output file.
    pub overwrite: bool,
}

impl Default for ExportOpts {
    fn default() -> Self {
        Self {
            resolve: ResolveOpts::default(),
            format: InterchangeFormat::default(),
            out_path: PathBuf::from("timeline.otio"),
            overwrite: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
/// Counts describing an exported timeline.
pub struct ExportSummary {
    /// Sequenced clips placed on the timeline.
    pub clip_count: usize,
    /// Video and audio tracks plus one per text lane.
    pub track_count: usize,
    /// Transitions between clips.
    pub transition_count: usize,
    /// Assets substituted by placeholders.
    pub placeholder_count: usize,
    /// Clips skipped because nothing in them resolved.
    pub skipped_clip_count: usize,
    /// Total duration in seconds.
    pub total_duration: f64,
}

impl ExportSummary {
    /// Summary of `timeline`.
    pub fn of(timeline: &Timeline) -> Self {
        Self {
            clip_count: timeline.metadata.clip_count,
            track_count: timeline.track_count(),
            transition_count: timeline.transitions.len(),
            placeholder_count: timeline.placeholder_count(),
            skipped_clip_count: timeline.metadata.skipped_clip_count,
            total_duration: timeline.duration,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
/// Outcome of [`export_timeline`].
pub struct ExportResult {
    /// Path of the written interchange file.
    pub timeline_path: PathBuf,
    /// Assets referenced by the timeline, all located on disk or remotely.
    pub assets: Vec<MediaReference>,
    /// Summary counts.
    pub summary: ExportSummary,
    /// Warnings collected during the run.
    pub warnings: Vec<Warning>,
}

/// Resolve `render` and write it as an interchange file.
///
/// In-memory payloads are written to `<stem>_media/<asset_id>.<ext>` next to the output before
/// the timeline is serialized.
#[tracing::instrument(level = "info", skip_all, fields(out = %opts.out_path.display(), format = ?opts.format))]
pub async fn export_timeline(render: &RenderNode, opts: &ExportOpts) -> ClipforgeResult<ExportResult> {
    if !opts.overwrite && tokio::fs::try_exists(&opts.out_path).await.unwrap_or(false) {
        return Err(ClipforgeError::validation(format!(
            "output '{}' already exists",
            opts.out_path.display()
        )));
    }

    let mut timeline = resolve_composition(render, &opts.resolve).await?;
    materialize_assets(&mut timeline, &opts.out_path).await?;
    let text = build_interchange(&timeline, opts.format)?;

    if let Some(parent) = opts.out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    tokio::fs::write(&opts.out_path, text)
        .await
        .with_context(|| format!("write timeline '{}'", opts.out_path.display()))?;

    let summary = ExportSummary::of(&timeline);
    tracing::info!(
        clips = summary.clip_count,
        tracks = summary.track_count,
        placeholders = summary.placeholder_count,
        duration = summary.total_duration,
        "timeline exported"
    );
    Ok(ExportResult {
        timeline_path: opts.out_path.clone(),
        assets: timeline.assets,
        summary,
        warnings: timeline.warnings,
    })
}

/// Directory in-memory payloads of an export to `out_path` are written to.
pub fn media_dir_for(out_path: &Path) -> PathBuf {
    let stem = out_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "timeline".to_string());
    out_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(format!("{stem}_media"))
}

fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

async fn materialize_assets(timeline: &mut Timeline, out_path: &Path) -> ClipforgeResult<()> {
    let dir = media_dir_for(out_path);
    let dir = std::path::absolute(&dir)
        .with_context(|| format!("resolve media dir '{}'", dir.display()))?;
    let mut created = false;
    for asset in &mut timeline.assets {
        let MediaPayload::Bytes(bytes) = &asset.payload else {
            continue;
        };
        if !created {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("create media dir '{}'", dir.display()))?;
            created = true;
        }
        let path = dir.join(format!("{}.{}", file_safe(&asset.id), asset.extension()));
        tokio::fs::write(&path, bytes.as_slice())
            .await
            .with_context(|| format!("write media '{}'", path.display()))?;
        tracing::debug!(asset = %asset.id, path = %path.display(), "materialized in-memory asset");
        asset.payload = MediaPayload::Location(path.to_string_lossy().into_owned());
    }
    Ok(())
}

#[cfg(test)]
#[path = "../tests/unit/pipeline.rs"]
mod tests;
