use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::future::BoxFuture;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::key::{CacheKey, derive_key},
    cache::store::{MediaCache, MemoryMediaCache},
    composition::model::{MediaNode, MediaNodeKind, PromptReference},
    foundation::core::Canvas,
    foundation::error::{ClipforgeError, ClipforgeResult},
    media::fetch::{LocalFetcher, SourceFetcher},
    media::placeholder::{
        DEFAULT_PLACEHOLDER_SECS, PlaceholderGenerator, PlaceholderRequest, SolidPlaceholder,
    },
    media::provider::{
        GeneratedOutput, GenerationParams, ModelBindings, PromptAttachment, PromptPayload,
        ResolveMode,
    },
    media::reference::{MediaKind, MediaPayload, MediaReference, sniff_extension},
    timeline::model::{Warning, WarningKind},
};

#[derive(Clone)]
/// Collaborators and policy for one resolution run.
pub struct ResolveContext {
    /// Model bindings per node kind.
    pub bindings: ModelBindings,
    /// Media cache.
    pub cache: Arc<dyn MediaCache>,
    /// Placeholder drawing.
    pub placeholder: Arc<dyn PlaceholderGenerator>,
    /// Literal source loading.
    pub fetcher: Arc<dyn SourceFetcher>,
    /// Miss/failure policy.
    pub mode: ResolveMode,
    /// Stops new provider calls once cancelled.
    pub cancel: CancellationToken,
    /// Output geometry used for visual placeholders.
    pub canvas: Canvas,
}

impl ResolveContext {
    /// Context with an in-memory cache, solid placeholders, a local fetcher and default mode.
    pub fn new(canvas: Canvas) -> Self {
        Self {
            bindings: ModelBindings::new(),
            cache: Arc::new(MemoryMediaCache::new()),
            placeholder: Arc::new(SolidPlaceholder),
            fetcher: Arc::new(LocalFetcher::new()),
            mode: ResolveMode::default(),
            cancel: CancellationToken::new(),
            canvas,
        }
    }

    /// Replace the model bindings.
    pub fn with_bindings(mut self, bindings: ModelBindings) -> Self {
        self.bindings = bindings;
        self
    }

    /// Replace the cache.
    pub fn with_cache(mut self, cache: Arc<dyn MediaCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the placeholder generator.
    pub fn with_placeholder(mut self, placeholder: Arc<dyn PlaceholderGenerator>) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Replace the source fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Set the resolution mode.
    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

type Outcome = ClipforgeResult<MediaReference>;

/// Turns media nodes into [`MediaReference`]s.
///
/// Each distinct cache key is produced at most once per resolver: concurrent and repeated
/// requests for the same key await one shared outcome, success or failure.
pub struct MediaResolver {
    ctx: ResolveContext,
    inflight: Mutex<HashMap<String, Arc<OnceCell<Outcome>>>>,
    warnings: Mutex<Vec<Warning>>,
    provider_calls: AtomicUsize,
}

impl MediaResolver {
    /// Resolver over `ctx`.
    pub fn new(ctx: ResolveContext) -> Self {
        Self {
            ctx,
            inflight: Mutex::new(HashMap::new()),
            warnings: Mutex::new(Vec::new()),
            provider_calls: AtomicUsize::new(0),
        }
    }

    /// Run context.
    pub fn context(&self) -> &ResolveContext {
        &self.ctx
    }

    /// Number of provider calls issued so far.
    pub fn provider_calls(&self) -> usize {
        self.provider_calls.load(Ordering::Relaxed)
    }

    /// Drain warnings recorded during production.
    pub fn take_warnings(&self) -> Vec<Warning> {
        match self.warnings.lock() {
            Ok(mut w) => std::mem::take(&mut *w),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    /// Resolve `node` as a `kind` node.
    pub fn resolve<'a>(
        &'a self,
        node: &'a MediaNode,
        kind: MediaNodeKind,
    ) -> BoxFuture<'a, ClipforgeResult<MediaReference>> {
        Box::pin(async move {
            let key = derive_key(node, kind, &self.ctx.bindings)?;
            if key.is_source() {
                let src = node.src.as_deref().unwrap_or_default();
                let location = self.ctx.fetcher.locate(src).await?;
                tracing::debug!(src, location = %location, "literal source");
                return Ok(literal_reference(node, kind, &key, location));
            }
            let digest = key.digest();
            let cell = self.cell_for(&digest)?;
            cell.get_or_init(|| self.produce(node, kind, &key, digest.clone()))
                .await
                .clone()
        })
    }

    fn cell_for(&self, digest: &str) -> ClipforgeResult<Arc<OnceCell<Outcome>>> {
        let mut map = self
            .inflight
            .lock()
            .map_err(|_| ClipforgeError::Other(anyhow::anyhow!("resolver in-flight map poisoned")))?;
        Ok(map
            .entry(digest.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone())
    }

    fn warn(&self, kind: WarningKind, message: String, node: Option<String>) {
        let w = Warning::new(kind, message, node);
        match self.warnings.lock() {
            Ok(mut ws) => ws.push(w),
            Err(poisoned) => poisoned.into_inner().push(w),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(kind = kind.as_str(), key = %digest))]
    async fn produce(
        &self,
        node: &MediaNode,
        kind: MediaNodeKind,
        key: &CacheKey,
        digest: String,
    ) -> Outcome {
        match self.ctx.cache.get(key).await {
            Ok(Some(hit)) => {
                tracing::debug!("cache hit");
                return Ok(hit);
            }
            Ok(None) => tracing::debug!("cache miss"),
            Err(e) => {
                tracing::warn!(error = %e, "cache read failed; treating as miss");
                self.warn(WarningKind::Cache, e.to_string(), node.id.clone());
            }
        }

        let prompt = match &node.prompt {
            Some(p) => p.normalize()?,
            None => {
                return Err(ClipforgeError::resolution(format!(
                    "{} node has neither a prompt nor a src",
                    kind.as_str()
                )));
            }
        };

        if self.ctx.mode == ResolveMode::Preview {
            return self.placeholder(node, kind, &prompt.text, digest, None);
        }

        let Some(binding) = self
            .ctx
            .bindings
            .lookup(kind, node.model.as_deref())
            .cloned()
        else {
            let reason = match &node.model {
                Some(h) => format!("model '{h}' is not bound"),
                None => format!("no model bound for {} nodes", kind.as_str()),
            };
            return match self.ctx.mode {
                ResolveMode::Strict => Err(ClipforgeError::resolution(reason)),
                _ => self.placeholder(node, kind, &prompt.text, digest, Some(reason)),
            };
        };

        let mut attachments = Vec::with_capacity(prompt.references.len());
        for r in &prompt.references {
            attachments.push(match r {
                PromptReference::Literal(locator) => PromptAttachment {
                    kind: None,
                    locator: Some(locator.clone()),
                    data: MediaPayload::Bytes(Arc::new(self.ctx.fetcher.fetch(locator).await?)),
                },
                PromptReference::Media(k, n) => {
                    let resolved = self.resolve(n, *k).await?;
                    PromptAttachment {
                        kind: Some(resolved.kind),
                        locator: None,
                        data: resolved.payload,
                    }
                }
            });
        }

        if self.ctx.cancel.is_cancelled() {
            return Err(ClipforgeError::cancelled(format!(
                "run cancelled before generating {} '{}'",
                kind.as_str(),
                prompt.text
            )));
        }

        let payload = PromptPayload {
            text: prompt.text.clone(),
            attachments,
        };
        let params = GenerationParams::from_node(node);
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(provider = binding.provider(), model = binding.model_id(), "generating");

        let generated = match binding.do_generate(&payload, &params).await {
            Ok(g) => g,
            Err(e) => {
                let err =
                    ClipforgeError::provider(binding.provider(), binding.model_id(), format!("{e:#}"));
                return match self.ctx.mode {
                    ResolveMode::Strict => Err(err),
                    _ => {
                        tracing::warn!(error = %err, "generation failed; substituting placeholder");
                        self.placeholder(node, kind, &prompt.text, digest, Some(err.to_string()))
                    }
                };
            }
        };

        for w in &generated.warnings {
            self.warn(
                WarningKind::Provider,
                format!("{}/{}: {w}", binding.provider(), binding.model_id()),
                node.id.clone(),
            );
        }

        let data = match generated.output {
            GeneratedOutput::Url(url) => MediaPayload::Location(url),
            GeneratedOutput::Bytes(bytes) => self.materialize(&digest, kind, bytes, node).await,
        };
        let reference = MediaReference {
            id: digest,
            kind: kind.media_kind(),
            payload: data,
            is_placeholder: false,
            duration: generated.duration.or(node.duration),
            width: generated.width,
            height: generated.height,
            prompt_text: Some(prompt.text),
            warnings: generated.warnings,
        };

        if let Err(e) = self.ctx.cache.set(key, &reference).await {
            tracing::warn!(error = %e, "cache write failed");
            self.warn(WarningKind::Cache, e.to_string(), node.id.clone());
        }
        Ok(reference)
    }

    async fn materialize(
        &self,
        digest: &str,
        kind: MediaNodeKind,
        bytes: Vec<u8>,
        node: &MediaNode,
    ) -> MediaPayload {
        let Some(dir) = self.ctx.cache.media_dir() else {
            return MediaPayload::Bytes(Arc::new(bytes));
        };
        let path: PathBuf = dir.join(format!(
            "{digest}.{}",
            sniff_extension(&bytes, kind.media_kind())
        ));
        let written = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, &bytes).await
        }
        .await;
        match written {
            Ok(()) => MediaPayload::Location(path.to_string_lossy().into_owned()),
            Err(e) => {
                let msg = format!("write media '{}': {e}", path.display());
                tracing::warn!("{msg}");
                self.warn(WarningKind::Cache, msg, node.id.clone());
                MediaPayload::Bytes(Arc::new(bytes))
            }
        }
    }

    fn placeholder(
        &self,
        node: &MediaNode,
        kind: MediaNodeKind,
        prompt_text: &str,
        digest: String,
        reason: Option<String>,
    ) -> Outcome {
        let media_kind = kind.media_kind();
        let bytes = self.ctx.placeholder.generate_placeholder(&PlaceholderRequest {
            kind: media_kind,
            prompt_text,
            duration: node.duration,
            width: self.ctx.canvas.width,
            height: self.ctx.canvas.height,
        })?;
        let message = match &reason {
            Some(r) => format!("placeholder for {} '{prompt_text}': {r}", kind.as_str()),
            None => format!("placeholder for {} '{prompt_text}' (preview)", kind.as_str()),
        };
        self.warn(
            WarningKind::PlaceholderSubstituted,
            message,
            node.id.clone(),
        );
        let visual = kind.is_visual();
        // Audio stand-ins are real WAVs of a known length.
        let duration = match media_kind {
            MediaKind::Audio => Some(node.duration.unwrap_or(DEFAULT_PLACEHOLDER_SECS)),
            MediaKind::Image | MediaKind::Video => node.duration,
        };
        Ok(MediaReference {
            id: digest,
            kind: media_kind,
            payload: MediaPayload::Bytes(Arc::new(bytes)),
            is_placeholder: true,
            duration,
            width: visual.then_some(self.ctx.canvas.width),
            height: visual.then_some(self.ctx.canvas.height),
            prompt_text: Some(prompt_text.to_string()),
            warnings: reason.into_iter().collect(),
        })
    }
}

fn literal_reference(
    node: &MediaNode,
    kind: MediaNodeKind,
    key: &CacheKey,
    location: String,
) -> MediaReference {
    let mut r = MediaReference::located(key.digest(), kind.media_kind(), location);
    r.duration = node.duration;
    r
}

#[cfg(test)]
#[path = "../../tests/unit/resolve/resolver.rs"]
mod tests;
