use std::{collections::HashMap, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    composition::model::{MediaNode, MediaNodeKind},
    foundation::error::ClipforgeError,
    media::reference::{MediaKind, MediaPayload},
};

/// Model identity used in cache keys when no binding is configured for a node.
pub const UNBOUND_MODEL: &str = "unbound";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How the resolver reacts to cache misses and provider failures.
pub enum ResolveMode {
    /// Provider failures abort the run.
    Strict,
    /// Provider failures degrade to a placeholder with a warning.
    #[default]
    Default,
    /// Never call providers; every cache miss becomes a placeholder.
    Preview,
}

impl ResolveMode {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Default => "default",
            Self::Preview => "preview",
        }
    }
}

impl FromStr for ResolveMode {
    type Err = ClipforgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "default" => Ok(Self::Default),
            "preview" => Ok(Self::Preview),
            other => Err(ClipforgeError::validation(format!(
                "unknown resolve mode '{other}' (expected strict, default or preview)"
            ))),
        }
    }
}

impl std::fmt::Display for ResolveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
/// One reference asset handed to a provider alongside the prompt text.
pub struct PromptAttachment {
    /// Asset kind when known (embedded nodes); `None` for literal locators.
    pub kind: Option<MediaKind>,
    /// Original locator for literal references.
    pub locator: Option<String>,
    /// Content: fetched bytes for literal references, the resolved payload for embedded nodes.
    pub data: MediaPayload,
}

#[derive(Clone, Debug, Default)]
/// Fully resolved prompt passed to [`ModelBinding::do_generate`].
pub struct PromptPayload {
    /// Prompt text.
    pub text: String,
    /// Ordered references, resolved depth-first.
    pub attachments: Vec<PromptAttachment>,
}

#[derive(Clone, Debug, Default, PartialEq)]
/// Generation parameters taken from a media node.
pub struct GenerationParams {
    /// Aspect ratio, e.g. `9:16`.
    pub aspect_ratio: Option<String>,
    /// Size, e.g. `1024x1792`.
    pub size: Option<String>,
    /// Seed.
    pub seed: Option<u64>,
    /// Requested duration in seconds.
    pub duration: Option<f64>,
    /// Voice identity.
    pub voice: Option<String>,
}

impl GenerationParams {
    /// Extract generation parameters from a node.
    pub fn from_node(node: &MediaNode) -> Self {
        Self {
            aspect_ratio: node.aspect_ratio.clone(),
            size: node.size.clone(),
            seed: node.seed,
            duration: node.duration,
            voice: node.voice.clone(),
        }
    }
}

#[derive(Clone, Debug)]
/// Raw provider output.
pub enum GeneratedOutput {
    /// Encoded media bytes.
    Bytes(Vec<u8>),
    /// Remote location of the generated media.
    Url(String),
}

#[derive(Clone, Debug)]
/// Result of one provider call.
pub struct Generated {
    /// Produced media.
    pub output: GeneratedOutput,
    /// Provider notes.
    pub warnings: Vec<String>,
    /// Intrinsic duration in seconds.
    pub duration: Option<f64>,
    /// Pixel width.
    pub width: Option<u32>,
    /// Pixel height.
    pub height: Option<u32>,
}

impl Generated {
    /// Output with no metadata.
    pub fn new(output: GeneratedOutput) -> Self {
        Self {
            output,
            warnings: Vec::new(),
            duration: None,
            width: None,
            height: None,
        }
    }
}

#[async_trait]
/// A bound generative model.
///
/// Implementations own request shaping, authentication and transport. Errors are reported as
/// plain `anyhow` errors; the resolver attributes them to this binding's provider and model.
pub trait ModelBinding: Send + Sync {
    /// Provider name, e.g. `openai`.
    fn provider(&self) -> &str;

    /// Model id within the provider.
    fn model_id(&self) -> &str;

    /// Generate one asset.
    async fn do_generate(
        &self,
        prompt: &PromptPayload,
        params: &GenerationParams,
    ) -> anyhow::Result<Generated>;
}

/// `provider/model` identity string used in cache keys and errors.
pub fn model_identity(binding: &dyn ModelBinding) -> String {
    format!("{}/{}", binding.provider(), binding.model_id())
}

#[derive(Clone, Default)]
/// Default binding per node kind plus named overrides addressed by a node's `model` handle.
pub struct ModelBindings {
    defaults: HashMap<MediaNodeKind, Arc<dyn ModelBinding>>,
    named: HashMap<String, Arc<dyn ModelBinding>>,
}

impl ModelBindings {
    /// Empty binding table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default binding for `kind`.
    pub fn with_default(mut self, kind: MediaNodeKind, binding: Arc<dyn ModelBinding>) -> Self {
        self.defaults.insert(kind, binding);
        self
    }

    /// Register a binding addressable by `handle`.
    pub fn with_named(mut self, handle: impl Into<String>, binding: Arc<dyn ModelBinding>) -> Self {
        self.named.insert(handle.into(), binding);
        self
    }

    /// Binding for a node of `kind` with optional `model` handle.
    ///
    /// A handle that is not registered yields `None`; it does not fall back to the default.
    pub fn lookup(&self, kind: MediaNodeKind, handle: Option<&str>) -> Option<&Arc<dyn ModelBinding>> {
        match handle {
            Some(h) => self.named.get(h),
            None => self.defaults.get(&kind),
        }
    }

    /// Identity of the binding [`lookup`](Self::lookup) would select, or [`UNBOUND_MODEL`].
    pub fn identity(&self, kind: MediaNodeKind, handle: Option<&str>) -> String {
        self.lookup(kind, handle)
            .map(|b| model_identity(b.as_ref()))
            .unwrap_or_else(|| UNBOUND_MODEL.to_string())
    }
}

impl std::fmt::Debug for ModelBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut defaults: Vec<_> = self
            .defaults
            .iter()
            .map(|(k, b)| (k.as_str(), model_identity(b.as_ref())))
            .collect();
        defaults.sort();
        let mut named: Vec<_> = self
            .named
            .iter()
            .map(|(h, b)| (h.as_str(), model_identity(b.as_ref())))
            .collect();
        named.sort();
        f.debug_struct("ModelBindings")
            .field("defaults", &defaults)
            .field("named", &named)
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/provider.rs"]
mod tests;
