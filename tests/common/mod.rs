#![allow(dead_code)]

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use clipforge::{
    Generated, GeneratedOutput, GenerationParams, MediaNodeKind, ModelBinding, ModelBindings,
    PromptPayload,
};

/// Binding that counts calls, fails on listed prompts and answers with a URL or PNG bytes.
pub struct Scripted {
    pub calls: AtomicUsize,
    pub fail_on: Vec<&'static str>,
    pub bytes: bool,
}

impl Scripted {
    pub fn urls() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_on: Vec::new(),
            bytes: false,
        })
    }

    pub fn failing_on(prompts: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_on: prompts.to_vec(),
            bytes: false,
        })
    }

    pub fn png_bytes() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_on: Vec::new(),
            bytes: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelBinding for Scripted {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "v1"
    }

    async fn do_generate(
        &self,
        prompt: &PromptPayload,
        params: &GenerationParams,
    ) -> anyhow::Result<Generated> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.iter().any(|p| prompt.text == *p) {
            anyhow::bail!("refused prompt '{}'", prompt.text);
        }
        let output = if self.bytes {
            GeneratedOutput::Bytes(b"\x89PNG\r\n\x1a\nfake".to_vec())
        } else {
            let slug: String = prompt
                .text
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
                .collect();
            GeneratedOutput::Url(format!("https://gen.test/{slug}"))
        };
        let mut g = Generated::new(output);
        g.duration = Some(params.duration.unwrap_or(4.0));
        Ok(g)
    }
}

/// The same binding registered as the default for every media kind.
pub fn bind_all(binding: Arc<Scripted>) -> ModelBindings {
    let b: Arc<dyn ModelBinding> = binding;
    ModelBindings::new()
        .with_default(MediaNodeKind::Image, Arc::clone(&b))
        .with_default(MediaNodeKind::Video, Arc::clone(&b))
        .with_default(MediaNodeKind::Speech, Arc::clone(&b))
        .with_default(MediaNodeKind::Music, b)
}

pub fn temp_dir(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("clipforge_{tag}_{}_{nanos}", std::process::id()))
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name)
}
