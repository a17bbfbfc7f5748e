use super::*;
use crate::composition::model::{Node, PromptInput, ReferenceInput};
use crate::media::provider::{Generated, ModelBinding};
use crate::media::reference::MediaKind;
use async_trait::async_trait;
use std::time::Duration;

struct Counting {
    calls: AtomicUsize,
    fail: bool,
    delay: Duration,
}

impl Counting {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
            delay: Duration::from_millis(20),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
            delay: Duration::ZERO,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelBinding for Counting {
    fn provider(&self) -> &str {
        "fake"
    }

    fn model_id(&self) -> &str {
        "m1"
    }

    async fn do_generate(
        &self,
        prompt: &PromptPayload,
        _params: &GenerationParams,
    ) -> anyhow::Result<Generated> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            anyhow::bail!("quota exceeded");
        }
        let mut g = Generated::new(GeneratedOutput::Url(format!(
            "https://cdn.fake/{}?refs={}",
            prompt.text.replace(' ', "_"),
            prompt.attachments.len()
        )));
        g.duration = Some(4.0);
        Ok(g)
    }
}

fn canvas() -> Canvas {
    Canvas {
        width: 64,
        height: 36,
    }
}

fn node(text: &str) -> MediaNode {
    MediaNode {
        prompt: Some(PromptInput::Text(text.to_string())),
        ..MediaNode::default()
    }
}

fn resolver(binding: Arc<Counting>, mode: ResolveMode) -> MediaResolver {
    let bindings = ModelBindings::new()
        .with_default(MediaNodeKind::Image, binding.clone())
        .with_default(MediaNodeKind::Video, binding);
    MediaResolver::new(
        ResolveContext::new(canvas())
            .with_bindings(bindings)
            .with_mode(mode),
    )
}

#[tokio::test]
async fn concurrent_requests_share_one_production() {
    let binding = Counting::ok();
    let r = resolver(binding.clone(), ResolveMode::Default);
    let a = node("a red fox");
    let b = node("a red fox");
    let (x, y) = tokio::join!(
        r.resolve(&a, MediaNodeKind::Image),
        r.resolve(&b, MediaNodeKind::Image)
    );
    let (x, y) = (x.unwrap(), y.unwrap());
    assert_eq!(x, y);
    assert_eq!(binding.calls(), 1);
    assert_eq!(r.provider_calls(), 1);

    // Repeated requests later in the run reuse the same outcome.
    r.resolve(&a, MediaNodeKind::Image).await.unwrap();
    assert_eq!(binding.calls(), 1);
}

#[tokio::test]
async fn nested_references_resolve_before_the_outer_node() {
    let binding = Counting::ok();
    let r = resolver(binding.clone(), ResolveMode::Default);
    let outer = MediaNode {
        prompt: Some(PromptInput::Structured {
            text: "the fox runs".into(),
            references: vec![ReferenceInput::Node(Box::new(Node::Image(node("a fox"))))],
        }),
        ..MediaNode::default()
    };
    let out = r.resolve(&outer, MediaNodeKind::Video).await.unwrap();
    assert_eq!(binding.calls(), 2);
    assert_eq!(out.kind, MediaKind::Video);
    assert_eq!(
        out.payload.location(),
        Some("https://cdn.fake/the_fox_runs?refs=1")
    );
    // The nested image is now cached for the run.
    r.resolve(&node("a fox"), MediaNodeKind::Image).await.unwrap();
    assert_eq!(binding.calls(), 2);
}

#[tokio::test]
async fn strict_mode_propagates_provider_errors() {
    let binding = Counting::failing();
    let r = resolver(binding.clone(), ResolveMode::Strict);
    let err = r.resolve(&node("x"), MediaNodeKind::Image).await.unwrap_err();
    assert_eq!(err.to_string(), "provider error (fake/m1): quota exceeded");
    // The failure is shared, not retried.
    assert!(r.resolve(&node("x"), MediaNodeKind::Image).await.is_err());
    assert_eq!(binding.calls(), 1);
}

#[tokio::test]
async fn default_mode_substitutes_placeholder_and_does_not_persist_it() {
    let binding = Counting::failing();
    let cache = Arc::new(MemoryMediaCache::new());
    let bindings = ModelBindings::new().with_default(MediaNodeKind::Image, binding.clone());
    let r = MediaResolver::new(
        ResolveContext::new(canvas())
            .with_bindings(bindings)
            .with_cache(cache.clone()),
    );
    let out = r.resolve(&node("x"), MediaNodeKind::Image).await.unwrap();
    assert!(out.is_placeholder);
    assert!(out.is_in_memory());
    assert_eq!((out.width, out.height), (Some(64), Some(36)));
    assert!(cache.is_empty().await);
    let warnings = r.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::PlaceholderSubstituted);
    assert!(warnings[0].message.contains("quota exceeded"));
}

#[tokio::test]
async fn preview_never_calls_providers() {
    let binding = Counting::ok();
    let r = resolver(binding.clone(), ResolveMode::Preview);
    let out = r.resolve(&node("x"), MediaNodeKind::Video).await.unwrap();
    assert!(out.is_placeholder);
    assert_eq!(binding.calls(), 0);
}

#[tokio::test]
async fn cache_hits_skip_generation_across_resolvers() {
    let binding = Counting::ok();
    let cache: Arc<dyn MediaCache> = Arc::new(MemoryMediaCache::new());
    let make = || {
        MediaResolver::new(
            ResolveContext::new(canvas())
                .with_bindings(ModelBindings::new().with_default(MediaNodeKind::Image, binding.clone()))
                .with_cache(cache.clone()),
        )
    };
    let first = make().resolve(&node("x"), MediaNodeKind::Image).await.unwrap();
    let second = make().resolve(&node("x"), MediaNodeKind::Image).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(binding.calls(), 1);
}

#[tokio::test]
async fn unbound_kind_is_recoverable_in_strict_and_placeholder_in_default() {
    let strict = resolver(Counting::ok(), ResolveMode::Strict);
    let err = strict.resolve(&node("hi"), MediaNodeKind::Speech).await.unwrap_err();
    assert!(err.is_recoverable());

    let default = resolver(Counting::ok(), ResolveMode::Default);
    let out = default.resolve(&node("hi"), MediaNodeKind::Speech).await.unwrap();
    assert!(out.is_placeholder);
    assert_eq!(out.kind, MediaKind::Audio);
    assert_eq!(out.duration, Some(DEFAULT_PLACEHOLDER_SECS));

    let timed = MediaNode {
        duration: Some(1.25),
        ..node("a short line")
    };
    let out = default.resolve(&timed, MediaNodeKind::Speech).await.unwrap();
    assert_eq!(out.duration, Some(1.25));
}

#[tokio::test]
async fn cancellation_stops_new_provider_calls() {
    let binding = Counting::ok();
    let token = CancellationToken::new();
    let r = MediaResolver::new(
        ResolveContext::new(canvas())
            .with_bindings(ModelBindings::new().with_default(MediaNodeKind::Image, binding.clone()))
            .with_cancel(token.clone()),
    );
    token.cancel();
    let err = r.resolve(&node("x"), MediaNodeKind::Image).await.unwrap_err();
    assert!(matches!(err, ClipforgeError::Cancelled(_)));
    assert_eq!(binding.calls(), 0);
}

#[tokio::test]
async fn literal_sources_bypass_the_cache() {
    let dir = std::env::temp_dir().join(format!("clipforge_literal_{}", std::process::id()));
    std::fs::create_dir_all(dir.join("media")).unwrap();
    std::fs::write(dir.join("media/intro.mp4"), b"not really a video").unwrap();

    let binding = Counting::ok();
    let r = MediaResolver::new(
        ResolveContext::new(canvas())
            .with_bindings(ModelBindings::new().with_default(MediaNodeKind::Video, binding.clone()))
            .with_fetcher(Arc::new(LocalFetcher::with_root(&dir)))
            .with_mode(ResolveMode::Strict),
    );
    let n = MediaNode {
        src: Some("media/intro.mp4".into()),
        duration: Some(2.0),
        ..MediaNode::default()
    };
    let out = r.resolve(&n, MediaNodeKind::Video).await.unwrap();
    let location = out.payload.location().unwrap();
    assert!(std::path::Path::new(location).is_absolute(), "{location}");
    assert!(location.ends_with("intro.mp4"));
    assert_eq!(out.duration, Some(2.0));
    assert_eq!(binding.calls(), 0);

    let remote = MediaNode {
        src: Some("https://cdn.example.com/b-roll.mp4".into()),
        ..MediaNode::default()
    };
    let out = r.resolve(&remote, MediaNodeKind::Video).await.unwrap();
    assert_eq!(out.payload.location(), Some("https://cdn.example.com/b-roll.mp4"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn missing_literal_source_fails_even_in_strict_mode() {
    let r = resolver(Counting::ok(), ResolveMode::Strict);
    let n = MediaNode {
        src: Some("/definitely/not/here.png".into()),
        ..MediaNode::default()
    };
    let err = r.resolve(&n, MediaNodeKind::Image).await.unwrap_err();
    assert!(matches!(err, ClipforgeError::Resolution(_)));
    assert!(err.is_recoverable());
    assert!(err.to_string().contains("/definitely/not/here.png"));
}

#[tokio::test]
async fn missing_literal_reference_is_recoverable() {
    let r = resolver(Counting::ok(), ResolveMode::Default);
    let n = MediaNode {
        prompt: Some(PromptInput::Structured {
            text: "blend".into(),
            references: vec![ReferenceInput::Literal("/no/such/ref.png".into())],
        }),
        ..MediaNode::default()
    };
    let err = r.resolve(&n, MediaNodeKind::Image).await.unwrap_err();
    assert!(err.is_recoverable());
}
