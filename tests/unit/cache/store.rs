use super::*;
use crate::{
    cache::key::derive_key,
    composition::model::{MediaNode, MediaNodeKind, PromptInput},
    media::provider::ModelBindings,
    media::reference::MediaKind,
};

fn temp_dir(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "clipforge_store_{tag}_{}_{nanos}",
        std::process::id()
    ))
}

fn key(text: &str) -> CacheKey {
    let node = MediaNode {
        prompt: Some(PromptInput::Text(text.into())),
        ..MediaNode::default()
    };
    derive_key(&node, MediaNodeKind::Image, &ModelBindings::new()).unwrap()
}

fn reference(id: &str) -> MediaReference {
    let mut r = MediaReference::located(id, MediaKind::Image, format!("/media/{id}.png"));
    r.prompt_text = Some("p".into());
    r
}

#[tokio::test]
async fn fs_cache_roundtrips_and_misses() {
    let cache = FsMediaCache::new(temp_dir("rt"));
    let k = key("a");
    assert_eq!(cache.get(&k).await.unwrap(), None);
    cache.set(&k, &reference("a")).await.unwrap();
    assert_eq!(cache.get(&k).await.unwrap(), Some(reference("a")));
    assert_eq!(cache.get(&key("b")).await.unwrap(), None);

    let raw = std::fs::read_to_string(cache.entry_path(&k)).unwrap();
    let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert!(v["expiresAt"].is_null());
    assert_eq!(v["value"]["payload"]["location"], "/media/a.png");
}

#[tokio::test]
async fn fs_cache_survives_reopen() {
    let dir = temp_dir("reopen");
    FsMediaCache::new(&dir)
        .set(&key("x"), &reference("x"))
        .await
        .unwrap();
    let reopened = FsMediaCache::new(&dir);
    assert_eq!(reopened.get(&key("x")).await.unwrap(), Some(reference("x")));
}

#[tokio::test]
async fn corrupt_and_expired_entries_are_misses() {
    let dir = temp_dir("stale");
    let cache = FsMediaCache::new(&dir);
    cache.set(&key("ok"), &reference("ok")).await.unwrap();
    std::fs::write(cache.entry_path(&key("bad")), b"{not json").unwrap();
    assert_eq!(cache.get(&key("bad")).await.unwrap(), None);

    let expiring = FsMediaCache::new(&dir).with_ttl(Duration::ZERO);
    expiring.set(&key("old"), &reference("old")).await.unwrap();
    assert_eq!(expiring.get(&key("old")).await.unwrap(), None);

    assert_eq!(cache.purge_expired().await.unwrap(), 2);
    assert!(cache.entry_path(&key("ok")).exists());
    assert!(!cache.entry_path(&key("old")).exists());
}

#[tokio::test]
async fn purge_of_missing_dir_is_noop() {
    assert_eq!(
        FsMediaCache::new(temp_dir("none")).purge_expired().await.unwrap(),
        0
    );
}

#[tokio::test]
async fn memory_cache_roundtrips() {
    let cache = MemoryMediaCache::new();
    assert!(cache.is_empty().await);
    cache.set(&key("m"), &reference("m")).await.unwrap();
    assert_eq!(cache.get(&key("m")).await.unwrap(), Some(reference("m")));
    assert_eq!(cache.len().await, 1);
    assert_eq!(cache.media_dir(), None);
}
