use super::*;
use crate::composition::dsl::{ClipBuilder, RenderBuilder, image, speech};
use crate::timeline::model::WarningKind;

fn temp_dir(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("clipforge_pipeline_{tag}_{}_{nanos}", std::process::id()))
}

fn render() -> RenderNode {
    RenderBuilder::new(32, 18, 24)
        .name("unbound")
        .clip(
            ClipBuilder::new()
                .duration(2.0)
                .child(image("a quiet lake"))
                .child(speech("hello there"))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap()
}

#[test]
fn media_dir_sits_next_to_the_output() {
    assert_eq!(
        media_dir_for(Path::new("/out/cut.otio")),
        PathBuf::from("/out/cut_media")
    );
    assert_eq!(media_dir_for(Path::new("cut.xml")), PathBuf::from("cut_media"));
    assert_eq!(file_safe("ab/c d"), "ab_c_d");
}

#[tokio::test]
async fn unbound_nodes_become_in_memory_placeholders() {
    let t = resolve_composition(&render(), &ResolveOpts::default()).await.unwrap();
    assert_eq!(t.assets.len(), 2);
    assert!(t.assets.iter().all(|a| a.is_placeholder && a.is_in_memory()));
    assert_eq!(t.warnings_of(WarningKind::PlaceholderSubstituted).count(), 2);
    assert!(build_interchange(&t, InterchangeFormat::Json).is_err());
}

#[tokio::test]
async fn export_materializes_placeholders_before_writing() {
    let dir = temp_dir("export");
    let out = dir.join("cut.otio");
    let res = export_timeline(
        &render(),
        &ExportOpts {
            out_path: out.clone(),
            ..ExportOpts::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(res.timeline_path, out);
    assert!(out.is_file());
    assert_eq!(res.summary.placeholder_count, 2);
    assert_eq!(res.summary.clip_count, 1);
    assert_eq!(res.summary.total_duration, 2.0);
    for asset in &res.assets {
        let loc = asset.payload.location().unwrap();
        assert!(Path::new(loc).starts_with(std::path::absolute(dir.join("cut_media")).unwrap()));
        assert!(Path::new(loc).is_file());
    }
    let exts: Vec<&str> = res.assets.iter().map(|a| a.extension()).collect();
    assert!(exts.contains(&"png") && exts.contains(&"wav"));

    let refused = export_timeline(
        &render(),
        &ExportOpts {
            out_path: out.clone(),
            overwrite: false,
            ..ExportOpts::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(refused, ClipforgeError::Validation(_)));

    let _ = std::fs::remove_dir_all(&dir);
}
