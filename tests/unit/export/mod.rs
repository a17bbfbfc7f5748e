use std::sync::Arc;

use super::*;
use crate::{
    media::reference::MediaKind,
    timeline::model::{TextItem, TextKind, TimelineMetadata, TrackKind, Transition},
};

fn timeline(fps: Fps) -> Timeline {
    let mut v1 = Track::new("V1", TrackKind::Video);
    let mut a = ClipItem::new("img", 0.0, 3.0);
    a.clip_index = Some(0);
    let mut b = ClipItem::new("vid", 2.5, 4.0);
    b.clip_index = Some(1);
    b.trim_start = Some(1.0);
    v1.items.push(a);
    v1.items.push(b);

    let mut a1 = Track::new("A1", TrackKind::Audio);
    let mut speech = ClipItem::new("voice", 0.0, 2.0);
    speech.volume = Some(0.8);
    a1.items.push(speech);

    let text = |kind, text: &str, start, duration| TextItem {
        kind,
        text: text.to_string(),
        start,
        duration,
        style: serde_json::Value::Null,
    };

    let mut vid = MediaReference::located("vid", MediaKind::Video, "/tmp/my clips/b.mp4");
    vid.duration = Some(8.0);
    Timeline {
        fps,
        width: 1080,
        height: 1920,
        duration: 6.5,
        video_tracks: vec![v1],
        audio_tracks: vec![a1],
        text_items: vec![
            text(TextKind::Title, "Top & <title>", 0.0, 6.5),
            text(TextKind::Caption, "first", 0.0, 2.0),
            text(TextKind::Caption, "second", 2.0, 2.0),
        ],
        transitions: vec![Transition {
            kind: "fade".into(),
            duration: 0.5,
            clip_index: 1,
            start: 2.5,
        }],
        assets: vec![
            MediaReference::located("img", MediaKind::Image, "https://cdn.example.com/a.png"),
            vid,
            MediaReference::located("voice", MediaKind::Audio, "/tmp/voice.wav"),
        ],
        metadata: TimelineMetadata {
            name: Some("demo".into()),
            ..TimelineMetadata::default()
        },
        warnings: Vec::new(),
    }
}

fn assert_layout_close(expected: &TrackLayout, actual: &TrackLayout) {
    let tol = 1.0 / expected.rate + 1e-9;
    assert!((expected.rate - actual.rate).abs() < 1e-6, "rate {} vs {}", expected.rate, actual.rate);
    assert_eq!(expected.transitions, actual.transitions);
    let names = |l: &TrackLayout| l.tracks.iter().map(|t| t.name.clone()).collect::<Vec<_>>();
    assert_eq!(names(expected), names(actual));
    for (e, a) in expected.tracks.iter().zip(&actual.tracks) {
        assert_eq!(e.spans.len(), a.spans.len(), "track {}", e.name);
        for (es, as_) in e.spans.iter().zip(&a.spans) {
            assert!((es.start - as_.start).abs() <= tol, "{}: start {} vs {}", e.name, es.start, as_.start);
            assert!(
                (es.duration - as_.duration).abs() <= tol,
                "{}: duration {} vs {}",
                e.name,
                es.duration,
                as_.duration
            );
        }
    }
}

#[test]
fn format_names_parse() {
    assert_eq!("JSON".parse::<InterchangeFormat>().unwrap(), InterchangeFormat::Json);
    assert_eq!("otio".parse::<InterchangeFormat>().unwrap(), InterchangeFormat::Json);
    assert_eq!(" xmeml ".parse::<InterchangeFormat>().unwrap(), InterchangeFormat::Xml);
    assert!("edl".parse::<InterchangeFormat>().is_err());
    assert_eq!(InterchangeFormat::Xml.extension(), "xml");
    assert_eq!(InterchangeFormat::default().extension(), "otio");
}

#[test]
fn json_round_trip_keeps_layout() {
    let t = timeline(Fps::new(30, 1).unwrap());
    let text = build_interchange(&t, InterchangeFormat::Json).unwrap();
    let layout = read_layout(&text, InterchangeFormat::Json).unwrap();
    assert_layout_close(&TrackLayout::from_timeline(&t), &layout);
    assert_eq!(layout.transitions, 1);

    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    let v1 = &doc["tracks"]["children"][0];
    // The outgoing clip is cut where the incoming one starts; the fade plays over its tail.
    assert_eq!(v1["children"][0]["source_range"]["duration"]["value"], 75.0);
    assert_eq!(v1["children"][1]["OTIO_SCHEMA"], "Transition.1");
    assert_eq!(v1["children"][1]["name"], "fade");
    assert_eq!(v1["children"][1]["in_offset"]["value"], 0.0);
    assert_eq!(v1["children"][1]["out_offset"]["value"], 15.0);
    assert_eq!(
        v1["children"][2]["media_reference"]["target_url"],
        "file:///tmp/my%20clips/b.mp4"
    );
    assert_eq!(v1["children"][2]["source_range"]["start_time"]["value"], 30.0);
    assert_eq!(v1["children"][2]["source_range"]["duration"]["value"], 120.0);
}

/// Places track children the way any OTIO reader does: items follow each other, transitions
/// take no time.
fn sequential_frames(track: &serde_json::Value) -> (Vec<f64>, f64) {
    let mut starts = Vec::new();
    let mut cursor = 0.0;
    for child in track["children"].as_array().unwrap() {
        match child["OTIO_SCHEMA"].as_str().unwrap() {
            "Clip.1" => {
                starts.push(cursor);
                cursor += child["source_range"]["duration"]["value"].as_f64().unwrap();
            }
            "Gap.1" => cursor += child["source_range"]["duration"]["value"].as_f64().unwrap(),
            _ => {}
        }
    }
    (starts, cursor)
}

#[test]
fn json_tracks_add_up_to_the_timeline_duration() {
    let t = timeline(Fps::new(30, 1).unwrap());
    let text = build_interchange(&t, InterchangeFormat::Json).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
    let (starts, len) = sequential_frames(&doc["tracks"]["children"][0]);
    assert_eq!(starts, [0.0, 75.0]);
    assert_eq!(len, 195.0);
    assert_eq!(doc["metadata"]["clipforge"]["duration"]["value"], 195.0);
}

#[test]
fn xml_clip_items_never_overlap_and_transitions_sit_on_the_cut() {
    let t = timeline(Fps::new(30, 1).unwrap());
    let text = build_interchange(&t, InterchangeFormat::Xml).unwrap();
    let root = xml::parse(&text).unwrap();
    let video = root
        .child("sequence")
        .and_then(|s| s.child("media"))
        .and_then(|m| m.child("video"))
        .unwrap();
    let v1 = video.children_named("track").next().unwrap();
    let frames = |el: &xml::Element| (el.child_i64("start").unwrap(), el.child_i64("end").unwrap());
    let clips: Vec<(i64, i64)> = v1.children_named("clipitem").map(frames).collect();
    assert_eq!(clips, [(0, 75), (75, 195)]);
    let outs: Vec<(i64, i64)> = v1
        .children_named("clipitem")
        .map(|c| (c.child_i64("in").unwrap(), c.child_i64("out").unwrap()))
        .collect();
    assert_eq!(outs, [(0, 75), (30, 150)]);

    let fades: Vec<&xml::Element> = v1.children_named("transitionitem").collect();
    assert_eq!(fades.len(), 1);
    assert_eq!(frames(fades[0]), (75, 90));
    assert_eq!(fades[0].child("alignment").unwrap().text.trim(), "start");
}

#[test]
fn trim_end_bounds_the_source_range_in_both_formats() {
    let mut t = timeline(Fps::new(30, 1).unwrap());
    let vid = &mut t.video_tracks[0].items[1];
    vid.trim_end = Some(2.0);

    let json = build_interchange(&t, InterchangeFormat::Json).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
    let range = &doc["tracks"]["children"][0]["children"][2]["source_range"];
    assert_eq!(range["start_time"]["value"], 30.0);
    assert_eq!(range["duration"]["value"], 30.0);

    let xml_text = build_interchange(&t, InterchangeFormat::Xml).unwrap();
    assert!(xml_text.contains("<in>30</in>"));
    assert!(xml_text.contains("<out>60</out>"));
    assert!(!xml_text.contains("<out>150</out>"));

    let layout = read_layout(&json, InterchangeFormat::Json).unwrap();
    assert_eq!(layout.track("V1").unwrap().spans[1].duration, 1.0);
    assert_layout_close(&TrackLayout::from_timeline(&t), &layout);
}

#[test]
fn xml_round_trip_keeps_layout() {
    let t = timeline(Fps::new(30, 1).unwrap());
    let text = build_interchange(&t, InterchangeFormat::Xml).unwrap();
    assert!(text.contains("<xmeml version=\"5\">"));
    assert!(text.contains("Top &amp; &lt;title&gt;"));
    assert!(text.contains("<ntsc>FALSE</ntsc>"));
    let layout = read_layout(&text, InterchangeFormat::Xml).unwrap();
    assert_layout_close(&TrackLayout::from_timeline(&t), &layout);
}

#[test]
fn ntsc_rates_round_trip_in_both_formats() {
    let t = timeline(Fps::new(30000, 1001).unwrap());
    for format in [InterchangeFormat::Json, InterchangeFormat::Xml] {
        let text = build_interchange(&t, format).unwrap();
        let layout = read_layout(&text, format).unwrap();
        assert_layout_close(&TrackLayout::from_timeline(&t), &layout);
    }
}

#[test]
fn shared_file_is_written_once() {
    let mut t = timeline(Fps::new(30, 1).unwrap());
    let mut again = ClipItem::new("img", 6.5, 1.0);
    again.clip_index = Some(2);
    t.video_tracks[0].items.push(again);
    t.duration = 7.5;
    let text = build_interchange(&t, InterchangeFormat::Xml).unwrap();
    assert_eq!(text.matches("<file id=\"file-img\">").count(), 1);
    assert_eq!(text.matches("<file id=\"file-img\"/>").count(), 1);
}

#[test]
fn in_memory_assets_are_rejected() {
    let mut t = timeline(Fps::new(30, 1).unwrap());
    t.assets[0].payload = MediaPayload::Bytes(Arc::new(vec![1, 2, 3]));
    let err = build_interchange(&t, InterchangeFormat::Json).unwrap_err();
    assert!(matches!(err, ClipforgeError::Serialization(_)));
    assert!(err.to_string().contains("img"));
}

#[test]
fn unknown_assets_and_bad_times_are_rejected() {
    let mut t = timeline(Fps::new(30, 1).unwrap());
    t.video_tracks[0].items.push(ClipItem::new("ghost", 7.0, 1.0));
    assert!(build_interchange(&t, InterchangeFormat::Xml).is_err());

    let mut t = timeline(Fps::new(30, 1).unwrap());
    t.video_tracks[0].items[0].duration = f64::NAN;
    assert!(build_interchange(&t, InterchangeFormat::Json).is_err());

    let mut t = timeline(Fps::new(30, 1).unwrap());
    t.duration = f64::INFINITY;
    assert!(build_interchange(&t, InterchangeFormat::Json).is_err());
}

#[test]
fn text_overlays_share_lanes_when_disjoint() {
    let t = timeline(Fps::new(30, 1).unwrap());
    let lanes = t.text_lanes();
    assert_eq!(lanes.len(), 2);
    assert_eq!(lanes[0].len(), 1);
    assert_eq!(lanes[1].iter().map(|i| i.text.as_str()).collect::<Vec<_>>(), ["first", "second"]);
}

#[test]
fn locations_become_urls() {
    assert_eq!(to_url("https://x.test/a b.png"), "https://x.test/a b.png");
    assert_eq!(to_url("/a/b c%.png"), "file:///a/b%20c%25.png");
    assert_eq!(to_url("C:\\media\\a.png"), "file:///C:/media/a.png");
    assert_eq!(to_url("rel/a.png"), "rel/a.png");
}

#[test]
fn quantizer_rejects_negative_and_non_finite_times() {
    let q = Quantizer { fps: Fps::new(30, 1).unwrap() };
    assert_eq!(q.span(1.0, 0.5, "x").unwrap(), (30, 15));
    assert!(q.frames(-0.1, "x").is_err());
    assert!(q.frames(f64::NAN, "x").is_err());
}

#[test]
fn malformed_interchange_text_is_a_serialization_error() {
    for format in [InterchangeFormat::Json, InterchangeFormat::Xml] {
        let err = read_layout("not a timeline", format).unwrap_err();
        assert!(matches!(err, ClipforgeError::Serialization(_)));
    }
}
