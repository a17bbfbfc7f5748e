use std::collections::HashMap;

use serde_json::{Value, json};

use crate::{
    export::{Quantizer, Span, TEXT_TRACK_PREFIX, TrackLayout, TrackSpans, cut_track, to_url},
    foundation::error::{ClipforgeError, ClipforgeResult},
    media::reference::{MediaPayload, MediaReference},
    timeline::model::{TextItem, Timeline, Track, TrackKind},
};

fn rational(value: u64, rate: f64) -> Value {
    json!({
        "OTIO_SCHEMA": "RationalTime.1",
        "rate": rate,
        "value": value as f64,
    })
}

fn time_range(start: u64, duration: u64, rate: f64) -> Value {
    json!({
        "OTIO_SCHEMA": "TimeRange.1",
        "start_time": rational(start, rate),
        "duration": rational(duration, rate),
    })
}

fn gap(frames: u64, rate: f64) -> Value {
    json!({
        "OTIO_SCHEMA": "Gap.1",
        "name": "",
        "source_range": time_range(0, frames, rate),
        "effects": [],
        "markers": [],
        "metadata": {},
    })
}

/// Transition at a cut: it starts on the cut and runs `overlap` frames into the incoming
/// clip while the outgoing clip plays its tail handle.
fn transition(kind: &str, overlap: u64, rate: f64) -> Value {
    let transition_type = match kind {
        "fade" | "dissolve" | "crossfade" => "SMPTE_Dissolve",
        _ => "Custom_Transition",
    };
    json!({
        "OTIO_SCHEMA": "Transition.1",
        "name": kind,
        "transition_type": transition_type,
        "in_offset": rational(0, rate),
        "out_offset": rational(overlap, rate),
        "metadata": { "clipforge": { "kind": kind } },
    })
}

fn track_value(name: &str, kind: &str, children: Vec<Value>) -> Value {
    json!({
        "OTIO_SCHEMA": "Track.1",
        "name": name,
        "kind": kind,
        "children": children,
        "source_range": null,
        "effects": [],
        "markers": [],
        "metadata": {},
    })
}

fn clip_name(asset: &MediaReference) -> String {
    match (&asset.prompt_text, &asset.payload) {
        (Some(p), _) => p.chars().take(64).collect(),
        (None, MediaPayload::Location(l)) => l
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(l.as_str())
            .to_string(),
        (None, MediaPayload::Bytes(_)) => asset.id.clone(),
    }
}

fn media_track(
    track: &Track,
    assets: &HashMap<&str, &MediaReference>,
    transition_kinds: &HashMap<usize, &str>,
    q: Quantizer,
) -> ClipforgeResult<Value> {
    let rate = q.fps.as_f64();
    let what = format!("{} item", track.name);
    let mut children = Vec::new();
    let mut cursor = 0u64;
    let mut tail = 0u64;
    for cut in cut_track(track, q)? {
        let item = cut.item;
        if cut.start > cursor {
            children.push(gap(cut.start - cursor, rate));
        } else if tail > 0
            && let Some(kind) = item
                .clip_index
                .and_then(|i| transition_kinds.get(&i).copied())
        {
            children.push(transition(kind, tail.min(cut.duration), rate));
        }

        let asset = assets.get(item.asset_id.as_str()).ok_or_else(|| {
            ClipforgeError::serialization(format!("unknown asset '{}'", item.asset_id))
        })?;
        let location = asset.payload.location().ok_or_else(|| {
            ClipforgeError::serialization(format!("asset '{}' is still in memory", asset.id))
        })?;
        let available = match asset.duration {
            Some(d) => time_range(0, q.frames(d, &what)?, rate),
            None => Value::Null,
        };

        let mut meta = json!({
            "asset_id": asset.id,
            "is_placeholder": asset.is_placeholder,
            "prompt": asset.prompt_text,
        });
        if let Some(layout) = &item.layout {
            meta["layout"] = serde_json::to_value(layout)
                .map_err(|e| ClipforgeError::serialization(format!("layout metadata: {e}")))?;
        }
        for (key, v) in [("volume", item.volume), ("zoom", item.zoom)] {
            if let Some(v) = v {
                meta[key] = json!(v);
            }
        }
        if let Some(p) = item.position {
            meta["position"] = json!([p.x, p.y]);
        }
        if let Some(s) = item.size {
            meta["size"] = json!([s.width, s.height]);
        }

        children.push(json!({
            "OTIO_SCHEMA": "Clip.1",
            "name": clip_name(asset),
            "source_range": time_range(cut.source_in, cut.duration, rate),
            "media_reference": {
                "OTIO_SCHEMA": "ExternalReference.1",
                "target_url": to_url(location),
                "available_range": available,
                "metadata": {},
            },
            "effects": [],
            "markers": [],
            "metadata": { "clipforge": meta },
        }));
        cursor = cut.end();
        tail = cut.tail;
    }
    let kind = match track.kind {
        TrackKind::Video => "Video",
        TrackKind::Audio => "Audio",
    };
    Ok(track_value(&track.name, kind, children))
}

fn text_track(name: &str, lane: &[&TextItem], q: Quantizer) -> ClipforgeResult<Value> {
    let rate = q.fps.as_f64();
    let mut children = Vec::new();
    let mut cursor = 0u64;
    for item in lane {
        let (start, dur) = q.span(item.start, item.duration, "text item")?;
        if start > cursor {
            children.push(gap(start - cursor, rate));
        }
        let start = start.max(cursor);
        children.push(json!({
            "OTIO_SCHEMA": "Clip.1",
            "name": item.text.chars().take(64).collect::<String>(),
            "source_range": time_range(0, dur, rate),
            "media_reference": {
                "OTIO_SCHEMA": "GeneratorReference.1",
                "generator_kind": "Text",
                "parameters": {
                    "text": item.text,
                    "kind": item.kind.as_str(),
                    "style": item.style,
                },
                "available_range": null,
                "metadata": {},
            },
            "effects": [],
            "markers": [],
            "metadata": {},
        }));
        cursor = start + dur;
    }
    Ok(track_value(name, "Video", children))
}

pub(crate) fn build(
    timeline: &Timeline,
    assets: &HashMap<&str, &MediaReference>,
) -> ClipforgeResult<String> {
    let q = Quantizer { fps: timeline.fps };
    let transition_kinds: HashMap<usize, &str> = timeline
        .transitions
        .iter()
        .map(|t| (t.clip_index, t.kind.as_str()))
        .collect();

    let mut tracks = Vec::new();
    for t in &timeline.video_tracks {
        tracks.push(media_track(t, assets, &transition_kinds, q)?);
    }
    for (n, lane) in timeline.text_lanes().iter().enumerate() {
        tracks.push(text_track(&format!("{TEXT_TRACK_PREFIX}{}", n + 1), lane, q)?);
    }
    for t in &timeline.audio_tracks {
        tracks.push(media_track(t, assets, &transition_kinds, q)?);
    }

    let doc = json!({
        "OTIO_SCHEMA": "Timeline.1",
        "name": timeline.metadata.name.clone().unwrap_or_else(|| "clipforge".to_string()),
        "global_start_time": null,
        "metadata": {
            "clipforge": {
                "width": timeline.width,
                "height": timeline.height,
                "fps": { "num": timeline.fps.num, "den": timeline.fps.den },
                "duration": rational(q.frames(timeline.duration, "timeline duration")?, q.fps.as_f64()),
                "mode": timeline.metadata.mode,
                "transitions": timeline.transitions,
                "warnings": timeline.warnings,
            }
        },
        "tracks": {
            "OTIO_SCHEMA": "Stack.1",
            "name": "tracks",
            "children": tracks,
            "source_range": null,
            "effects": [],
            "markers": [],
            "metadata": {},
        },
    });
    serde_json::to_string_pretty(&doc)
        .map_err(|e| ClipforgeError::serialization(format!("encode interchange json: {e}")))
}

fn rational_secs(v: &Value, what: &str) -> ClipforgeResult<(f64, f64)> {
    let rate = v["rate"].as_f64();
    let value = v["value"].as_f64();
    match (rate, value) {
        (Some(r), Some(x)) if r > 0.0 => Ok((x, r)),
        _ => Err(ClipforgeError::serialization(format!(
            "{what}: expected RationalTime.1 with positive rate"
        ))),
    }
}

pub(crate) fn read_layout(text: &str) -> ClipforgeResult<TrackLayout> {
    let doc: Value = serde_json::from_str(text)
        .map_err(|e| ClipforgeError::serialization(format!("parse interchange json: {e}")))?;
    if doc["OTIO_SCHEMA"] != "Timeline.1" {
        return Err(ClipforgeError::serialization("root is not a Timeline.1"));
    }
    let children = doc["tracks"]["children"]
        .as_array()
        .ok_or_else(|| ClipforgeError::serialization("timeline has no track stack"))?;

    let fps = &doc["metadata"]["clipforge"]["fps"];
    let mut rate = match (fps["num"].as_f64(), fps["den"].as_f64()) {
        (Some(n), Some(d)) if d > 0.0 => n / d,
        _ => 0.0,
    };
    let mut tracks = Vec::new();
    for track in children {
        let name = track["name"].as_str().unwrap_or_default().to_string();
        let mut cursor = 0.0f64;
        let mut spans = Vec::new();
        for child in track["children"].as_array().into_iter().flatten() {
            match child["OTIO_SCHEMA"].as_str() {
                Some("Clip.1") | Some("Gap.1") => {
                    let (frames, r) =
                        rational_secs(&child["source_range"]["duration"], "source_range.duration")?;
                    rate = r;
                    if child["OTIO_SCHEMA"] == "Clip.1" {
                        spans.push(Span {
                            start: cursor / r,
                            duration: frames / r,
                        });
                    }
                    cursor += frames;
                }
                // Transitions overlay the neighbouring clips and take no track time.
                Some("Transition.1") => {
                    rational_secs(&child["in_offset"], "in_offset")?;
                    rational_secs(&child["out_offset"], "out_offset")?;
                }
                other => {
                    return Err(ClipforgeError::serialization(format!(
                        "unexpected track child schema {other:?}"
                    )));
                }
            }
        }
        tracks.push(TrackSpans { name, spans });
    }

    // Audio lanes repeat the crossfades of their clips; count the primary video track only.
    let transitions = children
        .first()
        .and_then(|t| t["children"].as_array())
        .map_or(0, |c| {
            c.iter()
                .filter(|x| x["OTIO_SCHEMA"] == "Transition.1")
                .count()
        });

    Ok(TrackLayout {
        rate,
        tracks,
        transitions,
    })
}
