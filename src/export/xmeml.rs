use std::collections::{HashMap, HashSet};

use crate::{
    export::{
        Quantizer, Span, TEXT_TRACK_PREFIX, TrackLayout, TrackSpans, cut_track, to_url,
        xml::{self, Element, escape_xml},
    },
    foundation::error::{ClipforgeError, ClipforgeResult},
    media::reference::{MediaKind, MediaReference},
    timeline::model::{TextItem, Timeline, Track, TrackKind},
};

/// Attribute carrying the track name so layouts can be read back.
const TRACK_NAME_ATTR: &str = "MZ.TrackName";

fn rate_block(q: Quantizer) -> String {
    format!(
        "<rate><timebase>{}</timebase><ntsc>{}</ntsc></rate>",
        q.fps.timebase(),
        if q.fps.is_ntsc() { "TRUE" } else { "FALSE" }
    )
}

fn file_id(asset: &MediaReference) -> String {
    format!("file-{}", escape_xml(&asset.id))
}

struct Writer<'a> {
    xml: String,
    q: Quantizer,
    assets: &'a HashMap<&'a str, &'a MediaReference>,
    width: u32,
    height: u32,
    written_files: HashSet<String>,
}

impl Writer<'_> {
    fn line(&mut self, indent: usize, s: &str) {
        for _ in 0..indent {
            self.xml.push_str("  ");
        }
        self.xml.push_str(s);
        self.xml.push('\n');
    }

    fn file(&mut self, indent: usize, asset: &MediaReference) -> ClipforgeResult<()> {
        let id = file_id(asset);
        if !self.written_files.insert(id.clone()) {
            self.line(indent, &format!("<file id=\"{id}\"/>"));
            return Ok(());
        }
        let location = asset.payload.location().ok_or_else(|| {
            ClipforgeError::serialization(format!("asset '{}' is still in memory", asset.id))
        })?;
        let name = location.rsplit(['/', '\\']).next().unwrap_or(location);
        self.line(indent, &format!("<file id=\"{id}\">"));
        self.line(indent + 1, &format!("<name>{}</name>", escape_xml(name)));
        self.line(
            indent + 1,
            &format!("<pathurl>{}</pathurl>", escape_xml(&to_url(location))),
        );
        let rate = rate_block(self.q);
        self.line(indent + 1, &rate);
        if let Some(d) = asset.duration {
            let frames = self.q.frames(d, "asset duration")?;
            self.line(indent + 1, &format!("<duration>{frames}</duration>"));
        }
        self.line(indent + 1, "<media>");
        match asset.kind {
            MediaKind::Image | MediaKind::Video => {
                let w = asset.width.unwrap_or(self.width);
                let h = asset.height.unwrap_or(self.height);
                self.line(indent + 2, "<video><samplecharacteristics>");
                self.line(indent + 3, &format!("<width>{w}</width>"));
                self.line(indent + 3, &format!("<height>{h}</height>"));
                self.line(indent + 2, "</samplecharacteristics></video>");
            }
            MediaKind::Audio => {
                self.line(indent + 2, "<audio><samplecharacteristics>");
                self.line(indent + 3, "<samplerate>48000</samplerate><depth>16</depth>");
                self.line(indent + 2, "</samplecharacteristics></audio>");
            }
        }
        self.line(indent + 1, "</media>");
        self.line(indent, "</file>");
        Ok(())
    }

    fn media_track(
        &mut self,
        indent: usize,
        track: &Track,
        transition_kinds: &HashMap<usize, &str>,
    ) -> ClipforgeResult<()> {
        self.line(
            indent,
            &format!("<track {TRACK_NAME_ATTR}=\"{}\">", escape_xml(&track.name)),
        );
        let mut tail = 0u64;
        for (n, cut) in cut_track(track, self.q)?.into_iter().enumerate() {
            let item = cut.item;
            if tail > 0
                && let Some(kind) = item
                    .clip_index
                    .and_then(|i| transition_kinds.get(&i).copied())
            {
                self.transition(indent + 1, track.kind, kind, cut.start, tail.min(cut.duration));
            }
            tail = cut.tail;

            let assets = self.assets;
            let asset = *assets.get(item.asset_id.as_str()).ok_or_else(|| {
                ClipforgeError::serialization(format!("unknown asset '{}'", item.asset_id))
            })?;
            self.line(
                indent + 1,
                &format!("<clipitem id=\"{}-{}\">", escape_xml(&track.name), n + 1),
            );
            let name = asset
                .prompt_text
                .as_deref()
                .unwrap_or(asset.id.as_str())
                .chars()
                .take(64)
                .collect::<String>();
            self.line(indent + 2, &format!("<name>{}</name>", escape_xml(&name)));
            self.line(indent + 2, "<enabled>TRUE</enabled>");
            let rate = rate_block(self.q);
            self.line(indent + 2, &rate);
            self.line(indent + 2, &format!("<start>{}</start>", cut.start));
            self.line(indent + 2, &format!("<end>{}</end>", cut.end()));
            self.line(indent + 2, &format!("<in>{}</in>", cut.source_in));
            self.line(indent + 2, &format!("<out>{}</out>", cut.source_in + cut.duration));
            self.file(indent + 2, asset)?;
            if track.kind == TrackKind::Audio {
                self.line(indent + 2, "<sourcetrack><mediatype>audio</mediatype><trackindex>1</trackindex></sourcetrack>");
                if let Some(v) = item.volume {
                    self.line(indent + 2, "<filter><effect>");
                    self.line(indent + 3, "<name>Audio Levels</name><effectid>audiolevels</effectid>");
                    self.line(indent + 3, "<effectcategory>audiolevels</effectcategory><effecttype>audiolevels</effecttype><mediatype>audio</mediatype>");
                    self.line(
                        indent + 3,
                        &format!("<parameter><parameterid>level</parameterid><name>Level</name><value>{v}</value></parameter>"),
                    );
                    self.line(indent + 2, "</effect></filter>");
                }
            }
            self.line(indent + 1, "</clipitem>");
        }
        self.line(indent, "</track>");
        Ok(())
    }

    /// `<transitionitem>` starting on the cut at `start`, played over the outgoing clip's tail.
    fn transition(&mut self, indent: usize, track_kind: TrackKind, kind: &str, start: u64, frames: u64) {
        let (effect, category, media) = match track_kind {
            TrackKind::Video => ("Cross Dissolve", "Dissolve", "video"),
            TrackKind::Audio => ("Cross Fade (+3dB)", "Crossfade", "audio"),
        };
        self.line(indent, "<transitionitem>");
        let rate = rate_block(self.q);
        self.line(indent + 1, &rate);
        self.line(indent + 1, &format!("<start>{start}</start>"));
        self.line(indent + 1, &format!("<end>{}</end>", start + frames));
        self.line(indent + 1, "<alignment>start</alignment>");
        self.line(indent + 1, "<effect>");
        self.line(indent + 2, &format!("<name>{effect}</name><effectid>{effect}</effectid>"));
        self.line(
            indent + 2,
            &format!("<effectcategory>{category}</effectcategory><effecttype>transition</effecttype><mediatype>{media}</mediatype>"),
        );
        self.line(indent + 2, &format!("<comment>{}</comment>", escape_xml(kind)));
        self.line(indent + 1, "</effect>");
        self.line(indent, "</transitionitem>");
    }

    fn text_track(&mut self, indent: usize, name: &str, lane: &[&TextItem]) -> ClipforgeResult<()> {
        self.line(
            indent,
            &format!("<track {TRACK_NAME_ATTR}=\"{}\">", escape_xml(name)),
        );
        for (n, item) in lane.iter().enumerate() {
            let (start, dur) = self.q.span(item.start, item.duration, "text item")?;
            self.line(
                indent + 1,
                &format!("<generatoritem id=\"{}-{}\">", escape_xml(name), n + 1),
            );
            let label: String = item.text.chars().take(64).collect();
            self.line(indent + 2, &format!("<name>{}</name>", escape_xml(&label)));
            self.line(indent + 2, "<enabled>TRUE</enabled>");
            let rate = rate_block(self.q);
            self.line(indent + 2, &rate);
            self.line(indent + 2, &format!("<start>{start}</start>"));
            self.line(indent + 2, &format!("<end>{}</end>", start + dur));
            self.line(indent + 2, "<in>0</in>");
            self.line(indent + 2, &format!("<out>{dur}</out>"));
            self.line(indent + 2, "<effect>");
            self.line(indent + 3, "<name>Text</name><effectid>Text</effectid>");
            self.line(indent + 3, "<effectcategory>Text</effectcategory><effecttype>generator</effecttype><mediatype>video</mediatype>");
            self.line(
                indent + 3,
                &format!(
                    "<parameter><parameterid>str</parameterid><name>Text</name><value>{}</value></parameter>",
                    escape_xml(&item.text)
                ),
            );
            self.line(
                indent + 3,
                &format!(
                    "<parameter><parameterid>kind</parameterid><name>Kind</name><value>{}</value></parameter>",
                    item.kind.as_str()
                ),
            );
            self.line(indent + 2, "</effect>");
            self.line(indent + 1, "</generatoritem>");
        }
        self.line(indent, "</track>");
        Ok(())
    }
}

pub(crate) fn build(
    timeline: &Timeline,
    assets: &HashMap<&str, &MediaReference>,
) -> ClipforgeResult<String> {
    let q = Quantizer { fps: timeline.fps };
    let mut w = Writer {
        xml: String::new(),
        q,
        assets,
        width: timeline.width,
        height: timeline.height,
        written_files: HashSet::new(),
    };
    let name = timeline
        .metadata
        .name
        .clone()
        .unwrap_or_else(|| "clipforge".to_string());
    let total = q.frames(timeline.duration, "timeline duration")?;
    let transition_kinds: HashMap<usize, &str> = timeline
        .transitions
        .iter()
        .map(|t| (t.clip_index, t.kind.as_str()))
        .collect();

    w.line(0, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    w.line(0, "<!DOCTYPE xmeml>");
    w.line(0, "<xmeml version=\"5\">");
    w.line(1, "<sequence id=\"sequence-1\">");
    w.line(2, &format!("<name>{}</name>", escape_xml(&name)));
    w.line(2, &format!("<duration>{total}</duration>"));
    let rate = rate_block(q);
    w.line(2, &rate);
    w.line(2, "<media>");

    w.line(3, "<video>");
    w.line(4, "<format><samplecharacteristics>");
    w.line(5, &format!("<width>{}</width>", timeline.width));
    w.line(5, &format!("<height>{}</height>", timeline.height));
    w.line(5, "<pixelaspectratio>square</pixelaspectratio>");
    w.line(4, "</samplecharacteristics></format>");
    for track in &timeline.video_tracks {
        w.media_track(4, track, &transition_kinds)?;
    }
    for (n, lane) in timeline.text_lanes().iter().enumerate() {
        w.text_track(4, &format!("{TEXT_TRACK_PREFIX}{}", n + 1), lane)?;
    }
    w.line(3, "</video>");

    w.line(3, "<audio>");
    for track in &timeline.audio_tracks {
        w.media_track(4, track, &transition_kinds)?;
    }
    w.line(3, "</audio>");

    w.line(2, "</media>");
    w.line(1, "</sequence>");
    w.line(0, "</xmeml>");
    Ok(w.xml)
}

fn read_track(track: &Element, fallback: String, rate: f64) -> ClipforgeResult<TrackSpans> {
    let name = track
        .attr(TRACK_NAME_ATTR)
        .map(str::to_string)
        .unwrap_or(fallback);
    let mut spans = Vec::new();
    for item in &track.children {
        if item.name != "clipitem" && item.name != "generatoritem" {
            continue;
        }
        let start = item.child_i64("start")?;
        let end = item.child_i64("end")?;
        if start < 0 || end < start {
            return Err(ClipforgeError::serialization(format!(
                "track {name}: bad item range {start}..{end}"
            )));
        }
        spans.push(Span {
            start: start as f64 / rate,
            duration: (end - start) as f64 / rate,
        });
    }
    Ok(TrackSpans { name, spans })
}

pub(crate) fn read_layout(text: &str) -> ClipforgeResult<TrackLayout> {
    let root = xml::parse(text)?;
    if root.name != "xmeml" {
        return Err(ClipforgeError::serialization("root is not <xmeml>"));
    }
    let sequence = root
        .child("sequence")
        .ok_or_else(|| ClipforgeError::serialization("xmeml has no <sequence>"))?;
    let rate_el = sequence
        .child("rate")
        .ok_or_else(|| ClipforgeError::serialization("sequence has no <rate>"))?;
    let timebase = rate_el.child_i64("timebase")?;
    if timebase <= 0 {
        return Err(ClipforgeError::serialization("timebase must be positive"));
    }
    let ntsc = rate_el
        .child("ntsc")
        .is_some_and(|n| n.text.trim().eq_ignore_ascii_case("true"));
    let rate = if ntsc {
        timebase as f64 * 1000.0 / 1001.0
    } else {
        timebase as f64
    };

    let media = sequence
        .child("media")
        .ok_or_else(|| ClipforgeError::serialization("sequence has no <media>"))?;
    let mut tracks = Vec::new();
    let mut transitions = 0;
    for (section, prefix) in [("video", "V"), ("audio", "A")] {
        let Some(el) = media.child(section) else {
            continue;
        };
        for (i, track) in el.children_named("track").enumerate() {
            if section == "video" && i == 0 {
                transitions = track.children_named("transitionitem").count();
            }
            tracks.push(read_track(track, format!("{prefix}{}", i + 1), rate)?);
        }
    }

    Ok(TrackLayout {
        rate,
        tracks,
        transitions,
    })
}
