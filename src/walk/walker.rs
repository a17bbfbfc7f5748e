use std::collections::HashSet;

use futures::future::join_all;

use crate::{
    composition::model::{
        CaptionsNode, ClipDuration, ClipNode, LayoutKind, LayoutNode, MediaNode, MediaNodeKind,
        Node, RenderNode, TextNode,
    },
    foundation::error::ClipforgeResult,
    media::reference::{MediaKind, MediaReference},
    resolve::resolver::MediaResolver,
    timeline::model::{
        ClipItem, LayoutDescriptor, TextItem, TextKind, Timeline, TimelineMetadata, Track,
        TrackKind, Transition, Warning, WarningKind,
    },
    walk::srt::parse_srt,
};

/// Duration of an `auto` clip with no video or speech to measure.
pub const DEFAULT_AUTO_CLIP_SECS: f64 = 3.0;

/// Ordered traversal of a render tree into a [`Timeline`].
pub struct SceneWalker<'r> {
    resolver: &'r MediaResolver,
}

struct Leaf<'a> {
    kind: MediaNodeKind,
    node: &'a MediaNode,
    label: String,
}

enum Slot<'a> {
    Media(usize),
    Composite {
        kind: LayoutKind,
        layout: &'a LayoutNode,
        leaves: std::ops::Range<usize>,
        label: String,
    },
}

struct PendingTransition {
    kind: String,
    duration: f64,
    from: String,
}

#[derive(Default)]
struct Lanes {
    visual: Vec<Track>,
    speech: Vec<Track>,
    music: Vec<Track>,
    global_visual: Vec<Track>,
    global_music: Vec<Track>,
    global_speech: Vec<Track>,
}

fn lane<'t>(tracks: &'t mut Vec<Track>, prefix: &str, kind: TrackKind, idx: usize) -> &'t mut Track {
    while tracks.len() <= idx {
        let name = format!("{prefix}{}", tracks.len() + 1);
        tracks.push(Track::new(name, kind));
    }
    &mut tracks[idx]
}

struct WalkState {
    current_time: f64,
    clip_index: usize,
    skipped_clips: usize,
    lanes: Lanes,
    text_items: Vec<TextItem>,
    transitions: Vec<Transition>,
    assets: Vec<MediaReference>,
    asset_ids: HashSet<String>,
    warnings: Vec<Warning>,
    pending: Option<PendingTransition>,
}

impl WalkState {
    fn new() -> Self {
        Self {
            current_time: 0.0,
            clip_index: 0,
            skipped_clips: 0,
            lanes: Lanes::default(),
            text_items: Vec::new(),
            transitions: Vec::new(),
            assets: Vec::new(),
            asset_ids: HashSet::new(),
            warnings: Vec::new(),
            pending: None,
        }
    }

    fn add_asset(&mut self, r: &MediaReference) {
        if self.asset_ids.insert(r.id.clone()) {
            self.assets.push(r.clone());
        }
    }

    fn warn(&mut self, kind: WarningKind, message: impl Into<String>, node: Option<String>) {
        let message = message.into();
        tracing::warn!(kind = ?kind, node = node.as_deref().unwrap_or(""), "{message}");
        self.warnings.push(Warning::new(kind, message, node));
    }
}

impl<'r> SceneWalker<'r> {
    /// Walker resolving media through `resolver`.
    pub fn new(resolver: &'r MediaResolver) -> Self {
        Self { resolver }
    }

    /// Walk `render` into a timeline.
    ///
    /// Clips are sequenced in document order; media leaves within one clip resolve concurrently.
    /// Unresolvable leaves are skipped with a warning; provider errors in strict mode and
    /// cancellation abort the walk.
    #[tracing::instrument(level = "debug", skip_all, fields(clips = render.clip_count()))]
    pub async fn walk(&self, render: &RenderNode) -> ClipforgeResult<Timeline> {
        render.validate()?;
        let fps = render.frame_rate()?;
        let mut st = WalkState::new();

        let clips: Vec<(usize, &ClipNode)> = render
            .children
            .iter()
            .enumerate()
            .filter_map(|(i, n)| match n {
                Node::Clip(c) => Some((i, c)),
                _ => None,
            })
            .collect();

        for (pos, (doc_idx, clip)) in clips.iter().enumerate() {
            let is_last = pos + 1 == clips.len();
            self.walk_clip(&mut st, *doc_idx, clip, is_last).await?;
        }
        if let Some(p) = st.pending.take() {
            st.warn(
                WarningKind::TransitionAdjusted,
                format!("transition '{}' ignored: no following clip was placed", p.kind),
                Some(p.from),
            );
        }

        let total = st.current_time;
        for (doc_idx, node) in render.children.iter().enumerate() {
            if !matches!(node, Node::Clip(_)) {
                self.walk_global(&mut st, doc_idx, node, total).await?;
            }
        }

        let Lanes {
            visual,
            speech,
            music,
            global_visual,
            global_music,
            global_speech,
        } = st.lanes;
        let mut video_tracks = visual;
        video_tracks.extend(global_visual);
        let mut audio_tracks = speech;
        audio_tracks.extend(music);
        audio_tracks.extend(global_music);
        audio_tracks.extend(global_speech);

        Ok(Timeline {
            fps,
            width: render.width,
            height: render.height,
            duration: total,
            video_tracks,
            audio_tracks,
            text_items: st.text_items,
            transitions: st.transitions,
            assets: st.assets,
            metadata: TimelineMetadata {
                name: render.name.clone(),
                mode: self.resolver.context().mode,
                clip_count: st.clip_index,
                skipped_clip_count: st.skipped_clips,
            },
            warnings: st.warnings,
        })
    }

    async fn walk_clip(
        &self,
        st: &mut WalkState,
        doc_idx: usize,
        clip: &ClipNode,
        is_last: bool,
    ) -> ClipforgeResult<()> {
        let clip_label = clip
            .id
            .clone()
            .unwrap_or_else(|| format!("children[{doc_idx}]"));

        let mut leaves = Vec::<Leaf<'_>>::new();
        let mut slots = Vec::<Slot<'_>>::new();
        let mut texts = Vec::<(&Node, TextKind)>::new();
        let mut captions = Vec::<&CaptionsNode>::new();
        for (i, child) in clip.children.iter().enumerate() {
            let label = format!("{clip_label}/{}[{i}]", child.kind_name());
            match child {
                Node::Title(_) => texts.push((child, TextKind::Title)),
                Node::Subtitle(_) => texts.push((child, TextKind::Subtitle)),
                Node::Captions(c) => captions.push(c),
                _ => {
                    if let Some((kind, node)) = child.as_media() {
                        slots.push(Slot::Media(leaves.len()));
                        leaves.push(Leaf {
                            kind,
                            node,
                            label: node.id.clone().unwrap_or(label),
                        });
                    } else if let Some((kind, layout)) = child.as_layout() {
                        let first = leaves.len();
                        collect_layout_leaves(layout, &label, &mut leaves);
                        slots.push(Slot::Composite {
                            kind,
                            layout,
                            leaves: first..leaves.len(),
                            label,
                        });
                    }
                }
            }
        }

        let outcomes = join_all(
            leaves
                .iter()
                .map(|l| self.resolver.resolve(l.node, l.kind)),
        )
        .await;
        st.warnings.extend(self.resolver.take_warnings());

        let mut resolved = Vec::<Option<MediaReference>>::with_capacity(leaves.len());
        for (leaf, outcome) in leaves.iter().zip(outcomes) {
            match outcome {
                Ok(r) => resolved.push(Some(r)),
                Err(e) if e.is_recoverable() => {
                    st.warn(
                        WarningKind::SkippedNode,
                        format!("skipped {}: {e}", leaf.kind.as_str()),
                        Some(leaf.label.clone()),
                    );
                    resolved.push(None);
                }
                Err(e) => return Err(e),
            }
        }

        let has_text = !texts.is_empty() || !captions.is_empty();
        if !leaves.is_empty() && resolved.iter().all(Option::is_none) && !has_text {
            st.skipped_clips += 1;
            st.warn(
                WarningKind::SkippedClip,
                "skipped clip: none of its media could be resolved",
                Some(clip_label),
            );
            return Ok(());
        }

        let duration = match clip.duration {
            ClipDuration::Seconds(s) => s,
            ClipDuration::Auto => leaves
                .iter()
                .zip(&resolved)
                .filter(|(l, _)| matches!(l.kind, MediaNodeKind::Video | MediaNodeKind::Speech))
                .filter_map(|(_, r)| r.as_ref().and_then(|r| r.duration))
                .filter(|d| d.is_finite() && *d > 0.0)
                .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
                .unwrap_or(DEFAULT_AUTO_CLIP_SECS),
        };

        if let Some(p) = st.pending.take() {
            let mut t = p.duration;
            if t > duration {
                st.warn(
                    WarningKind::TransitionAdjusted,
                    format!(
                        "transition '{}' shortened from {t}s to the incoming clip's {duration}s",
                        p.kind
                    ),
                    Some(p.from.clone()),
                );
                t = duration;
            }
            st.current_time -= t;
            st.transitions.push(Transition {
                kind: p.kind,
                duration: t,
                clip_index: st.clip_index,
                start: st.current_time,
            });
        }

        let clip_start = st.current_time;
        let clip_index = st.clip_index;
        let (mut visual_n, mut speech_n, mut music_n) = (0usize, 0usize, 0usize);
        for slot in &slots {
            match slot {
                Slot::Media(i) => {
                    let (leaf, Some(r)) = (&leaves[*i], &resolved[*i]) else {
                        continue;
                    };
                    let mut item = media_item(leaf.node, r, clip_start, duration);
                    item.clip_index = Some(clip_index);
                    st.add_asset(r);
                    let track = match leaf.kind {
                        MediaNodeKind::Image | MediaNodeKind::Video => {
                            visual_n += 1;
                            lane(&mut st.lanes.visual, "V", TrackKind::Video, visual_n - 1)
                        }
                        MediaNodeKind::Speech => {
                            speech_n += 1;
                            lane(&mut st.lanes.speech, "A", TrackKind::Audio, speech_n - 1)
                        }
                        MediaNodeKind::Music => {
                            music_n += 1;
                            lane(&mut st.lanes.music, "M", TrackKind::Audio, music_n - 1)
                        }
                    };
                    track.items.push(item);
                }
                Slot::Composite {
                    kind,
                    layout,
                    leaves: range,
                    label,
                } => {
                    let members: Vec<(&Leaf<'_>, &MediaReference)> = range
                        .clone()
                        .filter_map(|i| resolved[i].as_ref().map(|r| (&leaves[i], r)))
                        .collect();
                    let Some((first_leaf, first_ref)) = members.first().copied() else {
                        st.warn(
                            WarningKind::SkippedNode,
                            format!("skipped {}: no child could be resolved", kind_name(*kind)),
                            Some(label.clone()),
                        );
                        continue;
                    };
                    for (_, r) in &members {
                        st.add_asset(r);
                    }
                    let mut item = media_item(first_leaf.node, first_ref, clip_start, duration);
                    item.clip_index = Some(clip_index);
                    item.layout = Some(LayoutDescriptor {
                        kind: *kind,
                        columns: layout.columns,
                        asset_ids: members.iter().map(|(_, r)| r.id.clone()).collect(),
                    });
                    visual_n += 1;
                    lane(&mut st.lanes.visual, "V", TrackKind::Video, visual_n - 1)
                        .items
                        .push(item);
                }
            }
        }

        for (node, kind) in texts {
            if let Node::Title(t) | Node::Subtitle(t) = node {
                push_text(st, t, kind, clip_start, duration);
            }
        }
        for c in captions {
            self.push_captions(st, c, clip_start, duration, &clip_label).await;
        }

        if let Some(tr) = &clip.transition {
            if is_last {
                st.warn(
                    WarningKind::TransitionAdjusted,
                    format!("transition '{}' on the last clip ignored", tr.kind),
                    Some(clip_label.clone()),
                );
            } else {
                let mut t = tr.duration;
                if t > duration {
                    st.warn(
                        WarningKind::TransitionAdjusted,
                        format!("transition '{}' clamped from {t}s to {duration}s", tr.kind),
                        Some(clip_label.clone()),
                    );
                    t = duration;
                }
                st.pending = Some(PendingTransition {
                    kind: tr.kind.clone(),
                    duration: t,
                    from: clip_label.clone(),
                });
            }
        }

        tracing::debug!(clip = %clip_label, start = clip_start, duration, "placed clip");
        st.current_time = clip_start + duration;
        st.clip_index += 1;
        Ok(())
    }

    async fn walk_global(
        &self,
        st: &mut WalkState,
        doc_idx: usize,
        node: &Node,
        total: f64,
    ) -> ClipforgeResult<()> {
        let label = format!("children[{doc_idx}]/{}", node.kind_name());
        match node {
            Node::Title(t) => push_text(st, t, TextKind::Title, 0.0, total),
            Node::Subtitle(t) => push_text(st, t, TextKind::Subtitle, 0.0, total),
            Node::Captions(c) => self.push_captions(st, c, 0.0, total, &label).await,
            Node::Image(_) | Node::Video(_) | Node::Speech(_) | Node::Music(_) => {
                let Some((kind, m)) = node.as_media() else {
                    return Ok(());
                };
                let label = m.id.clone().unwrap_or(label);
                let outcome = self.resolver.resolve(m, kind).await;
                st.warnings.extend(self.resolver.take_warnings());
                let r = match outcome {
                    Ok(r) => r,
                    Err(e) if e.is_recoverable() => {
                        st.warn(
                            WarningKind::SkippedNode,
                            format!("skipped {}: {e}", kind.as_str()),
                            Some(label),
                        );
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };
                let start = m.start.unwrap_or(0.0);
                let mut end = total;
                if let Some(d) = m.duration {
                    end = end.min(start + d);
                }
                if start >= end {
                    st.warn(
                        WarningKind::SkippedNode,
                        format!("{} starts at {start}s, past the end of the render", kind.as_str()),
                        Some(label),
                    );
                    return Ok(());
                }
                let item = media_item(m, &r, start, end - start);
                st.add_asset(&r);
                let (tracks, prefix, track_kind) = match kind {
                    MediaNodeKind::Music => (&mut st.lanes.global_music, "GM", TrackKind::Audio),
                    MediaNodeKind::Speech => (&mut st.lanes.global_speech, "GS", TrackKind::Audio),
                    MediaNodeKind::Image | MediaNodeKind::Video => {
                        (&mut st.lanes.global_visual, "GV", TrackKind::Video)
                    }
                };
                let idx = tracks.len();
                lane(tracks, prefix, track_kind, idx).items.push(item);
            }
            Node::Split(_) | Node::Slider(_) | Node::Swipe(_) | Node::Grid(_) => {
                st.warn(
                    WarningKind::SkippedNode,
                    format!("{} outside a clip ignored", node.kind_name()),
                    Some(label),
                );
            }
            Node::Render(_) | Node::Clip(_) => {}
        }
        Ok(())
    }

    async fn push_captions(
        &self,
        st: &mut WalkState,
        c: &CaptionsNode,
        window_start: f64,
        window_len: f64,
        label: &str,
    ) {
        let mut cues = c.cues.clone();
        if let Some(src) = &c.src {
            let parsed = match self.resolver.context().fetcher.fetch(src).await {
                Ok(bytes) => parse_srt(&String::from_utf8_lossy(&bytes)),
                Err(e) => Err(e),
            };
            match parsed {
                Ok(mut more) => cues.append(&mut more),
                Err(e) => st.warn(
                    WarningKind::SkippedNode,
                    format!("captions '{src}' unavailable: {e}"),
                    Some(label.to_string()),
                ),
            }
        }
        if cues.is_empty()
            && let Some(text) = &c.text
        {
            st.text_items.push(TextItem {
                kind: TextKind::Caption,
                text: text.clone(),
                start: window_start,
                duration: window_len,
                style: c.style.clone(),
            });
            return;
        }
        for cue in cues {
            let start = cue.start.max(0.0);
            let end = cue.end.min(window_len);
            if end <= start {
                continue;
            }
            st.text_items.push(TextItem {
                kind: TextKind::Caption,
                text: cue.text,
                start: window_start + start,
                duration: end - start,
                style: c.style.clone(),
            });
        }
    }
}

fn collect_layout_leaves<'a>(layout: &'a LayoutNode, label: &str, out: &mut Vec<Leaf<'a>>) {
    for (i, child) in layout.children.iter().enumerate() {
        let child_label = format!("{label}/{}[{i}]", child.kind_name());
        if let Some((kind, node)) = child.as_media() {
            out.push(Leaf {
                kind,
                node,
                label: node.id.clone().unwrap_or(child_label),
            });
        } else if let Some((_, nested)) = child.as_layout() {
            collect_layout_leaves(nested, &child_label, out);
        }
    }
}

fn kind_name(kind: LayoutKind) -> &'static str {
    match kind {
        LayoutKind::Split => "split",
        LayoutKind::Slider => "slider",
        LayoutKind::Swipe => "swipe",
        LayoutKind::Grid => "grid",
    }
}

fn media_item(node: &MediaNode, r: &MediaReference, start: f64, span: f64) -> ClipItem {
    let mut duration = span;
    if let Some(end) = node.trim_end {
        let trimmed = end - node.trim_start.unwrap_or(0.0);
        if trimmed > 0.0 {
            duration = duration.min(trimmed);
        }
    }
    if r.kind == MediaKind::Audio
        && let Some(d) = r.duration
    {
        let available = d - node.trim_start.unwrap_or(0.0);
        if available > 0.0 {
            duration = duration.min(available);
        }
    }
    ClipItem {
        asset_id: r.id.clone(),
        start,
        duration,
        trim_start: node.trim_start,
        trim_end: node.trim_end,
        volume: node.volume,
        position: node.position,
        size: node.display_size,
        zoom: node.zoom,
        layout: None,
        clip_index: None,
    }
}

fn push_text(st: &mut WalkState, t: &TextNode, kind: TextKind, window_start: f64, window_len: f64) {
    let s = t.start.unwrap_or(0.0).min(window_len);
    let e = t.end.unwrap_or(window_len).min(window_len);
    if e <= s {
        st.warn(
            WarningKind::SkippedNode,
            format!("{} '{}' has no visible interval", kind.as_str(), t.text),
            None,
        );
        return;
    }
    st.text_items.push(TextItem {
        kind,
        text: t.text.clone(),
        start: window_start + s,
        duration: e - s,
        style: t.style.clone(),
    });
}

#[cfg(test)]
#[path = "../../tests/unit/walk/walker.rs"]
mod tests;
