use crate::{
    composition::model::{
        ClipDuration, ClipNode, MediaNode, MediaNodeKind, Node, PromptInput, ReferenceInput,
        RenderNode, TextNode, TransitionSpec,
    },
    foundation::core::{Size, Vec2},
    foundation::error::{ClipforgeError, ClipforgeResult},
};

/// Builder for [`RenderNode`](crate::RenderNode).
pub struct RenderBuilder {
    width: u32,
    height: u32,
    fps: u32,
    fps_den: u32,
    name: Option<String>,
    children: Vec<Node>,
}

impl RenderBuilder {
    /// Create a builder for a new render root.
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            fps_den: 1,
            name: None,
            children: Vec::new(),
        }
    }

    /// Set the project name used by exports.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Use a fractional rate of `fps / den` frames per second.
    pub fn fps_den(mut self, den: u32) -> Self {
        self.fps_den = den;
        self
    }

    /// Append a sequenced clip.
    pub fn clip(mut self, clip: ClipNode) -> Self {
        self.children.push(Node::Clip(clip));
        self
    }

    /// Append a global (render-level) node such as music or captions.
    pub fn global(mut self, node: Node) -> Self {
        self.children.push(node);
        self
    }

    /// Build and validate the final [`RenderNode`](crate::RenderNode).
    pub fn build(self) -> ClipforgeResult<RenderNode> {
        let render = RenderNode {
            width: self.width,
            height: self.height,
            fps: self.fps,
            fps_den: self.fps_den,
            name: self.name,
            children: self.children,
        };
        render.validate()?;
        Ok(render)
    }
}

/// Builder for [`ClipNode`](crate::ClipNode) values.
#[derive(Default)]
pub struct ClipBuilder {
    id: Option<String>,
    duration: ClipDuration,
    transition: Option<TransitionSpec>,
    children: Vec<Node>,
}

impl ClipBuilder {
    /// Create a clip with `auto` duration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the clip id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set an explicit duration in seconds.
    pub fn duration(mut self, secs: f64) -> Self {
        self.duration = ClipDuration::Seconds(secs);
        self
    }

    /// Declare a transition into the next clip.
    pub fn transition(mut self, kind: impl Into<String>, secs: f64) -> Self {
        self.transition = Some(TransitionSpec {
            kind: kind.into(),
            duration: secs,
        });
        self
    }

    /// Append a child node.
    pub fn child(mut self, node: Node) -> Self {
        self.children.push(node);
        self
    }

    /// Build validated [`ClipNode`](crate::ClipNode).
    pub fn build(self) -> ClipforgeResult<ClipNode> {
        if let ClipDuration::Seconds(s) = self.duration
            && (!s.is_finite() || s <= 0.0)
        {
            return Err(ClipforgeError::validation(
                "clip duration must be finite and > 0",
            ));
        }
        if let Some(tr) = &self.transition {
            tr.validate()?;
        }
        Ok(ClipNode {
            id: self.id,
            duration: self.duration,
            transition: self.transition,
            children: self.children,
        })
    }
}

/// Builder for media-producing nodes.
pub struct MediaBuilder {
    kind: MediaNodeKind,
    node: MediaNode,
    references: Vec<ReferenceInput>,
}

impl MediaBuilder {
    /// Start a node of the given kind.
    pub fn new(kind: MediaNodeKind) -> Self {
        Self {
            kind,
            node: MediaNode::default(),
            references: Vec::new(),
        }
    }

    /// Set the node id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.node.id = Some(id.into());
        self
    }

    /// Set prompt text.
    pub fn prompt(mut self, text: impl Into<String>) -> Self {
        self.node.prompt = Some(PromptInput::Text(text.into()));
        self
    }

    /// Append a literal reference locator to the prompt.
    pub fn reference_src(mut self, locator: impl Into<String>) -> Self {
        self.references.push(ReferenceInput::Literal(locator.into()));
        self
    }

    /// Append an embedded media node reference to the prompt.
    pub fn reference_node(mut self, node: Node) -> Self {
        self.references.push(ReferenceInput::Node(Box::new(node)));
        self
    }

    /// Set a literal source locator.
    pub fn src(mut self, locator: impl Into<String>) -> Self {
        self.node.src = Some(locator.into());
        self
    }

    /// Set the model handle.
    pub fn model(mut self, handle: impl Into<String>) -> Self {
        self.node.model = Some(handle.into());
        self
    }

    /// Set generation aspect ratio.
    pub fn aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.node.aspect_ratio = Some(ratio.into());
        self
    }

    /// Set generation seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.node.seed = Some(seed);
        self
    }

    /// Set declared/requested duration.
    pub fn duration(mut self, secs: f64) -> Self {
        self.node.duration = Some(secs);
        self
    }

    /// Set voice identity.
    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.node.voice = Some(voice.into());
        self
    }

    /// Set playback volume.
    pub fn volume(mut self, volume: f64) -> Self {
        self.node.volume = Some(volume);
        self
    }

    /// Set global start offset.
    pub fn start(mut self, secs: f64) -> Self {
        self.node.start = Some(secs);
        self
    }

    /// Set source trims.
    pub fn trim(mut self, start: f64, end: Option<f64>) -> Self {
        self.node.trim_start = Some(start);
        self.node.trim_end = end;
        self
    }

    /// Set placement overrides.
    pub fn placement(mut self, position: Vec2, size: Option<Size>, zoom: Option<f64>) -> Self {
        self.node.position = Some(position);
        self.node.display_size = size;
        self.node.zoom = zoom;
        self
    }

    /// Finish as a [`Node`](crate::Node).
    pub fn build(mut self) -> Node {
        if !self.references.is_empty() {
            let text = match self.node.prompt.take() {
                Some(PromptInput::Text(t)) => t,
                Some(PromptInput::Structured { text, .. }) => text,
                None => String::new(),
            };
            self.node.prompt = Some(PromptInput::Structured {
                text,
                references: self.references,
            });
        }
        match self.kind {
            MediaNodeKind::Image => Node::Image(self.node),
            MediaNodeKind::Video => Node::Video(self.node),
            MediaNodeKind::Speech => Node::Speech(self.node),
            MediaNodeKind::Music => Node::Music(self.node),
        }
    }
}

/// Image node generated from `prompt`.
pub fn image(prompt: impl Into<String>) -> Node {
    MediaBuilder::new(MediaNodeKind::Image).prompt(prompt).build()
}

/// Video node generated from `prompt`.
pub fn video(prompt: impl Into<String>) -> Node {
    MediaBuilder::new(MediaNodeKind::Video).prompt(prompt).build()
}

/// Speech node voicing `text`.
pub fn speech(text: impl Into<String>) -> Node {
    MediaBuilder::new(MediaNodeKind::Speech).prompt(text).build()
}

/// Music node generated from `prompt`.
pub fn music(prompt: impl Into<String>) -> Node {
    MediaBuilder::new(MediaNodeKind::Music).prompt(prompt).build()
}

/// Title overlay.
pub fn title(text: impl Into<String>) -> Node {
    Node::Title(TextNode {
        text: text.into(),
        start: None,
        end: None,
        style: serde_json::Value::Null,
    })
}

/// Subtitle overlay.
pub fn subtitle(text: impl Into<String>) -> Node {
    Node::Subtitle(TextNode {
        text: text.into(),
        start: None,
        end: None,
        style: serde_json::Value::Null,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/composition/dsl.rs"]
mod tests;
