//! Turns assistant reply text into typed display nodes.
//!
//! Parsing runs as a fixed pipeline of regex layers. Each layer claims the
//! spans its pattern matches and hands every gap between matches to the layer
//! below it, so the order of [`PIPELINE`] decides what may nest inside what:
//! fenced code shields its contents from everything, headings and list items
//! carry inline styling, and italics are the innermost style.

use crate::media::{MediaHints, StructuredMedia};
use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::LazyLock;

/// Display key of a node. Unique within one formatting call only.
pub type NodeKey = u32;

#[derive(Debug, Clone, Serialize)]
pub struct DisplayNode {
    pub key: NodeKey,
    #[serde(flatten)]
    pub kind: NodeKind,
}

// Keys are render identities, not content.
impl PartialEq for DisplayNode {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for DisplayNode {}

impl DisplayNode {
    pub fn new(key: NodeKey, kind: NodeKind) -> Self {
        Self { key, kind }
    }

    /// Child nodes for container kinds, empty otherwise.
    pub fn children(&self) -> &[DisplayNode] {
        match &self.kind {
            NodeKind::Heading { inline, .. }
            | NodeKind::ListItem { inline, .. }
            | NodeKind::Bold { inline }
            | NodeKind::Italic { inline } => inline,
            _ => &[],
        }
    }

    /// Concatenated text content with all styling dropped.
    pub fn plain_text(&self) -> String {
        match &self.kind {
            NodeKind::Text { value } => value.clone(),
            NodeKind::CodeBlock { code } => code.clone(),
            NodeKind::InlineCode { text } => text.clone(),
            NodeKind::Media(_) => String::new(),
            _ => self.children().iter().map(DisplayNode::plain_text).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Heading {
        level: u8,
        inline: Vec<DisplayNode>,
    },
    ListItem {
        kind: ListKind,
        marker: String,
        inline: Vec<DisplayNode>,
    },
    CodeBlock {
        code: String,
    },
    InlineCode {
        text: String,
    },
    Bold {
        inline: Vec<DisplayNode>,
    },
    Italic {
        inline: Vec<DisplayNode>,
    },
    Text {
        value: String,
    },
    Media(StructuredMedia),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Numbered,
    Bulleted,
}

/// One text layer of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Fence,
    Heading,
    List,
    InlineCode,
    Bold,
    Italic,
}

/// Text layers in precedence order. Media detection runs ahead of these.
pub const PIPELINE: [Layer; 6] = [
    Layer::Fence,
    Layer::Heading,
    Layer::List,
    Layer::InlineCode,
    Layer::Bold,
    Layer::Italic,
];

static FENCE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)```(.*?)```"));
static HEADING: LazyLock<Regex> = LazyLock::new(|| compile(r"(?mR)^(#{1,6})[ \t]+(.+)$"));
static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| compile(r"(?mR)^([0-9]+\.|[-•])[ \t]+(.+)$"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| compile(r"`([^`]+)`"));
static BOLD: LazyLock<Regex> = LazyLock::new(|| compile(r"\*\*([^*]+)\*\*"));
static ITALIC: LazyLock<Regex> = LazyLock::new(|| compile(r"\*([^*]+)\*"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("formatter patterns are valid")
}

impl Layer {
    /// Layer that receives the text this layer does not claim. `None` means plain text.
    pub fn gaps(self) -> Option<Layer> {
        match self {
            Self::Fence => Some(Self::Heading),
            Self::Heading => Some(Self::List),
            Self::List => Some(Self::InlineCode),
            Self::InlineCode => Some(Self::Bold),
            Self::Bold => Some(Self::Italic),
            Self::Italic => None,
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::Fence => &FENCE,
            Self::Heading => &HEADING,
            Self::List => &LIST_ITEM,
            Self::InlineCode => &INLINE_CODE,
            Self::Bold => &BOLD,
            Self::Italic => &ITALIC,
        }
    }
}

/// Stateless formatter; the media hints are its only configuration.
#[derive(Debug, Clone, Default)]
pub struct FormatterEngine {
    hints: MediaHints,
}

impl FormatterEngine {
    pub fn new(hints: MediaHints) -> Self {
        Self { hints }
    }

    /// Formats `text` into display nodes.
    ///
    /// When `response_kind` names an image or audio producer and `text` decodes as
    /// that media record, the result is a single [`NodeKind::Media`] node. Any
    /// other input runs through the text layers; malformed markup degrades to
    /// plain text rather than failing.
    pub fn format(&self, text: &str, response_kind: Option<&str>) -> Vec<DisplayNode> {
        let mut pass = Pass::default();
        if let Some(kind) = response_kind.and_then(|hint| self.hints.classify(hint)) {
            match StructuredMedia::decode(kind, text) {
                Some(media) => return vec![pass.node(NodeKind::Media(media))],
                None => tracing::warn!(
                    ?kind,
                    ?response_kind,
                    "media response did not decode, rendering as text"
                ),
            }
        }
        pass.run(PIPELINE[0], text)
    }
}

/// Formats with the default media hints.
pub fn format_response(text: &str, response_kind: Option<&str>) -> Vec<DisplayNode> {
    FormatterEngine::default().format(text, response_kind)
}

/// Runs the pipeline starting at `layer`, skipping everything above it.
pub fn run_layer(layer: Layer, text: &str) -> Vec<DisplayNode> {
    Pass::default().run(layer, text)
}

#[derive(Default)]
struct Pass {
    next_key: NodeKey,
}

impl Pass {
    fn node(&mut self, kind: NodeKind) -> DisplayNode {
        let key = self.next_key;
        self.next_key += 1;
        DisplayNode::new(key, kind)
    }

    fn text(&mut self, value: &str) -> DisplayNode {
        self.node(NodeKind::Text {
            value: value.to_string(),
        })
    }

    fn run(&mut self, layer: Layer, text: &str) -> Vec<DisplayNode> {
        if text.is_empty() {
            return Vec::new();
        }
        let mut nodes = Vec::new();
        let mut last = 0;
        for caps in layer.pattern().captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                nodes.extend(self.descend(layer, &text[last..whole.start()]));
            }
            nodes.push(self.claim(layer, &caps));
            last = whole.end();
        }
        if last < text.len() {
            nodes.extend(self.descend(layer, &text[last..]));
        }
        coalesce_text(nodes)
    }

    fn descend(&mut self, layer: Layer, text: &str) -> Vec<DisplayNode> {
        match layer.gaps() {
            Some(below) => self.run(below, text),
            None => vec![self.text(text)],
        }
    }

    fn claim(&mut self, layer: Layer, caps: &Captures<'_>) -> DisplayNode {
        let group = |index: usize| caps.get(index).map_or("", |m| m.as_str());
        let kind = match layer {
            Layer::Fence => NodeKind::CodeBlock {
                code: group(1).to_string(),
            },
            Layer::Heading => {
                let level = group(1).len().min(6) as u8;
                NodeKind::Heading {
                    level,
                    inline: self.run(Layer::InlineCode, group(2)),
                }
            }
            Layer::List => {
                let marker = group(1);
                let kind = if marker.ends_with('.') {
                    ListKind::Numbered
                } else {
                    ListKind::Bulleted
                };
                NodeKind::ListItem {
                    kind,
                    marker: marker.to_string(),
                    inline: self.run(Layer::InlineCode, group(2)),
                }
            }
            Layer::InlineCode => NodeKind::InlineCode {
                text: group(1).to_string(),
            },
            Layer::Bold => NodeKind::Bold {
                inline: self.run(Layer::Italic, group(1)),
            },
            Layer::Italic => NodeKind::Italic {
                inline: vec![self.text(group(1))],
            },
        };
        self.node(kind)
    }
}

/// Merges runs of adjacent `Text` nodes. The merged node keeps the first key.
fn coalesce_text(nodes: Vec<DisplayNode>) -> Vec<DisplayNode> {
    let mut merged: Vec<DisplayNode> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let NodeKind::Text { value } = &node.kind {
            if let Some(NodeKind::Text { value: previous }) = merged.last_mut().map(|n| &mut n.kind)
            {
                previous.push_str(value);
                continue;
            }
        }
        merged.push(node);
    }
    merged
}
