//! Typed page/content tree for a parsed paginated document.
//!
//! The loader ([`crate::pipeline::load`]) turns a PDF content stream into
//! this tree once; every later stage reads it without touching the PDF
//! library again. Content is kept as a closed set of node variants so the
//! extractor can filter with a `match` instead of probing dynamic
//! dictionaries.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Axis-aligned rectangle in PDF user space (origin bottom-left, points).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    /// Build a box from two corners in any order.
    pub fn new(xa: f32, ya: f32, xb: f32, yb: f32) -> Self {
        Self {
            x0: xa.min(xb),
            y0: ya.min(yb),
            x1: xa.max(xb),
            y1: ya.max(yb),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// True when the box has no area (or is not a number).
    pub fn is_degenerate(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

/// One piece of painted page content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentNode {
    /// A run of glyphs drawn with a single font and size.
    ///
    /// `block_id` groups runs the loader judged to form one paragraph; the
    /// extractor merges consecutive runs with equal ids into one block.
    TextRun {
        bbox: BoundingBox,
        text: String,
        font_family: String,
        font_size: f32,
        block_id: u32,
    },
    /// A placed raster image.
    Image { bbox: BoundingBox },
    /// A filled or stroked path.
    VectorShape { bbox: BoundingBox },
}

impl ContentNode {
    pub fn bbox(&self) -> &BoundingBox {
        match self {
            ContentNode::TextRun { bbox, .. }
            | ContentNode::Image { bbox }
            | ContentNode::VectorShape { bbox } => bbox,
        }
    }
}

/// A page: its media box size and content in paint order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 0-based page index.
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<ContentNode>,
}

impl Page {
    pub fn new(index: usize, width: f32, height: f32) -> Self {
        Self {
            index,
            width,
            height,
            nodes: Vec::new(),
        }
    }

    /// Append a node, keeping paint order.
    pub fn push(&mut self, node: ContentNode) {
        self.nodes.push(node);
    }
}

/// An immutable, fully parsed document.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    path: PathBuf,
    pages: Vec<Page>,
}

impl SourceDocument {
    pub fn new(path: impl Into<PathBuf>, pages: Vec<Page>) -> Self {
        Self {
            path: path.into(),
            pages,
        }
    }

    /// Path the document was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// A contiguous run of text on one page with one representative style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub bbox: BoundingBox,
    pub text: String,
    pub font_family: String,
    pub font_size: f32,
    pub page_index: usize,
    pub block_index: usize,
}

/// A (source text, target language) pair submitted to the translator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    pub source_text: String,
    pub target_language: String,
}

/// A block paired with its translation; input to both reconstructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedBlock {
    pub block: TextBlock,
    pub translated_text: String,
}
