//! Document loader: parse a PDF once into the typed page tree.
//!
//! ## Why interpret the content stream ourselves?
//!
//! Text extraction libraries hand back a flat string per page and drop the
//! geometry and font of each run. Reconstruction needs both, so the loader
//! walks every page's content stream with `lopdf`, tracks the graphics and
//! text state, and emits a [`ContentNode`] for each painted thing:
//!
//! | Operators                         | Node                  |
//! |-----------------------------------|-----------------------|
//! | `Tj` `TJ` `'` `"`                 | `TextRun`             |
//! | `Do` on an image XObject          | `Image`               |
//! | `Do` on a form XObject            | `VectorShape`         |
//! | `re` `m` `l` `c` … + `f` `S` `B`… | `VectorShape`         |
//!
//! Glyph advances are estimated from Helvetica metrics (see
//! [`super::metrics`]), so run boxes are approximate horizontally. Text
//! inside form XObjects is not read.
//!
//! ## Blocks
//!
//! Each run carries a `block_id`. A run continues the current block when it
//! sits on the same line close to the previous run, or on the next line
//! (within 1.6× the font size) with a similar size and horizontal overlap.
//! Anything else (a paragraph gap, a column jump, a heading size change, an
//! image in between) starts a new block.
//!
//! Parsing is CPU-bound and synchronous; [`load`] runs it on the blocking
//! pool so the async runtime stays responsive.

use crate::document::{BoundingBox, ContentNode, Page, SourceDocument};
use crate::error::TranslateError;
use crate::pipeline::metrics;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// US Letter, used when a page has no readable MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// TJ adjustments beyond this (1/1000 em) are read as a word space.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// Load `path` into a [`SourceDocument`] on the blocking thread pool.
pub async fn load(path: &Path) -> Result<SourceDocument, TranslateError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || load_blocking(&owned))
        .await
        .map_err(|e| TranslateError::Internal(format!("loader task panicked: {e}")))?
}

/// Synchronous variant of [`load`].
pub fn load_blocking(path: &Path) -> Result<SourceDocument, TranslateError> {
    let doc = Document::load(path).map_err(|e| unsupported(path, e))?;
    from_document(&doc, path)
}

/// Parse an in-memory PDF.
pub fn load_bytes(bytes: &[u8], path: impl Into<PathBuf>) -> Result<SourceDocument, TranslateError> {
    let path = path.into();
    let doc = Document::load_mem(bytes).map_err(|e| unsupported(&path, e))?;
    from_document(&doc, &path)
}

fn unsupported(path: &Path, err: lopdf::Error) -> TranslateError {
    let reason = match err {
        lopdf::Error::Decryption(_) => "document is encrypted".to_string(),
        other => format!("not a readable PDF: {other}"),
    };
    TranslateError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason,
    }
}

/// Build the page tree from an already parsed `lopdf` document.
pub fn from_document(doc: &Document, path: &Path) -> Result<SourceDocument, TranslateError> {
    if doc.is_encrypted() {
        return Err(TranslateError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "document is encrypted".to_string(),
        });
    }

    let page_ids = doc.get_pages();
    if page_ids.is_empty() {
        return Err(TranslateError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: "document has no pages".to_string(),
        });
    }

    let mut pages = Vec::with_capacity(page_ids.len());
    for (index, (_, page_id)) in page_ids.iter().enumerate() {
        pages.push(parse_page(doc, *page_id, index));
    }

    let runs: usize = pages
        .iter()
        .map(|p| {
            p.nodes
                .iter()
                .filter(|n| matches!(n, ContentNode::TextRun { .. }))
                .count()
        })
        .sum();
    info!(
        "Loaded {} ({} pages, {} text runs)",
        path.display(),
        pages.len(),
        runs
    );

    Ok(SourceDocument::new(path, pages))
}

/// Parse one page. A page whose content cannot be decoded comes back empty
/// rather than failing the document.
fn parse_page(doc: &Document, page_id: ObjectId, index: usize) -> Page {
    let [x0, y0, x1, y1] = media_box(doc, page_id);
    let page = Page::new(index, (x1 - x0).abs(), (y1 - y0).abs());

    let content = match doc.get_page_content(page_id) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Page {}: unreadable content stream: {}", index + 1, e);
            return page;
        }
    };
    let operations = match Content::decode(&content) {
        Ok(c) => c.operations,
        Err(e) => {
            warn!("Page {}: content stream does not decode: {}", index + 1, e);
            return page;
        }
    };

    let fonts = doc.get_page_fonts(page_id).unwrap_or_default();
    let forms = form_xobjects(doc, page_id);
    let mut interp = Interpreter::new(doc, &fonts, page).with_forms(forms);
    for op in &operations {
        interp.apply(op);
    }
    let page = interp.finish();
    debug!("Page {}: {} nodes", index + 1, page.nodes.len());
    page
}

/// Names of the page's XObjects whose `/Subtype` is `/Form`.
fn form_xobjects(doc: &Document, page_id: ObjectId) -> BTreeSet<Vec<u8>> {
    let resources = effective_resources(doc, page_id);
    let xobjects = resolve_dict(doc, resources.get(b"XObject").ok());
    xobjects
        .iter()
        .filter_map(|(name, obj)| {
            let obj = match obj {
                Object::Reference(id) => doc.get_object(*id).ok()?,
                other => other,
            };
            let subtype = obj.as_stream().ok()?.dict.get(b"Subtype").ok()?.as_name().ok()?;
            (subtype == b"Form").then(|| name.clone())
        })
        .collect()
}

/// Resolve `obj` to a dictionary, following one reference.
pub(crate) fn resolve_dict(doc: &Document, obj: Option<&Object>) -> Dictionary {
    match obj {
        Some(Object::Dictionary(d)) => d.clone(),
        Some(Object::Reference(id)) => doc.get_dictionary(*id).cloned().unwrap_or_default(),
        _ => Dictionary::new(),
    }
}

/// Resources in effect for a page, following `/Parent` inheritance.
pub(crate) fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = doc.get_dictionary(page_id).ok();
    let mut depth = 0;
    while let Some(dict) = current {
        if let Ok(res) = dict.get(b"Resources") {
            return resolve_dict(doc, Some(res));
        }
        depth += 1;
        if depth > 32 {
            break;
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    Dictionary::new()
}

/// MediaBox of a page, following `/Parent` inheritance.
pub(crate) fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let mut current = doc.get_dictionary(page_id).ok();
    let mut depth = 0;
    while let Some(dict) = current {
        if let Ok(obj) = dict.get(b"MediaBox") {
            let resolved = match obj {
                Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            };
            if let Some(Object::Array(arr)) = resolved {
                let nums: Vec<f32> = arr.iter().filter_map(number).collect();
                if nums.len() == 4 {
                    return [nums[0], nums[1], nums[2], nums[3]];
                }
            }
        }
        depth += 1;
        if depth > 32 {
            break;
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    DEFAULT_MEDIA_BOX
}

pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Strip a subset tag such as `ABCDEF+` from a font name.
pub fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.chars().all(|c| c.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

/// Fallback when a font has no usable encoding.
fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

// ── Matrices ─────────────────────────────────────────────────────────────

/// Affine transform `[a b c d e f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn from_operands(ops: &[Object]) -> Option<Matrix> {
        if ops.len() < 6 {
            return None;
        }
        Some(Matrix {
            a: number(&ops[0])?,
            b: number(&ops[1])?,
            c: number(&ops[2])?,
            d: number(&ops[3])?,
            e: number(&ops[4])?,
            f: number(&ops[5])?,
        })
    }

    fn translation(tx: f32, ty: f32) -> Matrix {
        Matrix {
            e: tx,
            f: ty,
            ..Matrix::IDENTITY
        }
    }

    /// `self × other`: apply `self` first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }

    /// Length of the transformed unit y-vector: the effective text height scale.
    fn vertical_scale(&self) -> f32 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

// ── Interpreter ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct TextState {
    font: Vec<u8>,
    size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: Vec::new(),
            size: 12.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
        }
    }
}

/// Text being accumulated into one run.
#[derive(Debug)]
struct PendingRun {
    text: String,
    font: Vec<u8>,
    size: f32,
    baseline: f32,
    x0: f32,
    x1: f32,
}

/// Geometry of the current block, for continuation checks.
#[derive(Debug, Clone, Copy)]
struct BlockCursor {
    id: u32,
    extent: BoundingBox,
    baseline: f32,
    size: f32,
    run_x0: f32,
    run_x1: f32,
}

struct Interpreter<'a> {
    doc: &'a Document,
    fonts: &'a BTreeMap<Vec<u8>, &'a Dictionary>,
    forms: BTreeSet<Vec<u8>>,
    page: Page,

    ctm: Matrix,
    gstack: Vec<(Matrix, TextState)>,
    text: TextState,
    tm: Matrix,
    tlm: Matrix,
    in_text: bool,
    repositioned: bool,

    pending: Option<PendingRun>,
    block: Option<BlockCursor>,
    next_block_id: u32,

    path: Option<BoundingBox>,
}

impl<'a> Interpreter<'a> {
    fn new(doc: &'a Document, fonts: &'a BTreeMap<Vec<u8>, &'a Dictionary>, page: Page) -> Self {
        Self {
            doc,
            fonts,
            forms: BTreeSet::new(),
            page,
            ctm: Matrix::IDENTITY,
            gstack: Vec::new(),
            text: TextState::default(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            in_text: false,
            repositioned: true,
            pending: None,
            block: None,
            next_block_id: 0,
            path: None,
        }
    }

    fn with_forms(mut self, forms: BTreeSet<Vec<u8>>) -> Self {
        self.forms = forms;
        self
    }

    fn apply(&mut self, op: &Operation) {
        let args = op.operands.as_slice();
        match op.operator.as_str() {
            // Graphics state
            "q" => self.gstack.push((self.ctm, self.text.clone())),
            "Q" => {
                if let Some((ctm, text)) = self.gstack.pop() {
                    self.ctm = ctm;
                    self.text = text;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(args) {
                    self.ctm = m.then(&self.ctm);
                }
            }

            // Text objects
            "BT" => {
                self.in_text = true;
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
                self.repositioned = true;
            }
            "ET" => {
                self.flush_run();
                self.in_text = false;
            }

            // Text state
            "Tf" => {
                if let (Some(Object::Name(name)), Some(size)) =
                    (args.first(), args.get(1).and_then(number))
                {
                    self.text.font = name.clone();
                    self.text.size = size;
                }
            }
            "TL" => {
                if let Some(v) = args.first().and_then(number) {
                    self.text.leading = v;
                }
            }
            "Tc" => {
                if let Some(v) = args.first().and_then(number) {
                    self.text.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = args.first().and_then(number) {
                    self.text.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = args.first().and_then(number) {
                    self.text.horizontal_scale = v / 100.0;
                }
            }

            // Text positioning
            "Td" | "TD" => {
                if let (Some(tx), Some(ty)) = (
                    args.first().and_then(number),
                    args.get(1).and_then(number),
                ) {
                    if op.operator == "TD" {
                        self.text.leading = -ty;
                    }
                    self.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(args) {
                    self.tm = m;
                    self.tlm = m;
                    self.repositioned = true;
                }
            }
            "T*" => self.next_line(),

            // Text showing
            "Tj" => {
                if let Some(Object::String(bytes, _)) = args.first() {
                    let text = self.decode(bytes);
                    self.show(&text);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = args.first() {
                    self.show_array(items);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = args.first() {
                    let text = self.decode(bytes);
                    self.show(&text);
                }
            }
            "\"" => {
                if let Some(v) = args.first().and_then(number) {
                    self.text.word_spacing = v;
                }
                if let Some(v) = args.get(1).and_then(number) {
                    self.text.char_spacing = v;
                }
                self.next_line();
                if let Some(Object::String(bytes, _)) = args.get(2) {
                    let text = self.decode(bytes);
                    self.show(&text);
                }
            }

            // XObjects
            "Do" => {
                self.flush_run();
                let bbox = self.transformed_box(0.0, 0.0, 1.0, 1.0);
                let is_form = match args.first() {
                    Some(Object::Name(name)) => self.forms.contains(name),
                    _ => false,
                };
                // Form contents are not interpreted.
                if is_form {
                    self.page.push(ContentNode::VectorShape { bbox });
                } else {
                    self.page.push(ContentNode::Image { bbox });
                }
                self.block = None;
            }

            // Path construction
            "m" | "l" => {
                if let (Some(x), Some(y)) = (
                    args.first().and_then(number),
                    args.get(1).and_then(number),
                ) {
                    self.extend_path(x, y);
                }
            }
            "c" | "v" | "y" => {
                let nums: Vec<f32> = args.iter().filter_map(number).collect();
                for pair in nums.chunks_exact(2) {
                    self.extend_path(pair[0], pair[1]);
                }
            }
            "re" => {
                let nums: Vec<f32> = args.iter().filter_map(number).collect();
                if let &[x, y, w, h] = nums.as_slice() {
                    let rect = self.transformed_box(x, y, x + w, y + h);
                    self.path = Some(match self.path {
                        Some(p) => p.union(&rect),
                        None => rect,
                    });
                }
            }

            // Path painting
            "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                if let Some(bbox) = self.path.take() {
                    self.page.push(ContentNode::VectorShape { bbox });
                }
            }
            "n" => self.path = None,

            _ => {}
        }
    }

    fn finish(mut self) -> Page {
        self.flush_run();
        self.page
    }

    // ── Text helpers ─────────────────────────────────────────────────────

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translation(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
        self.repositioned = true;
    }

    fn next_line(&mut self) {
        let leading = if self.text.leading != 0.0 {
            self.text.leading
        } else {
            self.text.size * 1.2
        };
        self.move_line(0.0, -leading);
    }

    fn decode(&self, bytes: &[u8]) -> String {
        if let Some(font) = self.fonts.get(&self.text.font) {
            if let Ok(encoding) = font.get_font_encoding(self.doc) {
                if let Ok(text) = Document::decode_text(&encoding, bytes) {
                    return text;
                }
            }
        }
        decode_text_simple(bytes)
    }

    fn font_family(&self, resource: &[u8]) -> String {
        let base = self
            .fonts
            .get(resource)
            .and_then(|d| d.get(b"BaseFont").ok())
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_else(|| String::from_utf8_lossy(resource).into_owned());
        strip_subset_prefix(&base).to_string()
    }

    fn show_array(&mut self, items: &[Object]) {
        for item in items {
            match item {
                Object::String(bytes, _) => {
                    let text = self.decode(bytes);
                    self.show(&text);
                }
                other => {
                    if let Some(adjust) = number(other) {
                        let tx = -adjust / 1000.0 * self.text.size * self.text.horizontal_scale;
                        self.tm = Matrix::translation(tx, 0.0).then(&self.tm);
                        if -adjust > TJ_SPACE_THRESHOLD {
                            if let Some(run) = self.pending.as_mut() {
                                if !run.text.ends_with(char::is_whitespace) {
                                    run.text.push(' ');
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Paint `text` at the current text position and advance past it.
    fn show(&mut self, text: &str) {
        if !self.in_text || text.is_empty() {
            return;
        }

        let state = &self.text;
        let spaces = text.chars().filter(|c| *c == ' ').count() as f32;
        let glyphs = text.chars().count() as f32;
        let advance = (metrics::text_width(text, state.size)
            + glyphs * state.char_spacing
            + spaces * state.word_spacing)
            * state.horizontal_scale;

        let trm = self.tm.then(&self.ctm);
        let (sx, sy) = trm.apply(0.0, 0.0);
        self.tm = Matrix::translation(advance, 0.0).then(&self.tm);
        let (ex, _) = self.tm.then(&self.ctm).apply(0.0, 0.0);
        let size = state.size * trm.vertical_scale();

        let continues = !self.repositioned
            && self
                .pending
                .as_ref()
                .is_some_and(|p| p.font == self.text.font && (p.size - size).abs() < 0.01);

        if continues {
            if let Some(run) = self.pending.as_mut() {
                run.text.push_str(text);
                run.x0 = run.x0.min(sx.min(ex));
                run.x1 = run.x1.max(sx.max(ex));
            }
        } else {
            self.flush_run();
            self.pending = Some(PendingRun {
                text: text.to_string(),
                font: self.text.font.clone(),
                size,
                baseline: sy,
                x0: sx.min(ex),
                x1: sx.max(ex),
            });
        }
        self.repositioned = false;
    }

    fn flush_run(&mut self) {
        let Some(run) = self.pending.take() else {
            return;
        };
        if run.text.trim().is_empty() {
            return;
        }

        let bbox = BoundingBox::new(
            run.x0,
            run.baseline - 0.2 * run.size,
            run.x1,
            run.baseline + 0.8 * run.size,
        );
        let block_id = self.assign_block(&run, bbox);
        let font_family = self.font_family(&run.font);
        self.page.push(ContentNode::TextRun {
            bbox,
            text: run.text,
            font_family,
            font_size: run.size,
            block_id,
        });
    }

    fn assign_block(&mut self, run: &PendingRun, bbox: BoundingBox) -> u32 {
        if let Some(cursor) = self.block.as_mut() {
            if continues_block(cursor, run) {
                cursor.extent = cursor.extent.union(&bbox);
                cursor.baseline = run.baseline;
                cursor.size = run.size;
                cursor.run_x0 = run.x0;
                cursor.run_x1 = run.x1;
                return cursor.id;
            }
        }

        let id = self.next_block_id;
        self.next_block_id += 1;
        self.block = Some(BlockCursor {
            id,
            extent: bbox,
            baseline: run.baseline,
            size: run.size,
            run_x0: run.x0,
            run_x1: run.x1,
        });
        id
    }

    // ── Path helpers ─────────────────────────────────────────────────────

    fn extend_path(&mut self, x: f32, y: f32) {
        let (px, py) = self.ctm.apply(x, y);
        let point = BoundingBox {
            x0: px,
            y0: py,
            x1: px,
            y1: py,
        };
        self.path = Some(match self.path {
            Some(p) => p.union(&point),
            None => point,
        });
    }

    /// Box `(x0,y0)-(x1,y1)` in user space mapped through the CTM.
    fn transformed_box(&self, x0: f32, y0: f32, x1: f32, y1: f32) -> BoundingBox {
        let corners = [
            self.ctm.apply(x0, y0),
            self.ctm.apply(x1, y0),
            self.ctm.apply(x0, y1),
            self.ctm.apply(x1, y1),
        ];
        let (mut bx0, mut by0) = corners[0];
        let (mut bx1, mut by1) = corners[0];
        for (x, y) in &corners[1..] {
            bx0 = bx0.min(*x);
            by0 = by0.min(*y);
            bx1 = bx1.max(*x);
            by1 = by1.max(*y);
        }
        BoundingBox::new(bx0, by0, bx1, by1)
    }
}

/// Whether `run` belongs to the block described by `cursor`.
fn continues_block(cursor: &BlockCursor, run: &PendingRun) -> bool {
    let size = cursor.size.max(run.size);
    let drop = cursor.baseline - run.baseline;

    // Same line: must start near where the previous run ended.
    if drop.abs() < 0.3 * size {
        return run.x0 >= cursor.run_x0 - size && run.x0 <= cursor.run_x1 + 2.0 * size;
    }

    // Next line: similar size, horizontally overlapping the block so far.
    drop > 0.0
        && drop <= 1.6 * size
        && (cursor.size - run.size).abs() <= 1.0
        && run.x0 < cursor.extent.x1
        && run.x1 > cursor.extent.x0
}
