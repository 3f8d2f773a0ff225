//! Overlay reconstructor: translated text drawn over the source PDF on a
//! toggleable layer.
//!
//! ## Why an optional-content layer?
//!
//! Readers can switch a PDF optional content group (OCG) on and off. Every
//! cover rectangle and translated line lives inside `/OC … BDC … EMC` for a
//! group named after the target language, so hiding the layer shows the
//! untouched original underneath. The source file itself is never written.
//!
//! ## Per block
//!
//! ```text
//! /OC /OCTr0 BDC
//!   q 1 1 1 rg x y w h re f Q          opaque cover over the source text
//!   BT /FTr0 s Tf 0 g … Tj … ET        translated lines, top-aligned
//! EMC
//! ```
//!
//! Text is set in Helvetica (a standard font every reader ships) through
//! WinAnsi encoding. Characters outside it are folded to their base letter
//! where possible. Size starts at the block's source size and shrinks in
//! half-point steps down to [`MIN_FONT_SIZE`]; if nothing fits, the block is
//! reported as [`LayoutOutcome::Skipped`] and only its cover is drawn.

use crate::document::{BoundingBox, TranslatedBlock};
use crate::error::{LayoutError, TranslateError};
use crate::output::BlockRef;
use crate::pipeline::load::{effective_resources, resolve_dict};
use crate::pipeline::metrics;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Smallest font size the layout will shrink to.
pub const MIN_FONT_SIZE: f32 = 4.0;

/// Baseline-to-baseline distance as a multiple of the font size.
pub const LINE_HEIGHT: f32 = 1.2;

const SIZE_STEP: f32 = 0.5;
const COVER_PADDING: f32 = 1.0;
const FONT_PREFIX: &str = "FTr";
const LAYER_PREFIX: &str = "OCTr";

// ── Layout ───────────────────────────────────────────────────────────────

/// Result of fitting one block's translation into its box.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutOutcome {
    Placed { font_size: f32, lines: Vec<String> },
    Skipped { reason: LayoutError },
}

impl LayoutOutcome {
    pub fn is_placed(&self) -> bool {
        matches!(self, LayoutOutcome::Placed { .. })
    }
}

/// Wrap `text` into `bbox`, shrinking from `preferred_size` as needed.
///
/// `text` is measured with Helvetica metrics.
pub fn layout(text: &str, bbox: &BoundingBox, preferred_size: f32) -> LayoutOutcome {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = if preferred_size.is_finite() && preferred_size > 0.0 {
        preferred_size.max(MIN_FONT_SIZE)
    } else {
        bbox.height().max(MIN_FONT_SIZE)
    };

    if words.is_empty() {
        return LayoutOutcome::Placed {
            font_size: start,
            lines: Vec::new(),
        };
    }
    if bbox.is_degenerate() || bbox.height() < MIN_FONT_SIZE {
        return LayoutOutcome::Skipped {
            reason: LayoutError::BoxTooSmall {
                width: bbox.width(),
                height: bbox.height(),
            },
        };
    }

    let mut size = start;
    loop {
        let reason = match wrap(&words, bbox.width(), size) {
            Ok(lines) => {
                let capacity = line_capacity(bbox.height(), size);
                if lines.len() <= capacity {
                    return LayoutOutcome::Placed {
                        font_size: size,
                        lines,
                    };
                }
                LayoutError::Overflow {
                    lines: lines.len(),
                    capacity,
                    font_size: size,
                }
            }
            Err(word) => LayoutError::WordTooWide { word },
        };

        if size <= MIN_FONT_SIZE {
            return LayoutOutcome::Skipped { reason };
        }
        size = (size - SIZE_STEP).max(MIN_FONT_SIZE);
    }
}

/// Lines of `size` that fit in `height`: the first needs one em, each
/// further line one line height.
fn line_capacity(height: f32, size: f32) -> usize {
    if height < size {
        return 0;
    }
    ((height - size) / (size * LINE_HEIGHT)).floor() as usize + 1
}

/// Greedy word wrap. Fails with the first word wider than `width`.
fn wrap(words: &[&str], width: f32, size: f32) -> Result<Vec<String>, String> {
    let space = metrics::text_width(" ", size);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0;

    for word in words {
        let w = metrics::text_width(word, size);
        if w > width {
            return Err((*word).to_string());
        }
        if current.is_empty() {
            current.push_str(word);
            current_width = w;
        } else if current_width + space + w <= width {
            current.push(' ');
            current.push_str(word);
            current_width += space + w;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_width = w;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    Ok(lines)
}

// ── WinAnsi ──────────────────────────────────────────────────────────────

/// Byte for `c` in WinAnsiEncoding, if it has one.
pub fn win_ansi_byte(c: char) -> Option<u8> {
    let code = c as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => {
            let byte = match c {
                '\u{20AC}' => 0x80,
                '\u{201A}' => 0x82,
                '\u{0192}' => 0x83,
                '\u{201E}' => 0x84,
                '\u{2026}' => 0x85,
                '\u{2020}' => 0x86,
                '\u{2021}' => 0x87,
                '\u{02C6}' => 0x88,
                '\u{2030}' => 0x89,
                '\u{0160}' => 0x8A,
                '\u{2039}' => 0x8B,
                '\u{0152}' => 0x8C,
                '\u{017D}' => 0x8E,
                '\u{2018}' => 0x91,
                '\u{2019}' => 0x92,
                '\u{201C}' => 0x93,
                '\u{201D}' => 0x94,
                '\u{2022}' => 0x95,
                '\u{2013}' => 0x96,
                '\u{2014}' => 0x97,
                '\u{02DC}' => 0x98,
                '\u{2122}' => 0x99,
                '\u{0161}' => 0x9A,
                '\u{203A}' => 0x9B,
                '\u{0153}' => 0x9C,
                '\u{017E}' => 0x9E,
                '\u{0178}' => 0x9F,
                _ => return None,
            };
            Some(byte)
        }
    }
}

/// Text rewritten into characters WinAnsi can encode.
#[derive(Debug, Clone, PartialEq)]
pub struct Folded {
    pub text: String,
    /// Non-whitespace characters replaced by `?`.
    pub unencodable: usize,
    /// Non-whitespace characters in the input.
    pub total: usize,
}

/// Fold `text` into WinAnsi: compatibility-decompose unknown characters,
/// keep the base letter with its first accent when that composes to an
/// encodable character, else the bare base letter, else `?`.
pub fn fold_to_win_ansi(text: &str) -> Folded {
    let mut out = String::with_capacity(text.len());
    let mut unencodable = 0;
    let mut total = 0;

    for c in text.chars() {
        if c.is_whitespace() {
            out.push(' ');
            continue;
        }
        total += 1;
        if win_ansi_byte(c).is_some() {
            out.push(c);
            continue;
        }

        let decomposed: String = c.to_string().nfkd().collect();
        let base: String = decomposed
            .chars()
            .filter(|d| !is_combining_mark(*d))
            .collect();
        let first_mark = decomposed.chars().find(|d| is_combining_mark(*d));

        if let Some(mark) = first_mark {
            let composed: String = format!("{base}{mark}").nfc().collect();
            if composed.chars().all(|d| win_ansi_byte(d).is_some()) {
                out.push_str(&composed);
                continue;
            }
        }
        if !base.is_empty() && base.chars().all(|d| win_ansi_byte(d).is_some()) {
            out.push_str(&base);
        } else {
            out.push('?');
            unencodable += 1;
        }
    }

    Folded {
        text: out,
        unencodable,
        total,
    }
}

fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(|c| win_ansi_byte(c).unwrap_or(b'?')).collect()
}

// ── Report ───────────────────────────────────────────────────────────────

/// Layout result for one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOutcome {
    pub block: BlockRef,
    pub outcome: LayoutOutcome,
}

/// What [`OverlayWriter::apply`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayReport {
    /// Name of the optional content group the overlay was drawn on.
    pub layer: String,
    pub outcomes: Vec<BlockOutcome>,
}

impl OverlayReport {
    pub fn placed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_placed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.placed()
    }
}

// ── Writer ───────────────────────────────────────────────────────────────

/// A copy of a source PDF being overlaid with translations.
pub struct OverlayWriter {
    doc: Document,
    page_ids: Vec<ObjectId>,
}

impl OverlayWriter {
    /// Parse the PDF at `path`. The file is only read.
    pub fn open(path: &Path) -> Result<Self, TranslateError> {
        let doc = Document::load(path).map_err(|e| TranslateError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: format!("not a readable PDF: {e}"),
        })?;
        Self::from_document(doc, path)
    }

    pub fn from_bytes(bytes: &[u8], path: impl Into<PathBuf>) -> Result<Self, TranslateError> {
        let path = path.into();
        let doc = Document::load_mem(bytes).map_err(|e| TranslateError::UnsupportedFormat {
            path: path.clone(),
            reason: format!("not a readable PDF: {e}"),
        })?;
        Self::from_document(doc, &path)
    }

    fn from_document(doc: Document, path: &Path) -> Result<Self, TranslateError> {
        if doc.is_encrypted() {
            return Err(TranslateError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: "document is encrypted".to_string(),
            });
        }
        let page_ids = doc.get_pages().into_values().collect();
        Ok(Self {
            doc,
            page_ids,
        })
    }

    /// Cover every block and draw its translation on the layer named
    /// `target_language`.
    pub fn apply(
        &mut self,
        blocks: &[TranslatedBlock],
        target_language: &str,
    ) -> Result<OverlayReport, TranslateError> {
        let layer_id = ensure_layer(&mut self.doc, target_language)?;
        let font_id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut by_page: BTreeMap<usize, Vec<&TranslatedBlock>> = BTreeMap::new();
        for tb in blocks {
            by_page.entry(tb.block.page_index).or_default().push(tb);
        }

        let mut report = OverlayReport {
            layer: target_language.to_string(),
            outcomes: Vec::with_capacity(blocks.len()),
        };

        for (page_index, page_blocks) in by_page {
            let page_id = *self.page_ids.get(page_index).ok_or_else(|| {
                TranslateError::Internal(format!(
                    "block refers to page {} but the document has {}",
                    page_index + 1,
                    self.page_ids.len()
                ))
            })?;

            let (font_name, layer_name) =
                register_page_resources(&mut self.doc, page_id, font_id, layer_id)?;

            let mut operations = Vec::new();
            for tb in page_blocks {
                let outcome = place_block(tb);
                if let LayoutOutcome::Skipped { reason } = &outcome {
                    warn!(
                        "Page {} block {}: translation not drawn ({})",
                        page_index + 1,
                        tb.block.block_index,
                        reason
                    );
                }
                block_operations(
                    &mut operations,
                    &tb.block.bbox,
                    &outcome,
                    &font_name,
                    &layer_name,
                );
                report.outcomes.push(BlockOutcome {
                    block: BlockRef {
                        page_index,
                        block_index: tb.block.block_index,
                    },
                    outcome,
                });
            }

            let bytes = Content { operations }.encode()?;
            append_page_content(&mut self.doc, page_id, bytes)?;
        }

        info!(
            "Overlay layer '{}': {} blocks placed, {} skipped",
            report.layer,
            report.placed(),
            report.skipped()
        );
        Ok(report)
    }

    /// Serialise the overlaid document.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, TranslateError> {
        let mut out = Vec::new();
        self.doc.save_to(&mut out).map_err(|e| {
            TranslateError::Internal(format!("serialising overlay PDF: {e}"))
        })?;
        Ok(out)
    }

    /// Write the overlaid document to `path`.
    pub fn save(&mut self, path: &Path) -> Result<(), TranslateError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|source| TranslateError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn place_block(tb: &TranslatedBlock) -> LayoutOutcome {
    let folded = fold_to_win_ansi(&tb.translated_text);
    if folded.total > 0 && folded.unencodable * 2 > folded.total {
        return LayoutOutcome::Skipped {
            reason: LayoutError::UnsupportedScript {
                unencodable: folded.unencodable,
                total: folded.total,
            },
        };
    }
    layout(&folded.text, &tb.block.bbox, tb.block.font_size)
}

fn block_operations(
    ops: &mut Vec<Operation>,
    bbox: &BoundingBox,
    outcome: &LayoutOutcome,
    font_name: &[u8],
    layer_name: &[u8],
) {
    ops.push(Operation::new(
        "BDC",
        vec![
            Object::Name(b"OC".to_vec()),
            Object::Name(layer_name.to_vec()),
        ],
    ));

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("rg", vec![1.into(), 1.into(), 1.into()]));
    ops.push(Operation::new(
        "re",
        vec![
            (bbox.x0 - COVER_PADDING).into(),
            (bbox.y0 - COVER_PADDING).into(),
            (bbox.width() + 2.0 * COVER_PADDING).into(),
            (bbox.height() + 2.0 * COVER_PADDING).into(),
        ],
    ));
    ops.push(Operation::new("f", vec![]));
    ops.push(Operation::new("Q", vec![]));

    if let LayoutOutcome::Placed { font_size, lines } = outcome {
        if !lines.is_empty() {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new(
                "Tf",
                vec![Object::Name(font_name.to_vec()), (*font_size).into()],
            ));
            ops.push(Operation::new("g", vec![0.into()]));
            let mut baseline = bbox.y1 - 0.8 * font_size;
            for line in lines {
                ops.push(Operation::new(
                    "Tm",
                    vec![
                        1.into(),
                        0.into(),
                        0.into(),
                        1.into(),
                        bbox.x0.into(),
                        baseline.into(),
                    ],
                ));
                ops.push(Operation::new(
                    "Tj",
                    vec![Object::String(
                        encode_win_ansi(line),
                        StringFormat::Hexadecimal,
                    )],
                ));
                baseline -= font_size * LINE_HEIGHT;
            }
            ops.push(Operation::new("ET", vec![]));
        }
    }

    ops.push(Operation::new("EMC", vec![]));
}

// ── PDF plumbing ─────────────────────────────────────────────────────────

fn resolve_array(doc: &Document, obj: Option<&Object>) -> Vec<Object> {
    match obj {
        Some(Object::Array(a)) => a.clone(),
        Some(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(a)) => a.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn ocg_name(doc: &Document, id: ObjectId) -> Option<String> {
    match doc.get_dictionary(id).ok()?.get(b"Name").ok()? {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// Find or create the OCG called `name`, registered in the catalog's
/// `/OCProperties` and switched on by default.
fn ensure_layer(doc: &mut Document, name: &str) -> Result<ObjectId, TranslateError> {
    let catalog_id = doc.trailer.get(b"Root")?.as_reference()?;
    let (mut props, props_ref) = {
        let catalog = doc.get_dictionary(catalog_id)?;
        match catalog.get(b"OCProperties") {
            Ok(Object::Reference(id)) => (doc.get_dictionary(*id)?.clone(), Some(*id)),
            Ok(Object::Dictionary(d)) => (d.clone(), None),
            _ => (Dictionary::new(), None),
        }
    };

    let mut ocgs = resolve_array(doc, props.get(b"OCGs").ok());
    for obj in &ocgs {
        if let Object::Reference(id) = obj {
            if ocg_name(doc, *id).as_deref() == Some(name) {
                debug!("Reusing optional content group '{}'", name);
                return Ok(*id);
            }
        }
    }

    let layer_id = doc.add_object(dictionary! {
        "Type" => "OCG",
        "Name" => Object::string_literal(name),
    });
    ocgs.push(layer_id.into());
    props.set("OCGs", ocgs);

    let mut config = resolve_dict(doc, props.get(b"D").ok());
    let mut on = resolve_array(doc, config.get(b"ON").ok());
    on.push(layer_id.into());
    config.set("ON", on);
    let mut order = resolve_array(doc, config.get(b"Order").ok());
    order.push(layer_id.into());
    config.set("Order", order);
    props.set("D", config);

    match props_ref {
        Some(id) => {
            doc.objects.insert(id, Object::Dictionary(props));
        }
        None => {
            doc.get_object_mut(catalog_id)?
                .as_dict_mut()?
                .set("OCProperties", props);
        }
    }
    debug!("Created optional content group '{}'", name);
    Ok(layer_id)
}

/// A resource name under `prefix` that is free or already bound to `target`.
fn resource_name(dict: &Dictionary, prefix: &str, target: ObjectId) -> Vec<u8> {
    let mut i = 0;
    loop {
        let name = format!("{prefix}{i}").into_bytes();
        match dict.get(&name) {
            Ok(Object::Reference(id)) if *id == target => return name,
            Ok(_) => i += 1,
            Err(_) => return name,
        }
    }
}

/// Give the page its own resource dictionary containing the overlay font
/// and layer. Returns their resource names.
fn register_page_resources(
    doc: &mut Document,
    page_id: ObjectId,
    font_id: ObjectId,
    layer_id: ObjectId,
) -> Result<(Vec<u8>, Vec<u8>), TranslateError> {
    let mut resources = effective_resources(doc, page_id);

    let mut fonts = resolve_dict(doc, resources.get(b"Font").ok());
    let font_name = resource_name(&fonts, FONT_PREFIX, font_id);
    fonts.set(font_name.clone(), font_id);
    resources.set("Font", fonts);

    let mut properties = resolve_dict(doc, resources.get(b"Properties").ok());
    let layer_name = resource_name(&properties, LAYER_PREFIX, layer_id);
    properties.set(layer_name.clone(), layer_id);
    resources.set("Properties", properties);

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Resources", resources);
    Ok((font_name, layer_name))
}

/// Wrap the page's existing content in `q … Q` and append `overlay` after
/// it, so graphics state left behind by the source cannot leak into it.
fn append_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    overlay: Vec<u8>,
) -> Result<(), TranslateError> {
    let existing = {
        let page = doc.get_dictionary(page_id)?;
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => match doc.get_object(*id) {
                Ok(Object::Array(arr)) => arr.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Array(arr)) => arr.clone(),
            _ => Vec::new(),
        }
    };

    let open_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let mut body = b"Q\n".to_vec();
    body.extend_from_slice(&overlay);
    let close_id = doc.add_object(Stream::new(dictionary! {}, body));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(close_id));

    doc.get_object_mut(page_id)?
        .as_dict_mut()?
        .set("Contents", contents);
    Ok(())
}
