//! Block extractor: group text runs into translatable blocks.
//!
//! Walks pages in order and yields one [`TextBlock`] per run of consecutive
//! `TextRun` nodes sharing a `block_id`. Images and vector shapes are
//! skipped. The iterator is lazy: nothing beyond the current block is
//! materialised, so a caller that stops at the first language mismatch
//! never pays for the rest of the document.
//!
//! A block takes the font of its first run as its representative style and
//! the union of its runs' boxes as its bounding box. Runs on a new line are
//! joined with `\n`. Runs on the same line are joined with a space only when
//! the horizontal gap exceeds a fifth of the average glyph width, so words
//! that a producer positions fragment by fragment stay whole; two
//! Chinese or Japanese characters are never separated. The result goes
//! through [`clean_block_text`] so hyphenated line breaks are rejoined.
//! Blocks whose text is blank after cleanup, or whose box has no area, are
//! not emitted and do not consume a `block_index`.

use crate::document::{BoundingBox, ContentNode, Page, SourceDocument, TextBlock};
use crate::pipeline::normalize::{clean_block_text, is_spaceless_script_char};

/// Lazily extract all text blocks of `doc` in document order.
pub fn extract(doc: &SourceDocument) -> impl Iterator<Item = TextBlock> + '_ {
    doc.pages().iter().flat_map(extract_page)
}

/// Extract the blocks of a single page.
pub fn extract_page(page: &Page) -> PageBlocks<'_> {
    PageBlocks {
        page,
        cursor: 0,
        emitted: 0,
    }
}

/// Iterator over the blocks of one page.
pub struct PageBlocks<'a> {
    page: &'a Page,
    cursor: usize,
    emitted: usize,
}

struct Accumulator {
    block_id: u32,
    bbox: BoundingBox,
    text: String,
    font_family: String,
    font_size: f32,
    last_bbox: BoundingBox,
}

impl Accumulator {
    fn push_run(&mut self, bbox: BoundingBox, text: &str, font_size: f32) {
        if !same_line(&self.last_bbox, &bbox) {
            self.text.push('\n');
        } else if needs_space(&self.text, self.last_bbox.x1, bbox, text, font_size) {
            self.text.push(' ');
        }
        self.text.push_str(text);
        self.bbox = self.bbox.union(&bbox);
        self.last_bbox = bbox;
    }
}

/// Gap between `prev_x1` and the next run wider than 0.2 of its average
/// glyph width, with neither side already blank nor both sides spaceless.
fn needs_space(prev: &str, prev_x1: f32, bbox: BoundingBox, text: &str, font_size: f32) -> bool {
    let (Some(last), Some(first)) = (prev.chars().last(), text.chars().next()) else {
        return false;
    };
    if last.is_whitespace() || first.is_whitespace() {
        return false;
    }
    if is_spaceless_script_char(last) && is_spaceless_script_char(first) {
        return false;
    }
    let glyphs = text.chars().count();
    let avg_glyph = if glyphs > 0 && bbox.width() > 0.0 {
        bbox.width() / glyphs as f32
    } else {
        font_size * 0.5
    };
    bbox.x0 - prev_x1 > avg_glyph * 0.2
}

/// Vertical centres within half the smaller height of each other.
fn same_line(a: &BoundingBox, b: &BoundingBox) -> bool {
    let ca = (a.y0 + a.y1) / 2.0;
    let cb = (b.y0 + b.y1) / 2.0;
    (ca - cb).abs() < a.height().min(b.height()) / 2.0
}

impl Iterator for PageBlocks<'_> {
    type Item = TextBlock;

    fn next(&mut self) -> Option<TextBlock> {
        let page = self.page;
        let nodes = &page.nodes;
        while self.cursor < nodes.len() {
            let mut acc: Option<Accumulator> = None;

            while self.cursor < nodes.len() {
                match &nodes[self.cursor] {
                    ContentNode::TextRun {
                        bbox,
                        text,
                        font_family,
                        font_size,
                        block_id,
                    } => match acc.as_mut() {
                        None => {
                            acc = Some(Accumulator {
                                block_id: *block_id,
                                bbox: *bbox,
                                text: text.clone(),
                                font_family: font_family.clone(),
                                font_size: *font_size,
                                last_bbox: *bbox,
                            });
                        }
                        Some(a) if a.block_id == *block_id => a.push_run(*bbox, text, *font_size),
                        Some(_) => break,
                    },
                    _ if acc.is_some() => break,
                    _ => {}
                }
                self.cursor += 1;
            }

            let Some(a) = acc else {
                continue;
            };
            let text = clean_block_text(&a.text);
            if text.is_empty() || a.bbox.is_degenerate() {
                continue;
            }

            let block = TextBlock {
                bbox: a.bbox,
                text,
                font_family: a.font_family,
                font_size: a.font_size,
                page_index: page.index,
                block_index: self.emitted,
            };
            self.emitted += 1;
            return Some(block);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str, block_id: u32, x: f32, y: f32, font: &str, size: f32) -> ContentNode {
        ContentNode::TextRun {
            bbox: BoundingBox::new(x, y, x + 100.0, y + size),
            text: text.to_string(),
            font_family: font.to_string(),
            font_size: size,
            block_id,
        }
    }

    fn page(index: usize, nodes: Vec<ContentNode>) -> Page {
        let mut p = Page::new(index, 595.0, 842.0);
        for n in nodes {
            p.push(n);
        }
        p
    }

    #[test]
    fn consecutive_runs_merge_first_font_wins() {
        let doc = SourceDocument::new(
            "a.pdf",
            vec![page(
                0,
                vec![
                    run("Hello", 0, 72.0, 700.0, "Arial-Bold", 14.0),
                    run("world", 0, 180.0, 700.0, "Arial", 11.0),
                ],
            )],
        );
        let blocks: Vec<_> = extract(&doc).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Hello world");
        assert_eq!(blocks[0].font_family, "Arial-Bold");
        assert_eq!(blocks[0].font_size, 14.0);
        assert_eq!(blocks[0].bbox.x0, 72.0);
        assert_eq!(blocks[0].bbox.x1, 280.0);
    }

    fn sized_run(text: &str, x0: f32, x1: f32, y: f32) -> ContentNode {
        ContentNode::TextRun {
            bbox: BoundingBox::new(x0, y, x1, y + 12.0),
            text: text.to_string(),
            font_family: "Helvetica".into(),
            font_size: 12.0,
            block_id: 0,
        }
    }

    #[test]
    fn kerned_fragments_of_one_word_stay_joined() {
        let doc = SourceDocument::new(
            "a.pdf",
            vec![page(
                0,
                vec![
                    sized_run("Hel", 72.0, 90.0, 700.0),
                    sized_run("lo world", 90.3, 140.0, 700.0),
                ],
            )],
        );
        assert_eq!(extract(&doc).next().unwrap().text, "Hello world");
    }

    #[test]
    fn spaced_runs_on_one_line_get_a_space() {
        let doc = SourceDocument::new(
            "a.pdf",
            vec![page(
                0,
                vec![
                    sized_run("Hello", 72.0, 102.0, 700.0),
                    sized_run("world", 106.0, 136.0, 700.0),
                ],
            )],
        );
        assert_eq!(extract(&doc).next().unwrap().text, "Hello world");
    }

    #[test]
    fn spaceless_script_runs_never_get_a_space() {
        let doc = SourceDocument::new(
            "a.pdf",
            vec![page(
                0,
                vec![
                    sized_run("日本語の", 72.0, 120.0, 700.0),
                    sized_run("テキスト", 130.0, 178.0, 700.0),
                ],
            )],
        );
        assert_eq!(extract(&doc).next().unwrap().text, "日本語のテキスト");
    }

    #[test]
    fn line_break_hyphenation_is_rejoined() {
        let doc = SourceDocument::new(
            "a.pdf",
            vec![page(
                0,
                vec![
                    run("The transla-", 0, 72.0, 700.0, "Times", 12.0),
                    run("tion works", 0, 72.0, 686.0, "Times", 12.0),
                ],
            )],
        );
        let block = extract(&doc).next().unwrap();
        assert_eq!(block.text, "The translation works");
    }

    #[test]
    fn images_and_shapes_are_ignored_and_split_blocks() {
        let doc = SourceDocument::new(
            "a.pdf",
            vec![page(
                0,
                vec![
                    ContentNode::VectorShape {
                        bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
                    },
                    run("Caption", 0, 72.0, 500.0, "Arial", 9.0),
                    ContentNode::Image {
                        bbox: BoundingBox::new(72.0, 510.0, 300.0, 700.0),
                    },
                    run("Body", 0, 72.0, 480.0, "Arial", 9.0),
                ],
            )],
        );
        let texts: Vec<_> = extract(&doc).map(|b| b.text).collect();
        assert_eq!(texts, vec!["Caption", "Body"]);
    }

    #[test]
    fn blank_and_degenerate_blocks_are_skipped_without_consuming_index() {
        let flat = ContentNode::TextRun {
            bbox: BoundingBox::new(72.0, 600.0, 172.0, 600.0),
            text: "flat".into(),
            font_family: "Arial".into(),
            font_size: 0.0,
            block_id: 1,
        };
        let doc = SourceDocument::new(
            "a.pdf",
            vec![page(
                0,
                vec![
                    run(" \u{200B} ", 0, 72.0, 700.0, "Arial", 12.0),
                    flat,
                    run("Kept", 2, 72.0, 500.0, "Arial", 12.0),
                ],
            )],
        );
        let blocks: Vec<_> = extract(&doc).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Kept");
        assert_eq!(blocks[0].block_index, 0);
    }

    #[test]
    fn indices_restart_per_page_in_order() {
        let doc = SourceDocument::new(
            "a.pdf",
            vec![
                page(
                    0,
                    vec![
                        run("A", 0, 72.0, 700.0, "Arial", 12.0),
                        run("B", 1, 72.0, 600.0, "Arial", 12.0),
                    ],
                ),
                page(1, vec![run("C", 0, 72.0, 700.0, "Arial", 12.0)]),
            ],
        );
        let got: Vec<_> = extract(&doc)
            .map(|b| (b.text, b.page_index, b.block_index))
            .collect();
        assert_eq!(
            got,
            vec![
                ("A".to_string(), 0, 0),
                ("B".to_string(), 0, 1),
                ("C".to_string(), 1, 0),
            ]
        );
    }

    #[test]
    fn empty_document_yields_nothing() {
        let doc = SourceDocument::new("a.pdf", vec![page(0, vec![])]);
        assert_eq!(extract(&doc).count(), 0);
    }

    #[test]
    fn extraction_is_lazy() {
        let doc = SourceDocument::new(
            "a.pdf",
            vec![page(
                0,
                vec![
                    run("first", 0, 72.0, 700.0, "Arial", 12.0),
                    run("second", 1, 72.0, 600.0, "Arial", 12.0),
                ],
            )],
        );
        let mut it = extract_page(&doc.pages()[0]);
        assert_eq!(it.next().map(|b| b.text).as_deref(), Some("first"));
        assert_eq!(it.cursor, 1);
    }
}
