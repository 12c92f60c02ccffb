//! Paginated text rendering of a plan with the built-in Helvetica font.
//!
//! Helvetica with WinAnsiEncoding covers Latin-1; any other character is
//! written as `?`. Tables are rendered as ` | `-joined rows.
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use super::{Block, FormatError, PlanDocument};

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const BODY_SIZE: f32 = 10.0;
const HEADING_SIZE: f32 = 14.0;

/// One laid-out line of text.
struct Line {
    size: f32,
    text: String,
}

/// Latin-1 bytes for WinAnsiEncoding; unmappable characters become `?`.
fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7e | 0xa0..=0xff => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

/// Greedy word wrap to at most `width` chars per line.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let mut line = String::new();
        let mut len = 0usize;
        for word in raw.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if len > 0 {
                    lines.push(std::mem::take(&mut line));
                    len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            if word.is_empty() {
                continue;
            }
            if len > 0 && len + 1 + word.len() > width {
                lines.push(std::mem::take(&mut line));
                len = 0;
            }
            if len > 0 {
                line.push(' ');
                len += 1;
            }
            len += word.len();
            line.extend(word);
        }
        lines.push(line);
    }
    lines
}

/// Helvetica averages about half an em per glyph.
fn chars_per_line(size: f32) -> usize {
    ((PAGE_WIDTH - 2.0 * MARGIN) / (size * 0.5)) as usize
}

fn layout(document: &PlanDocument) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut push = |text: &str, size: f32| {
        for text in wrap(text, chars_per_line(size)) {
            lines.push(Line { size, text });
        }
    };
    for block in &document.blocks {
        match block {
            Block::Heading { level, text } => {
                let size = if *level <= 2 { HEADING_SIZE } else { BODY_SIZE + 2.0 };
                push("", BODY_SIZE);
                push(text, size);
            }
            Block::Paragraph(text) => push(text, BODY_SIZE),
            Block::ListItem { depth, text } => {
                push(&format!("{}- {text}", "   ".repeat(*depth)), BODY_SIZE);
            }
            Block::Table(rows) => {
                for row in rows {
                    push(&row.join(" | "), BODY_SIZE);
                }
                push("", BODY_SIZE);
            }
        }
    }
    lines
}

fn paginate(lines: Vec<Line>) -> Vec<Vec<(f32, Line)>> {
    let mut pages = Vec::new();
    let mut page = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN;
    for line in lines {
        let leading = line.size * 1.4;
        if y - leading < MARGIN && !page.is_empty() {
            pages.push(std::mem::take(&mut page));
            y = PAGE_HEIGHT - MARGIN;
        }
        y -= leading;
        page.push((y, line));
    }
    if !page.is_empty() || pages.is_empty() {
        pages.push(page);
    }
    pages
}

fn page_content(lines: &[(f32, Line)]) -> Content {
    let mut operations = Vec::new();
    for (y, line) in lines {
        if line.text.is_empty() {
            continue;
        }
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new("Tf", vec!["F1".into(), line.size.into()]));
        operations.push(Operation::new("Td", vec![MARGIN.into(), (*y).into()]));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(encode_latin1(&line.text))],
        ));
        operations.push(Operation::new("ET", vec![]));
    }
    Content { operations }
}

pub fn render(document: &PlanDocument) -> Result<Vec<u8>, FormatError> {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for page in paginate(layout(document)) {
        let content = page_content(&page)
            .encode()
            .map_err(|e| FormatError::Pdf(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| FormatError::Pdf(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::tests::SAMPLE_PLAN;

    #[test]
    fn test_encode_latin1() {
        assert_eq!(encode_latin1("Café"), b"Caf\xe9".to_vec());
        assert_eq!(encode_latin1("測試 ok"), b"?? ok".to_vec());
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("one\ntwo", 80), vec!["one", "two"]);
        assert_eq!(wrap("", 10), vec![""]);
    }

    #[test]
    fn test_render_loads_and_contains_text() {
        let bytes = render(&PlanDocument::parse(SAMPLE_PLAN)).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        let text = doc.extract_text(&[1]).unwrap();
        assert!(text.contains("Login Test Plan"));
        assert!(text.contains("Valid login | Home screen"));
    }

    #[test]
    fn test_long_plan_paginates() {
        let blocks = (0..200)
            .map(|i| Block::Paragraph(format!("Step {i}: verify the response code")))
            .collect();
        let bytes = render(&PlanDocument { blocks }).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
    }

    #[test]
    fn test_empty_document_has_one_page() {
        let bytes = render(&PlanDocument::default()).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }
}
