use std::io::Cursor;

use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};

use super::{Block, FormatError, PlanDocument};

/// Half-points, indexed by heading level 1..=6.
const HEADING_SIZES: [usize; 6] = [36, 32, 28, 26, 24, 22];
const BODY_SIZE: usize = 22;

fn text_paragraph(text: &str, size: usize, bold: bool) -> Paragraph {
    let mut run = Run::new().size(size);
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            run = run.add_break(docx_rs::BreakType::TextWrapping);
        }
        run = run.add_text(line);
    }
    if bold {
        run = run.bold();
    }
    Paragraph::new().add_run(run)
}

fn table(rows: &[Vec<String>]) -> Table {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let table_rows = rows
        .iter()
        .enumerate()
        .map(|(r, row)| {
            let cells = (0..width)
                .map(|c| {
                    let text = row.get(c).map_or("", String::as_str);
                    TableCell::new().add_paragraph(text_paragraph(text, BODY_SIZE, r == 0))
                })
                .collect();
            TableRow::new(cells)
        })
        .collect();
    Table::new(table_rows)
}

pub fn render(document: &PlanDocument) -> Result<Vec<u8>, FormatError> {
    let mut docx = Docx::new();
    for block in &document.blocks {
        docx = match block {
            Block::Heading { level, text } => {
                let idx = usize::from((*level).clamp(1, 6) - 1);
                docx.add_paragraph(text_paragraph(text, HEADING_SIZES[idx], true))
            }
            Block::Paragraph(text) => docx.add_paragraph(text_paragraph(text, BODY_SIZE, false)),
            Block::ListItem { depth, text } => {
                let bullet = format!("{}• {text}", "    ".repeat(*depth));
                docx.add_paragraph(text_paragraph(&bullet, BODY_SIZE, false))
            }
            Block::Table(rows) if rows.is_empty() => docx,
            Block::Table(rows) => docx
                .add_table(table(rows))
                .add_paragraph(Paragraph::new()),
        };
    }

    let mut out = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut out)
        .map_err(|e| FormatError::Docx(e.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::tests::SAMPLE_PLAN;
    use crate::loader::docx::extract_text;
    use tempfile::tempdir;

    #[test]
    fn test_render_reads_back() {
        let doc = PlanDocument::parse(SAMPLE_PLAN);
        let bytes = render(&doc).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("plan.docx");
        std::fs::write(&path, bytes).unwrap();

        let text = extract_text(&path).unwrap();
        assert!(text.contains("Login Test Plan"));
        assert!(text.contains("• Valid credentials"));
        assert!(text.contains("Test Item | Expected Result"));
        assert!(text.contains("Wrong password | Error shown"));
    }

    #[test]
    fn test_ragged_table_is_padded() {
        let doc = PlanDocument {
            blocks: vec![Block::Table(vec![
                vec!["a".into(), "b".into(), "c".into()],
                vec!["1".into()],
            ])],
        };
        assert!(!render(&doc).unwrap().is_empty());
    }
}
