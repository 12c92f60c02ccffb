use std::fs;
use std::path::Path;

use docx_rs::{
    DocumentChild, Paragraph, ParagraphChild, RunChild, Table, TableCellContent, TableChild,
    TableRowChild,
};

use super::{LoadError, normalize_path};

/// Extract paragraph and table text from a `.docx` file.
///
/// Paragraphs become lines; table rows become ` | `-joined lines so the
/// row structure of test matrices survives chunking.
pub fn extract_text(path: &Path) -> Result<String, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: normalize_path(path),
        source,
    })?;
    let docx = docx_rs::read_docx(&bytes).map_err(|e| LoadError::Docx {
        path: normalize_path(path),
        message: e.to_string(),
    })?;

    let mut lines = Vec::new();
    for child in &docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => lines.push(paragraph_text(p)),
            DocumentChild::Table(t) => lines.extend(table_lines(t)),
            _ => {}
        }
    }

    Ok(lines.join("\n"))
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    RunChild::Text(t) => text.push_str(&t.text),
                    RunChild::Tab(_) => text.push('\t'),
                    _ => {}
                }
            }
        }
    }
    text
}

#[allow(irrefutable_let_patterns)]
fn table_lines(table: &Table) -> Vec<String> {
    let mut lines = Vec::new();
    for row in &table.rows {
        let TableChild::TableRow(row) = row else {
            continue;
        };
        let mut cells = Vec::new();
        for cell in &row.cells {
            let TableRowChild::TableCell(cell) = cell else {
                continue;
            };
            let text: Vec<String> = cell
                .children
                .iter()
                .filter_map(|content| match content {
                    TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                    _ => None,
                })
                .collect();
            cells.push(text.join(" "));
        }
        lines.push(cells.join(" | "));
    }
    lines
}
