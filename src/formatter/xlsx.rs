//! Minimal single-sheet XLSX writer.
//!
//! One row per table row (`Section | cell | cell ...`) and one row per
//! paragraph or list item (`Section | text`), where the section is the
//! nearest preceding heading. Cells are inline strings, so no shared-string
//! table or styles part is needed.
use std::io::{Cursor, Write};

use quick_xml::escape::escape;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::{Block, FormatError, PlanDocument};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Test Plan" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

/// Spreadsheet rows for `document`.
pub fn rows(document: &PlanDocument) -> Vec<Vec<String>> {
    let mut section = String::new();
    let mut rows = Vec::new();
    for block in &document.blocks {
        match block {
            Block::Heading { text, .. } => section.clone_from(text),
            Block::Paragraph(text) | Block::ListItem { text, .. } => {
                rows.push(vec![section.clone(), text.clone()]);
            }
            Block::Table(table) => {
                for row in table {
                    let mut cells = Vec::with_capacity(row.len() + 1);
                    cells.push(section.clone());
                    cells.extend(row.iter().cloned());
                    rows.push(cells);
                }
            }
        }
    }
    rows
}

/// `0` → `A`, `25` → `Z`, `26` → `AA`.
fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// XML 1.0 forbids most control characters even when escaped.
fn xml_safe(text: &str) -> String {
    text.chars()
        .filter(|&c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

fn sheet_xml(rows: &[Vec<String>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        let row_num = r + 1;
        xml.push_str(&format!(r#"<row r="{row_num}">"#));
        for (c, value) in row.iter().enumerate() {
            let cell_ref = format!("{}{row_num}", column_name(c));
            let value = xml_safe(value);
            xml.push_str(&format!(
                r#"<c r="{cell_ref}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                escape(value.as_str())
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

pub fn render(document: &PlanDocument) -> Result<Vec<u8>, FormatError> {
    let sheet = sheet_xml(&rows(document));
    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS),
        ("xl/worksheets/sheet1.xml", sheet.as_str()),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        zip.start_file(name, SimpleFileOptions::default())
            .map_err(|e| FormatError::Xlsx(e.to_string()))?;
        zip.write_all(body.as_bytes())
            .map_err(|e| FormatError::Xlsx(e.to_string()))?;
    }
    let cursor = zip.finish().map_err(|e| FormatError::Xlsx(e.to_string()))?;
    Ok(cursor.into_inner())
}
