//! Export of generated plans to office formats.
//!
//! The markdown file stays the source of truth: it is parsed into a small
//! block model and each exporter writes a sibling file next to it
//! (`plan.md` → `plan.xlsx`, `plan.docx`, `plan.pdf`). A failed export never
//! touches the markdown.
pub mod docx;
pub mod pdf;
pub mod xlsx;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("DOCX export failed: {0}")]
    Docx(String),

    #[error("XLSX export failed: {0}")]
    Xlsx(String),

    #[error("PDF export failed: {0}")]
    Pdf(String),

    #[error("unknown export format: {0} (expected xlsx, docx, pdf or all)")]
    UnknownFormat(String),
}

impl FormatError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Xlsx,
    Docx,
    Pdf,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [Self::Xlsx, Self::Docx, Self::Pdf];

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Docx => "docx",
            Self::Pdf => "pdf",
        }
    }

    /// Parse one format name; `all` expands to every format.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, FormatError> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::ALL.to_vec());
        }
        Ok(vec![s.parse()?])
    }
}

impl FromStr for ExportFormat {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Ok(Self::Xlsx),
            "docx" | "word" => Ok(Self::Docx),
            "pdf" => Ok(Self::Pdf),
            _ => Err(FormatError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph(String),
    ListItem { depth: usize, text: String },
    /// First row is the header row.
    Table(Vec<Vec<String>>),
}

/// A parsed plan, ready for any exporter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanDocument {
    pub blocks: Vec<Block>,
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn take_text(buf: &mut String) -> String {
    let text = buf.trim().to_string();
    buf.clear();
    text
}

impl PlanDocument {
    pub fn parse(markdown: &str) -> Self {
        let mut blocks = Vec::new();
        let mut buf = String::new();
        let mut item_depth = 0usize;
        let mut table: Option<Vec<Vec<String>>> = None;
        let mut row: Vec<String> = Vec::new();

        for event in Parser::new_ext(markdown, Options::ENABLE_TABLES) {
            match event {
                Event::Start(Tag::Item) => {
                    let text = take_text(&mut buf);
                    if item_depth > 0 && !text.is_empty() {
                        blocks.push(Block::ListItem {
                            depth: item_depth - 1,
                            text,
                        });
                    }
                    item_depth += 1;
                }
                Event::End(TagEnd::Item) => {
                    let text = take_text(&mut buf);
                    item_depth = item_depth.saturating_sub(1);
                    if !text.is_empty() {
                        blocks.push(Block::ListItem {
                            depth: item_depth,
                            text,
                        });
                    }
                }
                Event::Start(Tag::Heading { .. }) | Event::Start(Tag::TableCell) => buf.clear(),
                Event::End(TagEnd::Heading(level)) => {
                    blocks.push(Block::Heading {
                        level: heading_level(level),
                        text: take_text(&mut buf),
                    });
                }
                Event::End(TagEnd::Paragraph)
                | Event::End(TagEnd::CodeBlock)
                | Event::End(TagEnd::HtmlBlock)
                    if item_depth == 0 =>
                {
                    let text = take_text(&mut buf);
                    if !text.is_empty() {
                        blocks.push(Block::Paragraph(text));
                    }
                }
                Event::End(TagEnd::Paragraph) if item_depth > 0 => buf.push(' '),
                Event::Start(Tag::Table(_)) => table = Some(Vec::new()),
                Event::End(TagEnd::TableCell) => row.push(take_text(&mut buf)),
                Event::End(TagEnd::TableHead) | Event::End(TagEnd::TableRow) => {
                    if let Some(rows) = table.as_mut() {
                        rows.push(std::mem::take(&mut row));
                    }
                }
                Event::End(TagEnd::Table) => {
                    if let Some(rows) = table.take() {
                        blocks.push(Block::Table(rows));
                    }
                }
                Event::Text(text)
                | Event::Code(text)
                | Event::InlineHtml(text)
                | Event::Html(text) => buf.push_str(&text),
                Event::SoftBreak => buf.push(' '),
                Event::HardBreak => buf.push('\n'),
                _ => {}
            }
        }
        Self { blocks }
    }

    pub fn from_file(path: &Path) -> Result<Self, FormatError> {
        let markdown = fs::read_to_string(path).map_err(|e| FormatError::io(path, e))?;
        Ok(Self::parse(&markdown))
    }

    /// Text of the first heading, if any.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.blocks.iter().find_map(|b| match b {
            Block::Heading { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Path of the `format` sibling of `md_path`.
#[must_use]
pub fn sibling_path(md_path: &Path, format: ExportFormat) -> PathBuf {
    md_path.with_extension(format.extension())
}

/// Export the markdown file at `md_path` to `format`, returning the new path.
pub fn export(md_path: &Path, format: ExportFormat) -> Result<PathBuf, FormatError> {
    let document = PlanDocument::from_file(md_path)?;
    export_document(&document, md_path, format)
}

/// Export to several formats, parsing the markdown once. Stops at the first
/// failure; files already written are kept.
pub fn export_all(md_path: &Path, formats: &[ExportFormat]) -> Result<Vec<PathBuf>, FormatError> {
    let document = PlanDocument::from_file(md_path)?;
    formats
        .iter()
        .map(|&format| export_document(&document, md_path, format))
        .collect()
}

fn export_document(
    document: &PlanDocument,
    md_path: &Path,
    format: ExportFormat,
) -> Result<PathBuf, FormatError> {
    let target = sibling_path(md_path, format);
    let bytes = match format {
        ExportFormat::Xlsx => xlsx::render(document)?,
        ExportFormat::Docx => docx::render(document)?,
        ExportFormat::Pdf => pdf::render(document)?,
    };
    fs::write(&target, bytes).map_err(|e| FormatError::io(&target, e))?;
    info!("Exported {}", target.display());
    Ok(target)
}
