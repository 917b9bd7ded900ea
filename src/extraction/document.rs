//! PDF and DOCX text extraction. Both parsers are synchronous; callers run them on the
//! blocking pool.

use super::ExtractionError;
use quick_xml::{Reader as XmlReader, events::Event};
use std::fs;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Text of every non-empty PDF page, joined with newlines.
pub fn extract_pdf_text(path: &Path) -> Result<String, ExtractionError> {
    let pages = pdf_extract::extract_text_by_pages(path)
        .map_err(|error| ExtractionError::Document(format!("failed to parse PDF: {error}")))?;
    let page_count = pages.len();

    let text = pages
        .iter()
        .map(|page| page.trim())
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    tracing::debug!(page_count, "PDF text extraction complete");
    Ok(text)
}

/// Text of every non-empty DOCX paragraph, joined with newlines.
pub fn extract_docx_text(path: &Path) -> Result<String, ExtractionError> {
    let file = fs::File::open(path)?;
    let mut archive = ZipArchive::new(file).map_err(|error| {
        ExtractionError::Document(format!("failed to open DOCX archive: {error}"))
    })?;
    let mut document = archive.by_name("word/document.xml").map_err(|error| {
        ExtractionError::Document(format!("missing word/document.xml: {error}"))
    })?;

    let mut xml = String::new();
    document.read_to_string(&mut xml)?;

    let paragraphs = docx_paragraphs(&xml)?;
    tracing::debug!(
        paragraphs = paragraphs.len(),
        "DOCX text extraction complete"
    );
    Ok(paragraphs.join("\n"))
}

fn docx_paragraphs(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = XmlReader::from_str(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_node = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:p" => current.clear(),
                b"w:t" => in_text_node = true,
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_node {
                    let value = e.unescape().map_err(|error| {
                        ExtractionError::Document(format!("invalid DOCX text: {error}"))
                    })?;
                    current.push_str(&value);
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_node = false,
                b"w:p" => {
                    let paragraph = current.trim();
                    if !paragraph.is_empty() {
                        paragraphs.push(paragraph.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(error) => {
                return Err(ExtractionError::Document(format!(
                    "failed to parse DOCX XML: {error}"
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}
