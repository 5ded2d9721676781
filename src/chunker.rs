//! Page-level PDF text extraction.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document as PdfDocument, Object, Stream};
use tracing::warn;

use crate::error::ExtractionError;

/// Extracted text for one physical page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number.
    pub page_number: u32,
    /// Page text; empty when the page carries no decodable text.
    pub text: String,
}

/// Splits a source document into ordered page-level text units.
pub trait Chunker: Send + Sync {
    /// Returns one entry per physical page, numbered contiguously from 1.
    fn split(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError>;
}

/// [`Chunker`] backed by `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfChunker;

impl Chunker for PdfChunker {
    fn split(&self, bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
        let pdf = PdfDocument::load_mem(bytes)
            .map_err(|err| ExtractionError::Parse(err.to_string()))?;
        let page_count = pdf.get_pages().len();
        if page_count == 0 {
            return Err(ExtractionError::NoPages);
        }

        // get_pages keys are 1-based and ordered; renumber by position so gaps in the
        // page tree never leave holes in our numbering.
        let mut pages = Vec::with_capacity(page_count);
        for (idx, source_number) in pdf.get_pages().keys().enumerate() {
            let page_number = idx as u32 + 1;
            let text = match pdf.extract_text(&[*source_number]) {
                Ok(text) => text,
                Err(err) => {
                    warn!(page_number, error = %err, "page text not decodable; keeping it empty");
                    String::new()
                }
            };
            pages.push(PageText { page_number, text });
        }
        Ok(pages)
    }
}

/// Builds a minimal PDF with one Courier text line per page.
#[doc(hidden)]
pub fn text_pdf(pages: &[&str]) -> anyhow::Result<Vec<u8>> {
    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pdf(pages: &[&str]) -> Vec<u8> {
        text_pdf(pages).unwrap()
    }

    #[test]
    fn splits_pages_in_order() {
        let bytes = sample_pdf(&["Recipe for soup", "More soup steps"]);
        let pages = PdfChunker.split(&bytes).expect("pdf parses");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[1].page_number, 2);
        assert!(pages[0].text.contains("Recipe for soup"));
        assert!(pages[1].text.contains("More soup steps"));
    }

    #[test]
    fn keeps_blank_pages() {
        let bytes = sample_pdf(&["first", "", "third"]);
        let pages = PdfChunker.split(&bytes).expect("pdf parses");
        let numbers: Vec<u32> = pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(pages[1].text.trim().is_empty());
    }

    #[test]
    fn rejects_garbage() {
        let err = PdfChunker.split(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ExtractionError::Parse(_)));
    }
}
