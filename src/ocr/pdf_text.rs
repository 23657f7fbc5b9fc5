//! Text-layer extraction for digital PDFs.

use super::{OcrInput, OcrPage, OcrProvider, OcrResult};
use lopdf::Document;
use std::io::Cursor;
use tracing::debug;

/// Reads the embedded text layer with lopdf. Scanned PDFs have none and fail here.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextProvider;

impl PdfTextProvider {
    fn extract(data: &[u8]) -> anyhow::Result<OcrResult> {
        let doc = Document::load_from(Cursor::new(data))
            .map_err(|e| anyhow::anyhow!("Failed to load PDF: {}", e))?;

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        let total_pages = page_numbers.len() as u32;

        let mut pages = Vec::new();
        for page_num in page_numbers {
            match doc.extract_text(&[page_num]) {
                Ok(text) if !text.trim().is_empty() => pages.push(OcrPage { page_num, text }),
                Ok(_) => debug!("PDF page {} has no text layer", page_num),
                Err(e) => debug!("PDF page {} text extraction failed: {}", page_num, e),
            }
        }

        if pages.is_empty() {
            anyhow::bail!("No text extracted from PDF ({} pages)", total_pages);
        }

        let text = pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(OcrResult {
            text,
            pages,
            total_pages,
            provider_name: "pdf_text".to_string(),
        })
    }
}

#[async_trait::async_trait]
impl OcrProvider for PdfTextProvider {
    fn name(&self) -> &str {
        "pdf_text"
    }

    fn supports(&self, input: &OcrInput) -> bool {
        input.extension().as_deref() == Some("pdf")
    }

    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult> {
        let data = input.data.clone();
        tokio::task::spawn_blocking(move || Self::extract(&data)).await?
    }
}
