//! Plain-text uploads, for papers already OCR'd elsewhere.

use super::{OcrInput, OcrPage, OcrProvider, OcrResult};

const EXTENSIONS: &[&str] = &["txt", "md", "text"];

#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextProvider;

#[async_trait::async_trait]
impl OcrProvider for PlainTextProvider {
    fn name(&self) -> &str {
        "plain_text"
    }

    fn supports(&self, input: &OcrInput) -> bool {
        input
            .extension()
            .map(|ext| EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult> {
        let text = String::from_utf8_lossy(&input.data).into_owned();
        Ok(OcrResult {
            pages: vec![OcrPage {
                page_num: 1,
                text: text.clone(),
            }],
            text,
            total_pages: 1,
            provider_name: "plain_text".to_string(),
        })
    }
}
