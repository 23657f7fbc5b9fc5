//! Docling sidecar OCR provider, for scanned PDFs and page images.

use super::{OcrInput, OcrPage, OcrProvider, OcrResult};
use serde::Deserialize;
use tracing::info;

const EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg"];

/// Docling sidecar response (private deserialization types).
#[derive(Debug, Deserialize)]
struct DoclingResponse {
    markdown: String,
    #[serde(default)]
    pages: Vec<DoclingPageContent>,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct DoclingPageContent {
    page_num: u32,
    text: String,
}

pub struct DoclingProvider {
    url: String,
    client: reqwest::Client,
}

impl DoclingProvider {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        Self { url, client }
    }
}

fn mime_for(input: &OcrInput) -> &'static str {
    match input.extension().as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/pdf",
    }
}

#[async_trait::async_trait]
impl OcrProvider for DoclingProvider {
    fn name(&self) -> &str {
        "docling"
    }

    fn supports(&self, input: &OcrInput) -> bool {
        input
            .extension()
            .map(|ext| EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult> {
        use reqwest::multipart::{Form, Part};

        info!("DoclingProvider: sending {} to sidecar", input.filename);
        let part = Part::bytes(input.data.clone())
            .file_name(input.filename.clone())
            .mime_str(mime_for(input))?;

        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/convert", self.url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Docling sidecar error ({}): {}", status, error_text);
        }

        let docling: DoclingResponse = response.json().await?;
        let pages: Vec<OcrPage> = docling
            .pages
            .into_iter()
            .map(|p| OcrPage {
                page_num: p.page_num,
                text: p.text,
            })
            .collect();
        let total_pages = docling.total_pages.max(pages.len() as u32);

        Ok(OcrResult {
            text: docling.markdown,
            pages,
            total_pages,
            provider_name: "docling".to_string(),
        })
    }
}
