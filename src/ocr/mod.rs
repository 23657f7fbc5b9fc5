//! OCR provider abstraction.
//!
//! Defines the [`OcrProvider`] trait and the [`OcrChain`] that tries
//! providers in order until one yields text. A document no provider can read
//! contributes nothing; that is reported, not raised.

pub mod docling;
pub mod pdf_text;
pub mod plain_text;

use tracing::{info, warn};

pub use self::docling::DoclingProvider;
pub use self::pdf_text::PdfTextProvider;
pub use self::plain_text::PlainTextProvider;

/// Per-page OCR output (always 1-indexed).
#[derive(Debug, Clone)]
pub struct OcrPage {
    pub page_num: u32,
    pub text: String,
}

/// Unified OCR result returned by every provider.
#[derive(Debug, Clone)]
pub struct OcrResult {
    pub text: String,
    pub pages: Vec<OcrPage>,
    pub total_pages: u32,
    pub provider_name: String,
}

/// An uploaded document.
#[derive(Debug, Clone)]
pub struct OcrInput {
    pub filename: String,
    pub data: Vec<u8>,
}

impl OcrInput {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
        }
    }

    /// Lowercased file extension without the dot.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    fn supports(&self, input: &OcrInput) -> bool;
    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult>;
}

/// Providers tried in order for each document.
#[derive(Default)]
pub struct OcrChain {
    providers: Vec<Box<dyn OcrProvider>>,
}

impl OcrChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl OcrProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Text layer and plain text, plus the Docling sidecar when a URL is configured.
    pub fn standard(client: reqwest::Client, docling_url: Option<&str>) -> Self {
        let chain = Self::new().with(PdfTextProvider).with(PlainTextProvider);
        match docling_url {
            Some(url) => chain.with(DoclingProvider::new(client, url)),
            None => chain,
        }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// First non-empty result from a supporting provider, or `None`.
    pub async fn run_best(&self, input: &OcrInput) -> Option<OcrResult> {
        for provider in self.providers.iter().filter(|p| p.supports(input)) {
            match provider.process(input).await {
                Ok(result) if !result.text.trim().is_empty() => {
                    info!(
                        "{}: extracted {} chars from {} ({} pages)",
                        provider.name(),
                        result.text.len(),
                        input.filename,
                        result.total_pages
                    );
                    return Some(result);
                }
                Ok(_) => warn!("{}: no text in {}", provider.name(), input.filename),
                Err(e) => warn!("{}: failed on {}: {:#}", provider.name(), input.filename, e),
            }
        }
        warn!("No OCR provider produced text for {}", input.filename);
        None
    }
}

/// Join several documents' text with the banner and `--- FILE: name ---` headers.
pub fn combine_documents(documents: &[(String, String)]) -> String {
    let banner = "=".repeat(80);
    let mut combined = String::new();
    for (filename, text) in documents {
        combined.push_str("\n\n");
        combined.push_str(&banner);
        combined.push('\n');
        combined.push_str(&format!("--- FILE: {} ---\n", filename));
        combined.push_str(text.trim());
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait::async_trait]
    impl OcrProvider for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn supports(&self, _: &OcrInput) -> bool {
            true
        }
        async fn process(&self, _: &OcrInput) -> anyhow::Result<OcrResult> {
            anyhow::bail!("backend unavailable")
        }
    }

    #[tokio::test]
    async fn test_chain_falls_through_failures() {
        let chain = OcrChain::new().with(Failing).with(PlainTextProvider);
        let input = OcrInput::new("paper.txt", b"1. Define force.".to_vec());

        let result = chain.run_best(&input).await.unwrap();
        assert_eq!(result.provider_name, "plain_text");
        assert_eq!(result.text, "1. Define force.");
    }

    #[tokio::test]
    async fn test_chain_returns_none_without_text() {
        let chain = OcrChain::new().with(PlainTextProvider);

        assert!(chain.run_best(&OcrInput::new("blank.txt", b"  \n".to_vec())).await.is_none());
        assert!(chain.run_best(&OcrInput::new("scan.png", vec![0x89, 0x50])).await.is_none());
    }

    #[test]
    fn test_standard_chain_docling_optional() {
        let client = reqwest::Client::new();
        assert_eq!(OcrChain::standard(client.clone(), None).provider_names(), vec!["pdf_text", "plain_text"]);
        assert_eq!(
            OcrChain::standard(client, Some("http://localhost:3001")).provider_names(),
            vec!["pdf_text", "plain_text", "docling"]
        );
    }

    #[test]
    fn test_combine_documents() {
        let combined = combine_documents(&[
            ("a.pdf".to_string(), "1. Define force.\n".to_string()),
            ("b.pdf".to_string(), "2. Define work.".to_string()),
        ]);

        assert!(combined.contains("--- FILE: a.pdf ---\n1. Define force."));
        assert!(combined.contains("--- FILE: b.pdf ---\n2. Define work."));
        assert_eq!(combined.matches(&"=".repeat(80)).count(), 2);
    }

    #[test]
    fn test_extension() {
        assert_eq!(OcrInput::new("Paper.PDF", vec![]).extension().as_deref(), Some("pdf"));
        assert_eq!(OcrInput::new("noext", vec![]).extension(), None);
    }
}
