//! Built-in PDF text extraction via lopdf.
//!
//! The last entry in PDF fallback chains: no external dependency, plain
//! per-page text extraction wrapped into the destination format.

use std::fmt::Write as _;
use std::time::Duration;

use crate::error::StrategyError;
use crate::format::Format;
use crate::routing::StrategyId;
use crate::strategy::{ConversionRequest, ConversionStrategy};

pub struct PdfExtractStrategy;

impl ConversionStrategy for PdfExtractStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::PdfExtract
    }

    fn convert(
        &self,
        request: &ConversionRequest,
        _timeout: Duration,
    ) -> Result<(), StrategyError> {
        let _span = tracing::info_span!("strategy.pdf_extract").entered();

        let doc = lopdf::Document::load(&request.input).map_err(|e| {
            StrategyError::InvalidInput(format!("input is not a parseable PDF: {e}"))
        })?;

        let pages = extract_pages(&doc);
        if pages.iter().all(|p| p.trim().is_empty()) {
            return Err(StrategyError::ExecutionFailed(
                "PDF contains no extractable text".to_string(),
            ));
        }

        let rendered = match request.destination {
            Format::Txt => pages.join("\n\n"),
            Format::Html => render_html(&pages),
            Format::Md => render_markdown(&pages),
            other => {
                return Err(StrategyError::ExecutionFailed(format!(
                    "pdf-extract cannot produce {other}"
                )));
            }
        };

        std::fs::write(&request.output, rendered).map_err(|e| {
            StrategyError::ExecutionFailed(format!("failed to write output: {e}"))
        })
    }
}

fn extract_pages(doc: &lopdf::Document) -> Vec<String> {
    let mut pages = Vec::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                log::debug!("No text extracted from page {}: {}", page_num, e);
                pages.push(String::new());
            }
        }
    }
    pages
}

fn render_html(pages: &[String]) -> String {
    let mut html = String::from("<html><body>\n");
    for (index, page) in pages.iter().enumerate() {
        let _ = writeln!(
            html,
            "<div class=\"page\"><h3>Page {}</h3><pre>{}</pre></div>",
            index + 1,
            escape_html(page)
        );
    }
    html.push_str("</body></html>\n");
    html
}

fn render_markdown(pages: &[String]) -> String {
    let mut md = String::new();
    for (index, page) in pages.iter().enumerate() {
        let _ = writeln!(md, "## Page {}\n\n{}\n", index + 1, page.trim_end());
    }
    md
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
