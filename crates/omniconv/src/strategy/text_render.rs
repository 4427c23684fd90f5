//! Built-in text-to-PDF rendering via lopdf.
//!
//! The naive last-resort fallback for TXT→PDF when no document tool is
//! installed: monospaced text, paginated, non-ASCII replaced by spaces.

use std::time::Duration;

use lopdf::{dictionary, Document, Object, Stream};

use crate::error::StrategyError;
use crate::routing::StrategyId;
use crate::strategy::{ConversionRequest, ConversionStrategy};

/// Letter page, 10pt Courier, 12pt leading from y=742 down to the margin.
const LINES_PER_PAGE: usize = 57;
const MAX_COLS: usize = 90;

pub struct TextRenderStrategy;

impl ConversionStrategy for TextRenderStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::TextRender
    }

    fn convert(
        &self,
        request: &ConversionRequest,
        _timeout: Duration,
    ) -> Result<(), StrategyError> {
        let _span = tracing::info_span!("strategy.text_render").entered();

        let bytes = std::fs::read(&request.input).map_err(|e| {
            StrategyError::ExecutionFailed(format!("failed to read input: {e}"))
        })?;
        let text = String::from_utf8(bytes)
            .map_err(|_| StrategyError::InvalidInput("input is not valid UTF-8 text".to_string()))?;

        let pdf = render_pdf(&text)?;
        std::fs::write(&request.output, pdf).map_err(|e| {
            StrategyError::ExecutionFailed(format!("failed to write output: {e}"))
        })
    }
}

fn render_pdf(text: &str) -> Result<Vec<u8>, StrategyError> {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let lines = wrap_lines(text);
    let mut kids: Vec<Object> = Vec::new();

    let mut chunks: Vec<&[String]> = lines.chunks(LINES_PER_PAGE).collect();
    if chunks.is_empty() {
        // Empty input still yields one blank page.
        chunks.push(&[]);
    }

    for chunk in chunks {
        let content = page_stream(chunk);
        let content_id = doc.add_object(Object::Stream(Stream::new(
            dictionary! {},
            content.into_bytes(),
        )));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
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

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| StrategyError::ExecutionFailed(format!("PDF serialization failed: {e}")))?;

    Ok(buffer)
}

/// Splits input into display lines, breaking anything wider than the
/// page at the column limit.
fn wrap_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for line in text.lines() {
        if line.chars().count() <= MAX_COLS {
            lines.push(line.to_string());
        } else {
            let chars: Vec<char> = line.chars().collect();
            for chunk in chars.chunks(MAX_COLS) {
                lines.push(chunk.iter().collect());
            }
        }
    }
    lines
}

fn page_stream(lines: &[String]) -> String {
    let mut content = String::new();
    content.push_str("BT\n");
    content.push_str("/F1 10 Tf\n");
    content.push_str("50 742 Td\n");
    content.push_str("12 TL\n");

    for line in lines {
        let escaped = escape_pdf_string(line);
        content.push_str(&format!("({}) Tj T*\n", escaped));
    }

    content.push_str("ET\n");
    content
}

fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            c if c.is_ascii() && !c.is_control() => c.to_string(),
            // Courier has no glyphs outside ASCII in this encoding.
            _ => " ".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;
    use tempfile::TempDir;

    fn convert_text(text: &str) -> Vec<u8> {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.pdf");
        std::fs::write(&input, text).unwrap();

        let request = ConversionRequest {
            input,
            output: output.clone(),
            source: Format::Txt,
            destination: Format::Pdf,
        };
        TextRenderStrategy
            .convert(&request, Duration::from_secs(5))
            .unwrap();
        std::fs::read(&output).unwrap()
    }

    #[test]
    fn test_renders_valid_pdf() {
        let bytes = convert_text("Hello, World!\nSecond line.");
        assert!(bytes.starts_with(b"%PDF"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_paginates_long_input() {
        let text = (0..130)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let bytes = convert_text(&text);
        let doc = Document::load_mem(&bytes).unwrap();
        // 130 lines at 57 per page = 3 pages.
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn test_empty_input_yields_one_page() {
        let bytes = convert_text("");
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_wrap_lines_breaks_wide_lines() {
        let wide = "x".repeat(200);
        let lines = wrap_lines(&wide);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), MAX_COLS);
        assert_eq!(lines[2].len(), 200 - 2 * MAX_COLS);
    }

    #[test]
    fn test_escape_pdf_string() {
        assert_eq!(escape_pdf_string("a(b)c\\d"), "a\\(b\\)c\\\\d");
        assert_eq!(escape_pdf_string("über"), " ber");
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.txt");
        std::fs::write(&input, [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let request = ConversionRequest {
            input,
            output: dir.path().join("out.pdf"),
            source: Format::Txt,
            destination: Format::Pdf,
        };
        let err = TextRenderStrategy
            .convert(&request, Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, StrategyError::InvalidInput(_)));
    }
}
