//! Static routing from format pairs to ordered strategy fallback chains.
//!
//! The table is data: each supported `(source, destination)` pair maps to
//! a non-empty ordered list of strategies, best-fidelity tool first and
//! naive fallback last. The externally advertised capability listing is
//! derived from the same map, so the listing and the dispatcher cannot
//! disagree.

use std::collections::HashMap;

use crate::error::RoutingError;
use crate::format::Format;

/// A named conversion capability. The ordering of ids inside a route is a
/// pre-declared quality preference; nothing is ranked at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyId {
    /// LibreOffice headless (`soffice --convert-to`).
    Soffice,
    /// Pandoc document conversion.
    Pandoc,
    /// Poppler `pdftotext` extraction.
    PdfToText,
    /// Built-in lopdf text extraction, last-resort PDF fallback.
    PdfExtract,
    /// ImageMagick `convert`.
    Magick,
    /// Built-in raster decode/encode via the image crate.
    Raster,
    /// Built-in text-to-PDF page rendering, last-resort TXT fallback.
    TextRender,
    /// ffmpeg audio/video transcode.
    Ffmpeg,
    /// wkhtmltopdf HTML rendering.
    WkHtmlToPdf,
}

impl StrategyId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::Soffice => "soffice",
            StrategyId::Pandoc => "pandoc",
            StrategyId::PdfToText => "pdftotext",
            StrategyId::PdfExtract => "pdf-extract",
            StrategyId::Magick => "magick",
            StrategyId::Raster => "raster",
            StrategyId::TextRender => "text-render",
            StrategyId::Ffmpeg => "ffmpeg",
            StrategyId::WkHtmlToPdf => "wkhtmltopdf",
        }
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

use self::StrategyId::*;
use crate::format::Format::*;

/// Document, spreadsheet and presentation routes. Image/audio/video
/// families are expanded from the family lists below.
const ROUTES: &[(Format, Format, &[StrategyId])] = &[
    // PDF sources
    (Pdf, Txt, &[PdfToText, PdfExtract]),
    (Pdf, Html, &[Soffice, PdfExtract]),
    (Pdf, Md, &[PdfExtract]),
    (Pdf, Docx, &[Soffice]),
    (Pdf, Odt, &[Soffice]),
    (Pdf, Jpg, &[Magick]),
    (Pdf, Png, &[Magick]),
    // DOCX sources
    (Docx, Pdf, &[Soffice, Pandoc]),
    (Docx, Txt, &[Pandoc, Soffice]),
    (Docx, Html, &[Pandoc, Soffice]),
    (Docx, Md, &[Pandoc]),
    (Docx, Odt, &[Soffice, Pandoc]),
    (Docx, Rtf, &[Soffice]),
    // ODT sources
    (Odt, Pdf, &[Soffice]),
    (Odt, Docx, &[Soffice, Pandoc]),
    (Odt, Txt, &[Soffice, Pandoc]),
    (Odt, Html, &[Soffice, Pandoc]),
    (Odt, Rtf, &[Soffice]),
    // RTF sources
    (Rtf, Pdf, &[Soffice]),
    (Rtf, Docx, &[Soffice]),
    (Rtf, Odt, &[Soffice]),
    (Rtf, Txt, &[Soffice]),
    (Rtf, Html, &[Soffice]),
    // Plain text sources
    (Txt, Pdf, &[Soffice, TextRender]),
    (Txt, Docx, &[Soffice, Pandoc]),
    (Txt, Odt, &[Soffice, Pandoc]),
    (Txt, Html, &[Pandoc, Soffice]),
    // Markdown sources
    (Md, Html, &[Pandoc]),
    (Md, Docx, &[Pandoc]),
    (Md, Odt, &[Pandoc]),
    (Md, Pdf, &[Pandoc]),
    // HTML sources
    (Html, Pdf, &[WkHtmlToPdf, Soffice]),
    (Html, Txt, &[Pandoc, Soffice]),
    (Html, Docx, &[Pandoc, Soffice]),
    (Html, Odt, &[Pandoc, Soffice]),
    (Html, Md, &[Pandoc]),
    // Spreadsheets
    (Xlsx, Csv, &[Soffice]),
    (Xlsx, Pdf, &[Soffice]),
    (Xlsx, Html, &[Soffice]),
    (Xlsx, Ods, &[Soffice]),
    (Ods, Xlsx, &[Soffice]),
    (Ods, Csv, &[Soffice]),
    (Ods, Pdf, &[Soffice]),
    (Ods, Html, &[Soffice]),
    (Csv, Xlsx, &[Soffice]),
    (Csv, Ods, &[Soffice]),
    (Csv, Pdf, &[Soffice]),
    (Csv, Html, &[Soffice]),
    // Presentations
    (Pptx, Pdf, &[Soffice]),
    (Pptx, Html, &[Soffice]),
    (Pptx, Odp, &[Soffice]),
    (Odp, Pptx, &[Soffice]),
    (Odp, Pdf, &[Soffice]),
    // SVG rasterization
    (Svg, Png, &[Magick]),
    (Svg, Jpg, &[Magick]),
    (Svg, Pdf, &[Magick]),
];

const RASTER_FORMATS: &[Format] = &[Jpg, Png, Gif, Bmp, Tiff, Webp];
const AUDIO_FORMATS: &[Format] = &[Mp3, Wav, Flac, Ogg];
const VIDEO_FORMATS: &[Format] = &[Mp4, Avi, Mov, Webm];

/// Ordered strategy lists per `(source, destination)` pair.
pub struct RoutingTable {
    routes: HashMap<(Format, Format), Vec<StrategyId>>,
}

impl RoutingTable {
    /// An empty table. Useful for building custom tables in tests or
    /// embedding setups with a reduced tool set.
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// The full default table: the static document routes plus the
    /// expanded raster/audio/video families.
    pub fn with_default_routes() -> Self {
        let mut table = Self::new();

        for (source, destination, strategies) in ROUTES {
            table.insert(*source, *destination, strategies.to_vec());
        }

        // Raster images convert within the family; built-in codec first,
        // ImageMagick as the heavier fallback. Every raster format also
        // renders to a single-page PDF via ImageMagick.
        for &source in RASTER_FORMATS {
            for &destination in RASTER_FORMATS {
                if source != destination {
                    table.insert(source, destination, vec![Raster, Magick]);
                }
            }
            table.insert(source, Pdf, vec![Magick]);
        }

        for &source in AUDIO_FORMATS {
            for &destination in AUDIO_FORMATS {
                if source != destination {
                    table.insert(source, destination, vec![Ffmpeg]);
                }
            }
        }

        for &source in VIDEO_FORMATS {
            for &destination in VIDEO_FORMATS {
                if source != destination {
                    table.insert(source, destination, vec![Ffmpeg]);
                }
            }
            table.insert(source, Mp3, vec![Ffmpeg]);
            table.insert(source, Wav, vec![Ffmpeg]);
        }

        table
    }

    /// Registers (or replaces) a route. Empty strategy lists are rejected
    /// at insertion so the completeness invariant holds by construction.
    pub fn insert(&mut self, source: Format, destination: Format, strategies: Vec<StrategyId>) {
        assert!(
            !strategies.is_empty(),
            "route ({source}, {destination}) must list at least one strategy"
        );
        self.routes.insert((source, destination), strategies);
    }

    /// The ordered fallback chain for a pair.
    pub fn strategies_for(
        &self,
        source: Format,
        destination: Format,
    ) -> Result<&[StrategyId], RoutingError> {
        self.routes
            .get(&(source, destination))
            .map(|s| s.as_slice())
            .ok_or(RoutingError::UnsupportedConversion {
                source,
                destination,
            })
    }

    pub fn contains(&self, source: Format, destination: Format) -> bool {
        self.routes.contains_key(&(source, destination))
    }

    /// Every supported pair, sorted for stable listings.
    pub fn supported_pairs(&self) -> Vec<(Format, Format)> {
        let mut pairs: Vec<(Format, Format)> = self.routes.keys().copied().collect();
        pairs.sort();
        pairs
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::with_default_routes()
    }
}
