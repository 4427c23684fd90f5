//! Conversion strategies: named capabilities behind a uniform contract.
//!
//! A strategy performs exactly one external tool invocation or one
//! bounded library call. The dispatcher never cares which; it only sees
//! the `ConversionStrategy` contract and the failure classification.

pub mod command;
pub mod executor;
pub mod pdf_extract;
pub mod raster;
pub mod text_render;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::StrategyError;
use crate::format::Format;
use crate::routing::StrategyId;

pub use command::{
    FfmpegStrategy, MagickStrategy, PandocStrategy, PdfToTextStrategy, SofficeStrategy,
    WkHtmlToPdfStrategy,
};
pub use executor::execute;
pub use pdf_extract::PdfExtractStrategy;
pub use raster::RasterStrategy;
pub use text_render::TextRenderStrategy;

/// One conversion attempt: read `input`, produce `output`.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub source: Format,
    pub destination: Format,
}

/// A named way to perform a specific format conversion.
///
/// Implementations must be self-contained: on success exactly one
/// artifact exists at `request.output`; on failure they return a
/// classified error and leave cleanup of partial artifacts to the
/// executor.
pub trait ConversionStrategy: Send + Sync {
    fn id(&self) -> StrategyId;

    fn convert(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
    ) -> Result<(), StrategyError>;
}

/// Maps strategy ids to their implementations.
pub struct StrategyRegistry {
    strategies: HashMap<StrategyId, Box<dyn ConversionStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// The full default set backing the default routing table.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SofficeStrategy));
        registry.register(Box::new(PandocStrategy));
        registry.register(Box::new(PdfToTextStrategy));
        registry.register(Box::new(PdfExtractStrategy));
        registry.register(Box::new(MagickStrategy));
        registry.register(Box::new(RasterStrategy));
        registry.register(Box::new(TextRenderStrategy));
        registry.register(Box::new(FfmpegStrategy));
        registry.register(Box::new(WkHtmlToPdfStrategy));
        registry
    }

    /// Registers (or replaces) the implementation for the strategy's id.
    pub fn register(&mut self, strategy: Box<dyn ConversionStrategy>) {
        self.strategies.insert(strategy.id(), strategy);
    }

    pub fn get(&self, id: StrategyId) -> Option<&dyn ConversionStrategy> {
        self.strategies.get(&id).map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
