//! Built-in raster image conversion via the image crate.

use std::time::Duration;

use image::{DynamicImage, ImageFormat};

use crate::error::StrategyError;
use crate::format::Format;
use crate::routing::StrategyId;
use crate::strategy::{ConversionRequest, ConversionStrategy};

fn raster_format(format: Format) -> Option<ImageFormat> {
    match format {
        Format::Jpg => Some(ImageFormat::Jpeg),
        Format::Png => Some(ImageFormat::Png),
        Format::Gif => Some(ImageFormat::Gif),
        Format::Bmp => Some(ImageFormat::Bmp),
        Format::Tiff => Some(ImageFormat::Tiff),
        Format::Webp => Some(ImageFormat::WebP),
        _ => None,
    }
}

/// Decode/re-encode between raster formats without any external tool.
pub struct RasterStrategy;

impl ConversionStrategy for RasterStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::Raster
    }

    fn convert(
        &self,
        request: &ConversionRequest,
        _timeout: Duration,
    ) -> Result<(), StrategyError> {
        let _span = tracing::info_span!("strategy.raster").entered();

        let target = raster_format(request.destination).ok_or_else(|| {
            StrategyError::ExecutionFailed(format!(
                "raster strategy cannot encode {}",
                request.destination
            ))
        })?;

        let img = image::open(&request.input).map_err(|e| match e {
            image::ImageError::IoError(io) => {
                StrategyError::ExecutionFailed(format!("failed to read image: {io}"))
            }
            other => StrategyError::InvalidInput(format!(
                "input is not a decodable {} image: {other}",
                request.source
            )),
        })?;

        // JPEG carries no alpha channel; drop it before encoding.
        let img = if target == ImageFormat::Jpeg && img.color().has_alpha() {
            DynamicImage::ImageRgb8(img.to_rgb8())
        } else {
            img
        };

        img.save_with_format(&request.output, target).map_err(|e| {
            StrategyError::ExecutionFailed(format!(
                "failed to encode {}: {e}",
                request.destination
            ))
        })
    }
}
