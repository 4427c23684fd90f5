//! Runs a single strategy and enforces its side-effect contract:
//! exactly one artifact on success, no dangling partials on failure.

use std::time::Duration;

use crate::error::StrategyError;
use crate::strategy::{ConversionRequest, ConversionStrategy};

/// Executes one strategy against the request. On any failure — including
/// a strategy that reports success without producing usable output — the
/// partial artifact at the output path is removed.
pub fn execute(
    strategy: &dyn ConversionStrategy,
    request: &ConversionRequest,
    timeout: Duration,
) -> Result<(), StrategyError> {
    let _span = tracing::info_span!("strategy", id = %strategy.id()).entered();

    let result = strategy.convert(request, timeout);

    match result {
        Ok(()) => match std::fs::metadata(&request.output) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => {
                discard_partial(request);
                Err(StrategyError::ExecutionFailed(format!(
                    "{} reported success but produced no usable output",
                    strategy.id()
                )))
            }
        },
        Err(e) => {
            discard_partial(request);
            Err(e)
        }
    }
}

fn discard_partial(request: &ConversionRequest) {
    if request.output.exists() {
        if let Err(e) = std::fs::remove_file(&request.output) {
            log::warn!(
                "Failed to remove partial artifact {}: {}",
                request.output.display(),
                e
            );
        }
    }
}
