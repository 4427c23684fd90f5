//! Strategies that shell out to external conversion tools.
//!
//! All of them funnel through [`run_tool`], which enforces the
//! wall-clock budget by polling the child and killing it on expiry, and
//! classifies spawn/exit failures per the engine's error taxonomy.

use std::ffi::OsString;
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::StrategyError;
use crate::format::Format;
use crate::routing::StrategyId;
use crate::strategy::{ConversionRequest, ConversionStrategy};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_EXCERPT_LEN: usize = 240;

/// Spawns the command and waits for it within the wall-clock budget.
/// The child is killed when the deadline passes; a hang can never block
/// the dispatcher indefinitely.
pub(crate) fn run_tool(
    tool: &str,
    cmd: &mut Command,
    timeout: Duration,
) -> Result<(), StrategyError> {
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StrategyError::ToolMissing(tool.to_string()));
        }
        Err(e) => {
            return Err(StrategyError::ExecutionFailed(format!(
                "failed to spawn {tool}: {e}"
            )));
        }
    };

    // Drain stderr on a separate thread so a chatty tool cannot fill the
    // pipe buffer and wedge itself before the deadline check.
    let stderr = child.stderr.take();
    let drain = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = stderr {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = drain.join();
                    return Err(StrategyError::Timeout {
                        tool: tool.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = drain.join();
                return Err(StrategyError::ExecutionFailed(format!(
                    "failed to wait for {tool}: {e}"
                )));
            }
        }
    };

    let stderr_text = drain.join().unwrap_or_default();

    if status.success() {
        Ok(())
    } else {
        Err(StrategyError::ExecutionFailed(format!(
            "{tool} exited with {status}: {}",
            excerpt(&stderr_text)
        )))
    }
}

fn excerpt(text: &str) -> String {
    let flattened: String = text
        .trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    if flattened.is_empty() {
        "(no stderr output)".to_string()
    } else {
        flattened.chars().take(STDERR_EXCERPT_LEN).collect()
    }
}

/// LibreOffice headless conversion for office documents.
pub struct SofficeStrategy;

impl ConversionStrategy for SofficeStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::Soffice
    }

    fn convert(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
    ) -> Result<(), StrategyError> {
        let outdir = request.output.parent().ok_or_else(|| {
            StrategyError::ExecutionFailed("output path has no parent directory".to_string())
        })?;
        let ext = request.destination.extension();

        let mut cmd = Command::new("soffice");
        cmd.args(["--headless", "--convert-to", ext, "--outdir"])
            .arg(outdir)
            .arg(&request.input);
        run_tool("soffice", &mut cmd, timeout)?;

        // soffice names the artifact after the input stem; move it to the
        // requested output path when they differ.
        let stem = request
            .input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let produced = outdir.join(format!("{stem}.{ext}"));
        if produced != request.output {
            std::fs::rename(&produced, &request.output).map_err(|e| {
                StrategyError::ExecutionFailed(format!(
                    "soffice produced no usable output: {e}"
                ))
            })?;
        }
        Ok(())
    }
}

/// Pandoc document conversion.
pub struct PandocStrategy;

fn pandoc_reader(format: Format) -> Option<&'static str> {
    match format {
        Format::Docx => Some("docx"),
        Format::Odt => Some("odt"),
        Format::Html => Some("html"),
        Format::Md => Some("gfm"),
        Format::Rtf => Some("rtf"),
        // Pandoc has no plain-text reader; markdown is a superset.
        Format::Txt => Some("markdown"),
        _ => None,
    }
}

fn pandoc_writer(format: Format) -> Option<&'static str> {
    match format {
        Format::Docx => Some("docx"),
        Format::Odt => Some("odt"),
        Format::Html => Some("html"),
        Format::Md => Some("gfm"),
        Format::Txt => Some("plain"),
        // PDF output is selected via the -o extension and a PDF engine.
        _ => None,
    }
}

impl ConversionStrategy for PandocStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::Pandoc
    }

    fn convert(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
    ) -> Result<(), StrategyError> {
        let mut cmd = Command::new("pandoc");
        if let Some(reader) = pandoc_reader(request.source) {
            cmd.args(["-f", reader]);
        }
        if let Some(writer) = pandoc_writer(request.destination) {
            cmd.args(["-t", writer]);
        }
        cmd.arg("-o").arg(&request.output).arg(&request.input);
        run_tool("pandoc", &mut cmd, timeout)
    }
}

/// Poppler `pdftotext`, the high-fidelity PDF text extractor.
pub struct PdfToTextStrategy;

impl ConversionStrategy for PdfToTextStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::PdfToText
    }

    fn convert(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
    ) -> Result<(), StrategyError> {
        let mut cmd = Command::new("pdftotext");
        cmd.arg("-layout").arg(&request.input).arg(&request.output);
        run_tool("pdftotext", &mut cmd, timeout)
    }
}

/// ImageMagick `convert` for image conversions, SVG rasterization and
/// PDF page rendering.
pub struct MagickStrategy;

impl ConversionStrategy for MagickStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::Magick
    }

    fn convert(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
    ) -> Result<(), StrategyError> {
        let mut cmd = Command::new("convert");

        // Render PDFs at a readable density; only the first page becomes
        // the image, matching the single-artifact contract.
        let input_arg: OsString = if request.source == Format::Pdf {
            cmd.args(["-density", "150"]);
            let mut arg = OsString::from(request.input.as_os_str());
            arg.push("[0]");
            arg
        } else {
            request.input.as_os_str().to_os_string()
        };
        cmd.arg(input_arg);

        // JPEG carries no alpha channel; flatten onto white.
        if request.destination == Format::Jpg {
            cmd.args(["-background", "white", "-flatten"]);
        }

        cmd.arg(&request.output);
        run_tool("convert", &mut cmd, timeout)
    }
}

/// ffmpeg audio/video transcoding, including video→audio extraction.
pub struct FfmpegStrategy;

impl ConversionStrategy for FfmpegStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::Ffmpeg
    }

    fn convert(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
    ) -> Result<(), StrategyError> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-loglevel", "error", "-i"]).arg(&request.input);
        if request.source.is_video() && request.destination.is_audio() {
            cmd.arg("-vn");
        }
        cmd.arg(&request.output);
        run_tool("ffmpeg", &mut cmd, timeout)
    }
}

/// wkhtmltopdf HTML rendering.
pub struct WkHtmlToPdfStrategy;

impl ConversionStrategy for WkHtmlToPdfStrategy {
    fn id(&self) -> StrategyId {
        StrategyId::WkHtmlToPdf
    }

    fn convert(
        &self,
        request: &ConversionRequest,
        timeout: Duration,
    ) -> Result<(), StrategyError> {
        let mut cmd = Command::new("wkhtmltopdf");
        cmd.arg("--quiet").arg(&request.input).arg(&request.output);
        run_tool("wkhtmltopdf", &mut cmd, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_classified() {
        let mut cmd = Command::new("omniconv-no-such-tool-on-any-host");
        let err = run_tool(
            "omniconv-no-such-tool-on-any-host",
            &mut cmd,
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, StrategyError::ToolMissing(_)));
    }

    #[test]
    #[cfg(unix)]
    fn test_timeout_kills_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let start = Instant::now();
        let err = run_tool("sleep", &mut cmd, Duration::from_millis(150)).unwrap_err();
        assert!(matches!(err, StrategyError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    #[cfg(unix)]
    fn test_nonzero_exit_classified() {
        let mut cmd = Command::new("false");
        let err = run_tool("false", &mut cmd, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, StrategyError::ExecutionFailed(_)));
    }

    #[test]
    #[cfg(unix)]
    fn test_stderr_excerpt_in_error() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo broken pipe detected >&2; exit 3"]);
        let err = run_tool("sh", &mut cmd, Duration::from_secs(2)).unwrap_err();
        match err {
            StrategyError::ExecutionFailed(message) => {
                assert!(message.contains("broken pipe detected"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_successful_exit() {
        let mut cmd = Command::new("true");
        run_tool("true", &mut cmd, Duration::from_secs(2)).unwrap();
    }

    #[test]
    fn test_excerpt_flattens_and_truncates() {
        let text = "line one\n\n  line two  \n";
        assert_eq!(excerpt(text), "line one; line two");

        let long = "x".repeat(1000);
        assert_eq!(excerpt(&long).len(), STDERR_EXCERPT_LEN);

        assert_eq!(excerpt("  \n "), "(no stderr output)");
    }

    #[test]
    fn test_pandoc_format_names() {
        assert_eq!(pandoc_reader(Format::Docx), Some("docx"));
        assert_eq!(pandoc_reader(Format::Txt), Some("markdown"));
        assert_eq!(pandoc_reader(Format::Mp3), None);
        assert_eq!(pandoc_writer(Format::Txt), Some("plain"));
        assert_eq!(pandoc_writer(Format::Pdf), None);
    }
}
