use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::RenderError;

/// Turns an HTML document on disk into a PDF on disk.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, html_path: &Path, pdf_path: &Path) -> Result<(), RenderError>;
}

/// Runs an external `wkhtmltopdf`-compatible binary as
/// `<program> [args..] <html> <pdf>`.
///
/// The child is spawned with `kill_on_drop`, so it dies both when the timeout
/// fires and when the request future is dropped mid-render.
#[derive(Debug, Clone)]
pub struct WkhtmltopdfConverter {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl WkhtmltopdfConverter {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: vec!["--quiet".to_string()],
            timeout,
        }
    }

    /// Replaces the arguments placed before the input and output paths.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl DocumentConverter for WkhtmltopdfConverter {
    async fn convert(&self, html_path: &Path, pdf_path: &Path) -> Result<(), RenderError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(html_path)
            .arg(pdf_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Relative asset references in the template resolve next to the HTML.
        if let Some(dir) = html_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| RenderError::ConverterUnavailable {
            program: self.program.display().to_string(),
            reason: e.to_string(),
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                // Dropping the wait future drops the child, which kills it.
                warn!(
                    program = %self.program.display(),
                    timeout_secs = self.timeout.as_secs_f64(),
                    "converter timed out and was killed"
                );
                return Err(RenderError::ConverterTimeout(self.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(output = %stdout.trim(), "converter stdout");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(status = ?output.status.code(), %stderr, "converter exited with failure");
            return Err(RenderError::Converter {
                status: output.status.code(),
                stderr,
            });
        }

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn shell(script: &str, timeout: Duration) -> WkhtmltopdfConverter {
        // sh -c '<script>' <html> <pdf>  =>  $0 = html, $1 = pdf
        WkhtmltopdfConverter::new("sh", timeout).with_args(["-c", script])
    }

    #[tokio::test]
    async fn successful_conversion_produces_output() {
        let dir = tempfile::tempdir().unwrap();
        let html = dir.path().join("in.html");
        let pdf = dir.path().join("out.pdf");
        std::fs::write(&html, "<p>hi</p>").unwrap();

        shell(r#"cp "$0" "$1""#, Duration::from_secs(10))
            .convert(&html, &pdf)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&pdf).unwrap(), "<p>hi</p>");
    }

    #[tokio::test]
    async fn non_zero_exit_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let html = dir.path().join("in.html");
        std::fs::write(&html, "").unwrap();

        let err = shell("echo 'bad page size' >&2; exit 3", Duration::from_secs(10))
            .convert(&html, &dir.path().join("out.pdf"))
            .await
            .unwrap_err();

        match err {
            RenderError::Converter { status, stderr } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr, "bad page size");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_converter_is_killed_at_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let html = dir.path().join("in.html");
        std::fs::write(&html, "").unwrap();

        let started = Instant::now();
        let err = shell("sleep 30", Duration::from_millis(200))
            .convert(&html, &dir.path().join("out.pdf"))
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::ConverterTimeout(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = WkhtmltopdfConverter::new("/nonexistent/wkhtmltopdf", Duration::from_secs(1))
            .convert(&dir.path().join("in.html"), &dir.path().join("out.pdf"))
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::ConverterUnavailable { .. }));
    }
}
