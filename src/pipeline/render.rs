//! PDF rendering through an external HTML-to-PDF engine.
//!
//! The engine is hidden behind the [`Renderer`] trait: this module owns the
//! construction of its inputs (the transient HTML file and the flag set) and
//! the interpretation of its exit status, nothing else. The default
//! implementation shells out to `wkhtmltopdf`; tests inject stubs.
//!
//! ## Transient file lifetime
//!
//! The assembled HTML is written to a [`tempfile::NamedTempFile`] with a
//! random name, so concurrent jobs never collide. The handle lives on the
//! stack of [`render_document`] and is dropped (deleting the file) on every
//! return path, including early `?` returns and panics.

use crate::error::RenderError;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Caller-controlled renderer parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Wait this long after load so MathJax can finish typesetting.
    pub javascript_delay_ms: u64,
    /// Kill the renderer after this long.
    pub timeout: Option<Duration>,
}

/// Exit status and captured output of one renderer invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderStatus {
    /// Process exit code; `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RenderStatus {
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn status_label(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "signal".to_string(),
        }
    }

    /// Captured stderr, falling back to stdout, for the failure message.
    fn detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        "no output captured".to_string()
    }
}

/// An HTML-to-PDF engine.
///
/// `run` receives a readable HTML file and the PDF path to create. It reports
/// how the engine exited; launch failures and timeouts are errors.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        options: &RenderOptions,
    ) -> Result<RenderStatus, RenderError>;
}

/// Renders with the `wkhtmltopdf` command-line tool.
#[derive(Debug, Clone)]
pub struct WkhtmltopdfRenderer {
    program: PathBuf,
}

impl WkhtmltopdfRenderer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Full argument list for one invocation.
    pub fn args(input: &Path, output: &Path, options: &RenderOptions) -> Vec<std::ffi::OsString> {
        vec![
            "--javascript-delay".into(),
            options.javascript_delay_ms.to_string().into(),
            "--no-stop-slow-scripts".into(),
            "--enable-local-file-access".into(),
            "--quiet".into(),
            input.as_os_str().to_owned(),
            output.as_os_str().to_owned(),
        ]
    }
}

impl Default for WkhtmltopdfRenderer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RENDERER_PROGRAM)
    }
}

#[async_trait]
impl Renderer for WkhtmltopdfRenderer {
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        options: &RenderOptions,
    ) -> Result<RenderStatus, RenderError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(Self::args(input, output, options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Launching {} for {}", self.program.display(), output.display());

        let run = cmd.output();
        let result = match options.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| RenderError::Timeout {
                    secs: limit.as_secs(),
                })?,
            None => run.await,
        };

        let out = result.map_err(|source| RenderError::Launch {
            program: self.program.clone(),
            source,
        })?;

        Ok(RenderStatus {
            exit_code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

/// Write `document` to a transient HTML file and render it to `output`.
///
/// The transient file is removed before this function returns, whatever the
/// outcome.
///
/// # Errors
/// [`RenderError::TempFile`] if the HTML cannot be written, anything the
/// renderer itself returns, and [`RenderError::Failed`] for a non-zero exit.
pub async fn render_document(
    renderer: &dyn Renderer,
    document: &[u8],
    output: &Path,
    options: &RenderOptions,
) -> Result<(), RenderError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("url2pdf-")
        .suffix(".html")
        .tempfile()
        .map_err(RenderError::TempFile)?;
    tmp.write_all(document).map_err(RenderError::TempFile)?;
    tmp.flush().map_err(RenderError::TempFile)?;

    let status = renderer.run(tmp.path(), output, options).await?;

    let tmp_path = tmp.path().to_path_buf();
    if let Err(e) = tmp.close() {
        warn!("Failed to remove {}: {}", tmp_path.display(), e);
    }

    if status.is_success() {
        Ok(())
    } else {
        Err(RenderError::Failed {
            status: status.status_label(),
            detail: status.detail(),
        })
    }
}
