//! Configuration types for URL-to-PDF batch conversion.
//!
//! All conversion behaviour is controlled through [`RenderConfig`], built via
//! its [`RenderConfigBuilder`]. The config is constructed once at startup and
//! then shared read-only by every worker, so no field is ever mutated while a
//! batch is running.

use crate::error::StartupError;
use crate::pipeline::render::Renderer;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Desktop Chrome user agent. Many sites serve stripped-down or blocked
/// content to unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Default external renderer binary.
pub const DEFAULT_RENDERER_PROGRAM: &str = "wkhtmltopdf";

/// Configuration for a conversion batch.
///
/// Built via [`RenderConfig::builder()`] or using [`RenderConfig::default()`].
///
/// # Example
/// ```rust
/// use url2pdf::RenderConfig;
///
/// let config = RenderConfig::builder()
///     .max_workers(8)
///     .javascript_delay_ms(5_000)
///     .target_image_quality(70)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RenderConfig {
    /// `User-Agent` sent with page and image requests.
    pub user_agent: String,

    /// Per-HTTP-call timeout in seconds (page fetch and each image). Default: 30.
    pub timeout_secs: u64,

    /// Milliseconds the renderer waits for deferred scripts before
    /// rasterising. Default: 10 000.
    ///
    /// MathJax typesets asynchronously after load; too short a delay leaves
    /// raw TeX in the PDF.
    pub javascript_delay_ms: u64,

    /// Re-encode WebP images as inline JPEG. Default: true.
    pub convert_source_image_format: bool,

    /// JPEG quality for re-encoded images, 1–100. Default: 85.
    pub target_image_quality: u8,

    /// Byte cap for a single image download. Default: 10 MiB.
    pub max_image_bytes: u64,

    /// Extra attempts after the first failed page fetch. Default: 2.
    pub retry_attempts: u32,

    /// Base delay between page-fetch retries in milliseconds. Default: 0.
    ///
    /// Zero means retries fire back-to-back. Any other value enables
    /// exponential backoff (`retry_backoff_ms * 2^(attempt-1)`); the attempt
    /// bound is unchanged.
    pub retry_backoff_ms: u64,

    /// Maximum number of concurrently running jobs. Default: 4.
    pub max_workers: usize,

    /// Renderer binary used when no [`RenderConfig::renderer`] is injected.
    pub renderer_program: PathBuf,

    /// Kill the renderer after this many seconds. Default: None (no limit).
    pub render_timeout_secs: Option<u64>,

    /// Pre-constructed renderer. Takes precedence over `renderer_program`.
    pub renderer: Option<Arc<dyn Renderer>>,

    /// Receives per-job progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            javascript_delay_ms: 10_000,
            convert_source_image_format: true,
            target_image_quality: 85,
            max_image_bytes: 10 * 1024 * 1024,
            retry_attempts: 2,
            retry_backoff_ms: 0,
            max_workers: 4,
            renderer_program: PathBuf::from(DEFAULT_RENDERER_PROGRAM),
            render_timeout_secs: None,
            renderer: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderConfig")
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .field("javascript_delay_ms", &self.javascript_delay_ms)
            .field("convert_source_image_format", &self.convert_source_image_format)
            .field("target_image_quality", &self.target_image_quality)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_workers", &self.max_workers)
            .field("renderer_program", &self.renderer_program)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("renderer", &self.renderer.as_ref().map(|_| "<dyn Renderer>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }

    /// Per-HTTP-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Per-render-invocation timeout, if any.
    pub fn render_timeout(&self) -> Option<Duration> {
        self.render_timeout_secs.map(Duration::from_secs)
    }
}

/// Builder for [`RenderConfig`].
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl fmt::Debug for RenderConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl RenderConfigBuilder {
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs.max(1);
        self
    }

    pub fn javascript_delay_ms(mut self, ms: u64) -> Self {
        self.config.javascript_delay_ms = ms;
        self
    }

    pub fn convert_source_image_format(mut self, v: bool) -> Self {
        self.config.convert_source_image_format = v;
        self
    }

    pub fn target_image_quality(mut self, q: u8) -> Self {
        self.config.target_image_quality = q.clamp(1, 100);
        self
    }

    pub fn max_image_bytes(mut self, n: u64) -> Self {
        self.config.max_image_bytes = n;
        self
    }

    pub fn retry_attempts(mut self, n: u32) -> Self {
        self.config.retry_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.max_workers = n.max(1);
        self
    }

    pub fn renderer_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.renderer_program = program.into();
        self
    }

    pub fn render_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.config.renderer = Some(renderer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, StartupError> {
        let c = &self.config;
        if !(1..=100).contains(&c.target_image_quality) {
            return Err(StartupError::InvalidConfig(format!(
                "Image quality must be 1–100, got {}",
                c.target_image_quality
            )));
        }
        if c.max_workers == 0 {
            return Err(StartupError::InvalidConfig(
                "Worker count must be ≥ 1".into(),
            ));
        }
        if c.user_agent.trim().is_empty() {
            return Err(StartupError::InvalidConfig(
                "User agent must not be empty".into(),
            ));
        }
        if c.renderer.is_none() && c.renderer_program.as_os_str().is_empty() {
            return Err(StartupError::InvalidConfig(
                "Renderer program must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
