//! Configuration for capture and transcription.
//!
//! Everything tunable lives in [`ScribeConfig`], built via
//! [`ScribeConfigBuilder`]. Callers set what they care about and rely on
//! documented defaults for the rest.

use crate::error::TabscribeError;
use crate::progress::{CaptureCallback, CaptureProgressCallback, NoopCaptureCallback};
use crate::store::{JsonFileBackend, IMAGES_FILE};
use crate::settings::SETTINGS_FILE;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment override for the data directory.
pub const DATA_DIR_ENV: &str = "TABSCRIBE_DATA_DIR";

/// `$TABSCRIBE_DATA_DIR`, else `<platform data dir>/tabscribe`, else
/// `./.tabscribe`.
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join("tabscribe"))
        .unwrap_or_else(|| PathBuf::from(".tabscribe"))
}

/// Configuration for the capture pipeline and the transcriber.
///
/// # Example
/// ```rust
/// use tabscribe::ScribeConfig;
///
/// let config = ScribeConfig::builder()
///     .data_dir("/tmp/tabscribe")
///     .provider_name("gemini")
///     .max_retries(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.images_path(), std::path::Path::new("/tmp/tabscribe/images.json"));
/// ```
#[derive(Clone)]
pub struct ScribeConfig {
    /// Directory holding `images.json` and `settings.json`.
    pub data_dir: PathBuf,

    /// Both dimensions of a drag must exceed this to produce a capture.
    /// CSS pixels. Default: 10.
    pub min_selection_px: f64,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Provider name (e.g. "gemini", "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Model identifier. If None, a per-provider default is used.
    pub model: Option<String>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription wants the model faithful to the pixels, not creative.
    pub temperature: f32,

    /// Maximum output tokens for the whole transcription. Default: 8192.
    ///
    /// One request carries every capture, so the budget covers all of them.
    pub max_tokens: usize,

    /// Retries after a failed or timed-out call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Receives capture status events. Default: no-op.
    pub capture_callback: CaptureCallback,
}

impl Default for ScribeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            min_selection_px: crate::geometry::MIN_SELECTION_PX,
            provider: None,
            provider_name: None,
            model: None,
            temperature: 0.1,
            max_tokens: 8192,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            capture_callback: Arc::new(NoopCaptureCallback),
        }
    }
}

impl fmt::Debug for ScribeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScribeConfig")
            .field("data_dir", &self.data_dir)
            .field("min_selection_px", &self.min_selection_px)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl ScribeConfig {
    pub fn builder() -> ScribeConfigBuilder {
        ScribeConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn images_path(&self) -> PathBuf {
        self.data_dir.join(IMAGES_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    /// Durable backend for the image collection in `data_dir`.
    pub fn image_backend(&self) -> JsonFileBackend {
        JsonFileBackend::in_dir(&self.data_dir)
    }
}

/// Builder for [`ScribeConfig`].
pub struct ScribeConfigBuilder {
    config: ScribeConfig,
}

impl fmt::Debug for ScribeConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScribeConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ScribeConfigBuilder {
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.data_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn min_selection_px(mut self, px: f64) -> Self {
        self.config.min_selection_px = px;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn capture_callback(mut self, callback: Arc<dyn CaptureProgressCallback>) -> Self {
        self.config.capture_callback = callback;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScribeConfig, TabscribeError> {
        let c = &self.config;
        if !c.min_selection_px.is_finite() || c.min_selection_px < 0.0 {
            return Err(TabscribeError::InvalidConfig(format!(
                "Minimum selection size must be ≥ 0 px, got {}",
                c.min_selection_px
            )));
        }
        if c.max_tokens == 0 {
            return Err(TabscribeError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(TabscribeError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.data_dir.as_os_str().is_empty() {
            return Err(TabscribeError::InvalidConfig("data directory must not be empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ScribeConfig::default();
        assert_eq!(c.min_selection_px, 10.0);
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.retry_backoff_ms, 500);
        assert!(c.provider.is_none());
    }

    #[test]
    fn images_and_settings_are_separate_files() {
        let c = ScribeConfig::builder().data_dir("/data").build().unwrap();
        assert_eq!(c.images_path(), PathBuf::from("/data/images.json"));
        assert_eq!(c.settings_path(), PathBuf::from("/data/settings.json"));
        assert_ne!(c.images_path(), c.settings_path());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = ScribeConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(ScribeConfig::builder().min_selection_px(-1.0).build().is_err());
        assert!(ScribeConfig::builder().max_tokens(0).build().is_err());
        assert!(ScribeConfig::builder().api_timeout_secs(0).build().is_err());
    }

    #[test]
    fn debug_hides_provider_and_callback() {
        let dbg = format!("{:?}", ScribeConfig::default());
        assert!(dbg.contains("ScribeConfig"));
        assert!(!dbg.contains("capture_callback"));
    }
}
