//! Transcription: ordered captures → one VLM call → cleaned HTML markup.
//!
//! The request is a single user turn: the prompt text first, then every
//! captured image in collection order. Order matters; the model is told to
//! transcribe "in sequence".
//!
//! ## Retry Strategy
//!
//! Each attempt is bounded by `api_timeout_secs`. Failed or timed-out
//! attempts are retried up to `max_retries` times with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`): 500 ms → 1 s → 2 s by default.

pub mod postprocess;
pub mod prompts;

pub use prompts::DEFAULT_PROMPT;

use crate::capture::CapturedImage;
use crate::config::ScribeConfig;
use crate::error::TabscribeError;
use crate::settings::Settings;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Model used when the provider is chosen by name without a model.
pub fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "gemini" | "google" => "gemini-2.0-flash",
        "anthropic" => "claude-sonnet-4-20250514",
        _ => "gpt-4.1-nano",
    }
}

/// Result of one successful transcription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    /// Cleaned HTML markup.
    pub markup: String,
    pub image_count: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
}

/// Transcribe `images` with the prompt from `settings`.
pub async fn transcribe(
    images: &[CapturedImage],
    config: &ScribeConfig,
    settings: &Settings,
) -> Result<Transcription, TabscribeError> {
    if images.is_empty() {
        return Err(TabscribeError::NoImages);
    }

    let provider = resolve_provider(config).await?;
    let messages = build_messages(images, settings.prompt())?;
    let options = build_options(config);
    let start = Instant::now();

    info!(
        "Transcribing {} images (provider: {}, model: {})",
        images.len(),
        config.provider_name.as_deref().unwrap_or("auto"),
        config.model.as_deref().unwrap_or("default")
    );

    let (response, retries) = with_retries(
        config.max_retries,
        config.retry_backoff_ms,
        config.api_timeout_secs,
        || provider.chat(&messages, Some(&options)),
    )
    .await?;

    let markup = postprocess::clean_markup(&response.content);
    if markup.is_empty() {
        return Err(TabscribeError::EmptyTranscription);
    }

    let duration = start.elapsed();
    debug!(
        "{} input tokens, {} output tokens, {:?}",
        response.prompt_tokens, response.completion_tokens, duration
    );

    Ok(Transcription {
        markup,
        image_count: images.len(),
        input_tokens: response.prompt_tokens,
        output_tokens: response.completion_tokens,
        duration_ms: duration.as_millis() as u64,
        retries,
    })
}

/// The image attachments, in collection order.
pub fn build_images(images: &[CapturedImage]) -> Result<Vec<ImageData>, TabscribeError> {
    images
        .iter()
        .enumerate()
        .map(|(index, img)| {
            img.to_image_data()
                .map_err(|e| TabscribeError::InvalidImageData {
                    index,
                    detail: e.to_string(),
                })
        })
        .collect()
}

/// One user message: prompt text followed by every image.
pub fn build_messages(images: &[CapturedImage], prompt: &str) -> Result<Vec<ChatMessage>, TabscribeError> {
    let attachments = build_images(images)?;
    let text = format!("{}\n\n{}", prompt, prompts::image_count_note(attachments.len()));
    Ok(vec![ChatMessage::user_with_images(text, attachments)])
}

fn build_options(config: &ScribeConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(retry_backoff_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(retry_backoff_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1))))
}

/// Run `call` until it succeeds, times out for the last time, or fails
/// `max_retries + 1` times. Returns the value and the number of retries.
pub async fn with_retries<T, E, F, Fut>(
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout_secs: u64,
    mut call: F,
) -> Result<(T, u32), TabscribeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let per_call = Duration::from_secs(timeout_secs);
    let mut last_err = String::from("Unknown error");
    let mut last_was_timeout = false;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let backoff = backoff_delay(retry_backoff_ms, attempt);
            warn!("Transcription: retry {}/{} after {:?}", attempt, max_retries, backoff);
            sleep(backoff).await;
        }

        match timeout(per_call, call()).await {
            Ok(Ok(value)) => return Ok((value, attempt)),
            Ok(Err(e)) => {
                last_err = e.to_string();
                last_was_timeout = false;
                warn!("Transcription: attempt {} failed: {}", attempt + 1, last_err);
            }
            Err(_) => {
                last_err = format!("timed out after {timeout_secs}s");
                last_was_timeout = true;
                warn!("Transcription: attempt {} timed out", attempt + 1);
            }
        }
    }

    if last_was_timeout {
        Err(TabscribeError::ApiTimeout { secs: timeout_secs })
    } else {
        Err(TabscribeError::TranscriptionFailed {
            retries: max_retries,
            detail: last_err,
        })
    }
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, TabscribeError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TabscribeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the VLM provider, most specific first:
///
/// 1. a pre-built provider on the config,
/// 2. a named provider (+ model),
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`,
/// 4. `GEMINI_API_KEY` → gemini,
/// 5. full auto-detection via `ProviderFactory::from_env`.
pub async fn resolve_provider(config: &ScribeConfig) -> Result<Arc<dyn LLMProvider>, TabscribeError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or_else(|| default_model_for(name));
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let model = config.model.as_deref().unwrap_or_else(|| default_model_for("gemini"));
        return create_vision_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TabscribeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No VLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY (or `tabscribe settings set --api-key`), \
                OPENAI_API_KEY or ANTHROPIC_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn img(n: i64) -> CapturedImage {
        CapturedImage::with_timestamp(format!("data:image/png;base64,AAA{n}"), n)
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&ScribeConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(8192));
    }

    #[test]
    fn images_keep_collection_order() {
        let data = build_images(&[img(1), img(2), img(3)]).unwrap();
        let payloads: Vec<&str> = data.iter().map(|d| d.data.as_str()).collect();
        assert_eq!(payloads, vec!["AAA1", "AAA2", "AAA3"]);
    }

    #[test]
    fn bad_image_names_its_index() {
        let bad = CapturedImage::with_timestamp("not a data url", 0);
        let err = build_images(&[img(1), bad]).unwrap_err();
        assert!(matches!(err, TabscribeError::InvalidImageData { index: 1, .. }));
    }

    #[test]
    fn one_user_message_per_request() {
        assert_eq!(build_messages(&[img(1), img(2)], DEFAULT_PROMPT).unwrap().len(), 1);
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(500, 3), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn empty_collection_is_rejected() {
        let err = transcribe(&[], &ScribeConfig::default(), &Settings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TabscribeError::NoImages));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let (value, retries) = with_retries(3, 10, 60, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("503 overloaded")
                } else {
                    Ok("<p>ok</p>")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, "<p>ok</p>");
        assert_eq!(retries, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_report_last_error() {
        let err = with_retries(2, 10, 60, || async { Err::<(), _>("bad key") })
            .await
            .unwrap_err();
        match err {
            TabscribeError::TranscriptionFailed { retries, detail } => {
                assert_eq!(retries, 2);
                assert_eq!(detail, "bad key");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let err = with_retries(0, 10, 1, || async {
            sleep(Duration::from_secs(5)).await;
            Ok::<_, &str>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, TabscribeError::ApiTimeout { secs: 1 }));
    }
}
