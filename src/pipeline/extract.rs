//! Vision-model extraction: page image in, raw reply text out.
//!
//! Deliberately thin. The prompt lives in [`crate::prompts`] and all parsing
//! happens in [`crate::pipeline::normalize`]; this module only builds the
//! messages, applies the timeout and retries transient failures.
//!
//! ## Retry Strategy
//!
//! Exponential backoff (`retry_backoff_ms * 2^(attempt-1)`): with the 500 ms
//! default and 3 retries the waits are 500 ms → 1 s → 2 s.

use crate::config::RecipeConfig;
use crate::error::{ExtractionError, RecipeError};
use crate::prompts::EXTRACTION_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, GeminiProvider, ImageData, LLMProvider, ProviderFactory,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Raw model reply for one page.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub retries: u32,
    pub duration_ms: u64,
}

/// Something that turns a page image into raw recipe text.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, page_num: usize, image: ImageData) -> Result<Extraction, ExtractionError>;
}

/// [`Extractor`] backed by an `edgequake_llm` vision provider.
pub struct VisionExtractor {
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout_secs: u64,
}

impl VisionExtractor {
    /// Create the provider named in the config (`gemini` by default).
    pub fn from_config(config: &RecipeConfig) -> Result<Self, RecipeError> {
        let provider = create_provider(config)?;
        Ok(Self::with_provider(provider, config))
    }

    /// Wrap an already constructed provider.
    pub fn with_provider(provider: Arc<dyn LLMProvider>, config: &RecipeConfig) -> Self {
        Self {
            provider,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout_secs: config.api_timeout_secs,
        }
    }

    /// Shared handle to the underlying provider.
    pub fn provider(&self) -> Arc<dyn LLMProvider> {
        Arc::clone(&self.provider)
    }

    fn options(&self) -> CompletionOptions {
        build_options(self.temperature, self.max_tokens)
    }
}

/// Instantiate the configured provider/model pair.
///
/// Gemini is built from `config.gemini_api_key`; other providers go through
/// the factory and read their own credentials from the environment.
pub fn create_provider(config: &RecipeConfig) -> Result<Arc<dyn LLMProvider>, RecipeError> {
    let name = config.provider_name.as_str();
    if name.eq_ignore_ascii_case("gemini") {
        if config.gemini_api_key.trim().is_empty() {
            return Err(RecipeError::ProviderNotConfigured {
                provider: name.to_string(),
                hint: "GEMINI_API_KEY is empty".to_string(),
            });
        }
        let provider = GeminiProvider::new(config.gemini_api_key.clone())
            .with_model(config.extraction_model.as_str());
        return Ok(Arc::new(provider));
    }

    ProviderFactory::create_llm_provider(name, &config.extraction_model).map_err(|e| {
        RecipeError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[async_trait]
impl Extractor for VisionExtractor {
    async fn extract(&self, page_num: usize, image: ImageData) -> Result<Extraction, ExtractionError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(EXTRACTION_PROMPT),
            ChatMessage::user_with_images("", vec![image]),
        ];
        let options = self.options();
        let limit = Duration::from_secs(self.timeout_secs);

        let mut last_err = ExtractionError::EmptyResponse;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_delay(self.retry_backoff_ms, attempt);
                warn!(
                    "Page {}: retry {}/{} after {}ms",
                    page_num, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(limit, self.provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    if response.content.trim().is_empty() {
                        warn!("Page {}: attempt {} returned empty text", page_num, attempt + 1);
                        last_err = ExtractionError::EmptyResponse;
                        continue;
                    }
                    let duration = start.elapsed();
                    debug!(
                        "Page {}: {} input tokens, {} output tokens, {:?}",
                        page_num, response.prompt_tokens, response.completion_tokens, duration
                    );
                    return Ok(Extraction {
                        text: response.content,
                        input_tokens: response.prompt_tokens,
                        output_tokens: response.completion_tokens,
                        retries: attempt,
                        duration_ms: duration.as_millis() as u64,
                    });
                }
                Ok(Err(e)) => {
                    warn!("Page {}: attempt {} failed — {}", page_num, attempt + 1, e);
                    last_err = ExtractionError::Api {
                        retries: self.max_retries,
                        detail: e.to_string(),
                    };
                }
                Err(_) => {
                    warn!(
                        "Page {}: attempt {} timed out after {}s",
                        page_num,
                        attempt + 1,
                        self.timeout_secs
                    );
                    last_err = ExtractionError::Timeout {
                        secs: self.timeout_secs,
                    };
                }
            }
        }

        Err(last_err)
    }
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}
