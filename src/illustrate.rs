//! Recipe illustrations generated with Gemini.
//!
//! Two model calls per recipe:
//!
//! 1. the text model expands [`crate::prompts::BASE_IMAGE_PROMPT`] into a
//!    dish-specific brief, using the recipe as context;
//! 2. the image model (`responseModalities: ["TEXT", "IMAGE"]`) renders the
//!    brief and answers with an inline base64 image.
//!
//! The image is re-encoded as PNG and written atomically to
//! `{image_dir}/{title}.png`. A crash mid-write never leaves a truncated file
//! where a previous run's image used to be.

use crate::config::RecipeConfig;
use crate::error::{IllustrationError, RecipeError};
use crate::pipeline::extract::create_provider;
use crate::prompts::illustration_brief_request;
use crate::recipe::RecipeRecord;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use image::DynamicImage;
use serde_json::{json, Value};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// File stem used when a title sanitises to nothing.
pub const FALLBACK_FILE_STEM: &str = "receta";

/// Produces an illustration for a recipe and returns where it was saved.
#[async_trait]
pub trait Illustrator: Send + Sync {
    async fn illustrate(&self, record: &RecipeRecord) -> Result<PathBuf, IllustrationError>;
}

/// [`Illustrator`] using an LLM for the brief and the Gemini REST API for the image.
pub struct GeminiIllustrator {
    brief_writer: Arc<dyn LLMProvider>,
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    image_dir: PathBuf,
}

impl GeminiIllustrator {
    pub fn from_config(config: &RecipeConfig) -> Result<Self, RecipeError> {
        let brief_writer = create_provider(config)?;
        Self::with_provider(brief_writer, config)
    }

    /// Reuse an existing provider for the brief-writing step.
    pub fn with_provider(
        brief_writer: Arc<dyn LLMProvider>,
        config: &RecipeConfig,
    ) -> Result<Self, RecipeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| RecipeError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            brief_writer,
            http,
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.gemini_api_base.trim_end_matches('/'),
                config.image_model
            ),
            api_key: config.gemini_api_key.clone(),
            image_dir: config.image_dir.clone(),
        })
    }

    async fn write_brief(&self, record: &RecipeRecord) -> Result<String, IllustrationError> {
        let messages = vec![ChatMessage::user(illustration_brief_request(
            &record.to_prompt_text(),
        ))];
        let options = CompletionOptions {
            temperature: Some(0.7),
            ..Default::default()
        };
        let response = self
            .brief_writer
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| IllustrationError::Brief(e.to_string()))?;
        let brief = response.content.trim().to_string();
        if brief.is_empty() {
            return Err(IllustrationError::Brief("empty reply".into()));
        }
        debug!("Image brief for '{}': {} chars", record.title, brief.len());
        Ok(brief)
    }

    async fn generate(&self, brief: &str) -> Result<Vec<u8>, IllustrationError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": brief }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] }
        });
        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| IllustrationError::Api(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| IllustrationError::Api(e.to_string()))?;
        if !status.is_success() {
            let snippet: String = text.chars().take(300).collect();
            return Err(IllustrationError::Api(format!("HTTP {status}: {snippet}")));
        }

        let reply: Value =
            serde_json::from_str(&text).map_err(|e| IllustrationError::Api(e.to_string()))?;
        let data = inline_image_data(&reply).ok_or(IllustrationError::NoImage)?;
        STANDARD
            .decode(data)
            .map_err(|e| IllustrationError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Illustrator for GeminiIllustrator {
    async fn illustrate(&self, record: &RecipeRecord) -> Result<PathBuf, IllustrationError> {
        let brief = self.write_brief(record).await?;
        let bytes = self.generate(&brief).await?;
        let image =
            image::load_from_memory(&bytes).map_err(|e| IllustrationError::Decode(e.to_string()))?;

        let dir = self.image_dir.clone();
        let stem = sanitize_file_name(&record.title);
        let path = tokio::task::spawn_blocking(move || save_png(&dir, &stem, &image))
            .await
            .map_err(|e| IllustrationError::Write {
                path: self.image_dir.clone(),
                detail: format!("write task panicked: {e}"),
            })??;

        info!("Saved illustration {}", path.display());
        Ok(path)
    }
}

/// First inline image payload in a `generateContent` response.
pub fn inline_image_data(reply: &Value) -> Option<&str> {
    reply
        .get("candidates")?
        .as_array()?
        .iter()
        .filter_map(|c| c.pointer("/content/parts")?.as_array())
        .flatten()
        .find_map(|part| {
            part.get("inlineData")
                .or_else(|| part.get("inline_data"))?
                .get("data")?
                .as_str()
        })
}

/// Strip characters that are invalid in file names on common filesystems.
pub fn sanitize_file_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '"' | '<' | '>' | '|') && !c.is_control())
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').trim_end();
    if cleaned.is_empty() {
        FALLBACK_FILE_STEM.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Write `image` as `{dir}/{stem}.png` via a temp file in the same directory.
pub fn save_png(dir: &Path, stem: &str, image: &DynamicImage) -> Result<PathBuf, IllustrationError> {
    let path = dir.join(format!("{stem}.png"));
    let write_err = |detail: String| IllustrationError::Write {
        path: path.clone(),
        detail,
    };

    std::fs::create_dir_all(dir).map_err(|e| write_err(e.to_string()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| write_err(e.to_string()))?;
    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        image
            .write_to(&mut out, image::ImageFormat::Png)
            .map_err(|e| write_err(e.to_string()))?;
        out.flush().map_err(|e| write_err(e.to_string()))?;
    }
    tmp.persist(&path).map_err(|e| write_err(e.error.to_string()))?;
    Ok(path)
}
