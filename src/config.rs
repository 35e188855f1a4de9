//! Configuration for a recipe batch run.
//!
//! Every knob lives in [`RecipeConfig`], built through
//! [`RecipeConfigBuilder`] or read from the environment with
//! [`RecipeConfig::from_env`]. The config is passed explicitly to each
//! component at construction time; nothing reads the environment later.

use crate::error::RecipeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default Notion API root.
pub const NOTION_API_BASE: &str = "https://api.notion.com/v1";
/// Notion API version header value.
pub const NOTION_VERSION: &str = "2022-06-28";
/// Default Gemini REST root used for image generation.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration for converting recipe PDFs into Notion pages.
#[derive(Clone)]
pub struct RecipeConfig {
    /// Rendering DPI for page rasterisation. Range: 72–400. Default: 300.
    ///
    /// Scanned recipe cards often carry small handwritten notes at the
    /// bottom; 300 DPI keeps them legible to the model.
    pub dpi: u32,

    /// Cap on the longest rendered edge, in pixels. Default: 3000.
    pub max_rendered_pixels: u32,

    /// LLM provider name passed to `edgequake_llm::ProviderFactory`. Default: "gemini".
    pub provider_name: String,

    /// Vision model used for extraction and for writing the image brief.
    pub extraction_model: String,

    /// Gemini model that returns inline images.
    pub image_model: String,

    /// Sampling temperature for extraction. Default: 0.1.
    pub temperature: f32,

    /// Output token ceiling per extraction call. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a failed extraction call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout for model and Notion requests, in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Gemini API key (`GEMINI_API_KEY`).
    pub gemini_api_key: String,

    /// Gemini REST root. Overridable for tests.
    pub gemini_api_base: String,

    /// Notion integration token (`NOTION_TOKEN`).
    pub notion_token: String,

    /// Target Notion database (`NOTION_DATABASE_ID`).
    pub database_id: String,

    /// Notion REST root. Overridable for tests.
    pub notion_api_base: String,

    /// Directory receiving generated illustrations. Default: `Images`.
    pub image_dir: PathBuf,

    /// Whether to generate an illustration after each upload. Default: true.
    pub generate_images: bool,

    /// Tags added to every uploaded recipe. Default: `["IAG"]`.
    pub default_tags: Vec<String>,

    /// Database column names.
    pub properties: PropertyNames,

    /// Headings written into page bodies.
    pub labels: SectionLabels,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 3000,
            provider_name: "gemini".to_string(),
            extraction_model: "gemini-2.5-pro".to_string(),
            image_model: "gemini-2.0-flash-exp-image-generation".to_string(),
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            gemini_api_key: String::new(),
            gemini_api_base: GEMINI_API_BASE.to_string(),
            notion_token: String::new(),
            database_id: String::new(),
            notion_api_base: NOTION_API_BASE.to_string(),
            image_dir: PathBuf::from("Images"),
            generate_images: true,
            default_tags: vec!["IAG".to_string()],
            properties: PropertyNames::default(),
            labels: SectionLabels::default(),
        }
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl fmt::Debug for RecipeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipeConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("provider_name", &self.provider_name)
            .field("extraction_model", &self.extraction_model)
            .field("image_model", &self.image_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("notion_token", &redact(&self.notion_token))
            .field("database_id", &self.database_id)
            .field("image_dir", &self.image_dir)
            .field("generate_images", &self.generate_images)
            .field("default_tags", &self.default_tags)
            .finish()
    }
}

impl RecipeConfig {
    /// Create a new builder for `RecipeConfig`.
    pub fn builder() -> RecipeConfigBuilder {
        RecipeConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read credentials and optional overrides from the process environment.
    ///
    /// Required: `GEMINI_API_KEY`, `NOTION_TOKEN`, `NOTION_DATABASE_ID`.
    /// Optional: `RECIPES_EXTRACTION_MODEL`, `RECIPES_IMAGE_MODEL`,
    /// `RECIPES_IMAGE_DIR`, `RECIPES_DPI`, `RECIPES_GENERATE_IMAGES`.
    pub fn from_env() -> Result<Self, RecipeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RecipeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| -> Result<String, RecipeError> {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(RecipeError::MissingCredential { var })
        };
        let optional = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut builder = Self::builder()
            .gemini_api_key(required("GEMINI_API_KEY")?)
            .notion_token(required("NOTION_TOKEN")?)
            .database_id(required("NOTION_DATABASE_ID")?);

        if let Some(model) = optional("RECIPES_EXTRACTION_MODEL") {
            builder = builder.extraction_model(model);
        }
        if let Some(model) = optional("RECIPES_IMAGE_MODEL") {
            builder = builder.image_model(model);
        }
        if let Some(dir) = optional("RECIPES_IMAGE_DIR") {
            builder = builder.image_dir(dir);
        }
        if let Some(dpi) = optional("RECIPES_DPI") {
            let dpi: u32 = dpi.parse().map_err(|_| {
                RecipeError::InvalidConfig(format!("RECIPES_DPI must be an integer, got '{dpi}'"))
            })?;
            if !(72..=400).contains(&dpi) {
                return Err(RecipeError::InvalidConfig(format!(
                    "RECIPES_DPI must be 72–400, got {dpi}"
                )));
            }
            builder = builder.dpi(dpi);
        }
        if let Some(flag) = optional("RECIPES_GENERATE_IMAGES") {
            builder = builder.generate_images(!matches!(
                flag.to_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            ));
        }

        builder.build()
    }
}

/// Builder for [`RecipeConfig`].
#[derive(Debug)]
pub struct RecipeConfigBuilder {
    config: RecipeConfig,
}

impl RecipeConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn extraction_model(mut self, model: impl Into<String>) -> Self {
        self.config.extraction_model = model.into();
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.config.image_model = model.into();
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

    pub fn gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.gemini_api_key = key.into();
        self
    }

    pub fn gemini_api_base(mut self, url: impl Into<String>) -> Self {
        self.config.gemini_api_base = url.into();
        self
    }

    pub fn notion_token(mut self, token: impl Into<String>) -> Self {
        self.config.notion_token = token.into();
        self
    }

    pub fn database_id(mut self, id: impl Into<String>) -> Self {
        self.config.database_id = id.into();
        self
    }

    pub fn notion_api_base(mut self, url: impl Into<String>) -> Self {
        self.config.notion_api_base = url.into();
        self
    }

    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.image_dir = dir.into();
        self
    }

    pub fn generate_images(mut self, v: bool) -> Self {
        self.config.generate_images = v;
        self
    }

    pub fn default_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.default_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn properties(mut self, names: PropertyNames) -> Self {
        self.config.properties = names;
        self
    }

    pub fn labels(mut self, labels: SectionLabels) -> Self {
        self.config.labels = labels;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RecipeConfig, RecipeError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(RecipeError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.extraction_model.trim().is_empty() {
            return Err(RecipeError::InvalidConfig(
                "extraction model must not be empty".into(),
            ));
        }
        if c.properties.title.trim().is_empty() {
            return Err(RecipeError::InvalidConfig(
                "title property name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Column names in the target Notion database.
///
/// Only `title` is mandatory in the database; the others are written when a
/// column with that name and the matching type exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyNames {
    pub title: String,
    pub servings: String,
    pub vegetarian: String,
    pub tags: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            title: "Nombre".to_string(),
            servings: "Porciones".to_string(),
            vegetarian: "Vegetariano".to_string(),
            tags: "Tags".to_string(),
        }
    }
}

/// Headings used in the body of each recipe page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionLabels {
    pub ingredients: String,
    pub instructions: String,
    pub notes: String,
    pub servings: String,
    pub vegetarian: String,
}

impl Default for SectionLabels {
    fn default() -> Self {
        Self {
            ingredients: "Ingredientes".to_string(),
            instructions: "Preparación".to_string(),
            notes: "Notas".to_string(),
            servings: "Porciones".to_string(),
            vegetarian: "Vegetariano".to_string(),
        }
    }
}
