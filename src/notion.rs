//! Notion uploader: one database page per recipe.
//!
//! ## Why read the database schema?
//!
//! Recipe databases drift: a column gets renamed, someone deletes `Tags`.
//! Writing a property that does not exist makes Notion reject the whole page,
//! so the schema is fetched once (lazily, on the first upload) and optional
//! columns that are missing or of the wrong type are simply left out. Only
//! the title column is mandatory.
//!
//! ## Page layout
//!
//! ```text
//! ┌ column_list ─────────────────────────────┐
//! │ ## Ingredientes      │ ## Preparación    │
//! │ • item               │ 1. step           │
//! └──────────────────────────────────────────┘
//! ## Notas
//! • note line
//! ```
//!
//! Alternatives become child pages of the recipe page with the same layout.
//!
//! ## Limits
//!
//! Notion caps a rich-text object at 2000 characters and a children array at
//! 100 blocks. Long text is split into several text objects; blocks beyond
//! the first 100 are appended with `PATCH /blocks/{id}/children`.

use crate::config::{RecipeConfig, SectionLabels, NOTION_VERSION};
use crate::error::{RecipeError, UploadError};
use crate::recipe::RecipeRecord;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Maximum characters in one rich-text object.
pub const MAX_TEXT_LEN: usize = 2000;

/// Maximum blocks in one children array.
pub const MAX_CHILDREN: usize = 100;

/// Notion page id as returned by the API.
pub type PageId = String;

/// Destination for normalised recipes.
#[async_trait]
pub trait RecipeSink: Send + Sync {
    /// Create the page (and its alternative sub-pages); returns the page id.
    async fn create_recipe(&self, record: &RecipeRecord) -> Result<PageId, UploadError>;
}

// ── Schema ───────────────────────────────────────────────────────────────

/// Column names and types of the target database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseSchema {
    columns: HashMap<String, String>,
}

impl DatabaseSchema {
    /// Parse the `properties` object of a `GET /databases/{id}` response.
    pub fn from_database(body: &Value) -> Self {
        let columns = body
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .filter_map(|(name, def)| {
                        def.get("type")
                            .and_then(Value::as_str)
                            .map(|kind| (name.clone(), kind.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { columns }
    }

    /// Build a schema from `(name, type)` pairs.
    pub fn from_columns<'a>(cols: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            columns: cols
                .into_iter()
                .map(|(n, k)| (n.to_string(), k.to_string()))
                .collect(),
        }
    }

    /// Whether a column `name` of type `kind` exists.
    pub fn has(&self, name: &str, kind: &str) -> bool {
        self.columns.get(name).is_some_and(|k| k == kind)
    }

    /// The column to write the title into.
    ///
    /// The preferred name wins when it is the title column; otherwise the
    /// database's actual title column is used. Falls back to the preferred
    /// name when the schema is empty.
    pub fn title_column<'a>(&'a self, preferred: &'a str) -> &'a str {
        if self.has(preferred, "title") {
            return preferred;
        }
        self.columns
            .iter()
            .find(|(_, kind)| kind.as_str() == "title")
            .map(|(name, _)| name.as_str())
            .unwrap_or(preferred)
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// [`RecipeSink`] writing into a Notion database over the REST API.
pub struct NotionClient {
    http: reqwest::Client,
    config: RecipeConfig,
    schema: OnceCell<DatabaseSchema>,
}

impl NotionClient {
    pub fn new(config: &RecipeConfig) -> Result<Self, RecipeError> {
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.notion_token))
            .map_err(|_| RecipeError::InvalidConfig("NOTION_TOKEN contains invalid characters".into()))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("Notion-Version", HeaderValue::from_static(NOTION_VERSION));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| RecipeError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            config: config.clone(),
            schema: OnceCell::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.notion_api_base.trim_end_matches('/'), path)
    }

    async fn schema(&self) -> Result<&DatabaseSchema, UploadError> {
        self.schema
            .get_or_try_init(|| async {
                let url = self.url(&format!("databases/{}", self.config.database_id));
                let body = send(self.http.get(url)).await?;
                let schema = DatabaseSchema::from_database(&body);
                debug!("Notion database has {} columns", schema.columns.len());
                Ok::<_, UploadError>(schema)
            })
            .await
    }

    async fn create_page(&self, mut body: Value) -> Result<PageId, UploadError> {
        let overflow = split_children(&mut body);
        let created = send(self.http.post(self.url("pages")).json(&body)).await?;
        let id = created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(UploadError::MissingPageId)?;

        // The page exists from here on; losing the tail must not lose the id.
        let pending = overflow.len();
        if let Err(e) = self.append_children(&id, overflow).await {
            warn!(
                "Page {} created but {} trailing blocks were not appended: {}",
                id, pending, e
            );
        }
        Ok(id)
    }

    async fn append_children(&self, block_id: &str, blocks: Vec<Value>) -> Result<(), UploadError> {
        for chunk in blocks.chunks(MAX_CHILDREN) {
            debug!("Appending {} blocks to {}", chunk.len(), block_id);
            let url = self.url(&format!("blocks/{block_id}/children"));
            send(self.http.patch(url).json(&json!({ "children": chunk }))).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecipeSink for NotionClient {
    async fn create_recipe(&self, record: &RecipeRecord) -> Result<PageId, UploadError> {
        let schema = self.schema().await?;
        let page_id = self
            .create_page(build_recipe_page(record, schema, &self.config))
            .await?;
        info!("Created Notion page '{}' ({})", record.title, page_id);

        // The recipe itself is already saved; a failed sub-page only loses that sub-page.
        for alt in &record.alternatives {
            match self
                .create_page(build_alternative_page(alt, &page_id, &self.config.labels))
                .await
            {
                Ok(child) => debug!("Created alternative '{}' ({}) under {}", alt.title, child, page_id),
                Err(e) => warn!("Alternative '{}' of '{}' not uploaded: {}", alt.title, record.title, e),
            }
        }
        Ok(page_id)
    }
}

/// Send a request and decode the JSON body, mapping failures to [`UploadError`].
async fn send(req: reqwest::RequestBuilder) -> Result<Value, UploadError> {
    let resp = req
        .send()
        .await
        .map_err(|e| UploadError::Transport(e.to_string()))?;
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| UploadError::Transport(e.to_string()))?;

    if !status.is_success() {
        return Err(classify_failure(status.as_u16(), &text));
    }
    serde_json::from_str(&text).map_err(|e| UploadError::Transport(format!("invalid JSON reply: {e}")))
}

/// Map a non-success Notion response to an [`UploadError`].
pub fn classify_failure(status: u16, body: &str) -> UploadError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let detail = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(300).collect());

    match status {
        401 | 403 => UploadError::Unauthorized { status, detail },
        400 if code == "validation_error" => UploadError::SchemaMismatch { detail },
        _ => UploadError::Rejected { status, detail },
    }
}

/// Remove children past the first [`MAX_CHILDREN`] from a page body.
fn split_children(body: &mut Value) -> Vec<Value> {
    match body.get_mut("children").and_then(Value::as_array_mut) {
        Some(children) if children.len() > MAX_CHILDREN => children.split_off(MAX_CHILDREN),
        _ => Vec::new(),
    }
}

// ── Mapping ──────────────────────────────────────────────────────────────

/// The full `POST /pages` body for a recipe, including every body block.
pub fn build_recipe_page(record: &RecipeRecord, schema: &DatabaseSchema, config: &RecipeConfig) -> Value {
    let names = &config.properties;
    let mut props = Map::new();

    props.insert(
        schema.title_column(&names.title).to_string(),
        json!({ "title": rich_text(&record.title) }),
    );
    if let Some(n) = record.servings {
        if schema.has(&names.servings, "number") {
            props.insert(names.servings.clone(), json!({ "number": n }));
        }
    }
    if schema.has(&names.vegetarian, "checkbox") {
        props.insert(names.vegetarian.clone(), json!({ "checkbox": record.vegetarian }));
    }
    if schema.has(&names.tags, "multi_select") {
        let tags: BTreeSet<String> = config
            .default_tags
            .iter()
            .chain(record.tags.iter())
            .map(|t| t.replace(',', " ").trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let options: Vec<Value> = tags.into_iter().map(|name| json!({ "name": name })).collect();
        props.insert(names.tags.clone(), json!({ "multi_select": options }));
    }

    json!({
        "parent": { "database_id": config.database_id },
        "icon": { "type": "emoji", "emoji": record.emoji },
        "properties": props,
        "children": recipe_blocks(record, &config.labels),
    })
}

/// Body for an alternative recipe nested under `parent_id`.
pub fn build_alternative_page(alt: &RecipeRecord, parent_id: &str, labels: &SectionLabels) -> Value {
    let mut summary = Vec::new();
    if let Some(n) = alt.servings {
        summary.push(format!("{}: {}", labels.servings, n));
    }
    summary.push(format!(
        "{}: {}",
        labels.vegetarian,
        if alt.vegetarian { "sí" } else { "no" }
    ));

    let mut children = vec![paragraph(&summary.join(" · "))];
    children.extend(recipe_blocks(alt, labels));

    json!({
        "parent": { "page_id": parent_id },
        "icon": { "type": "emoji", "emoji": alt.emoji },
        "properties": { "title": { "title": rich_text(&alt.title) } },
        "children": children,
    })
}

/// Body blocks for a recipe, in display order.
///
/// Ingredients and instructions sit side by side in two columns. A column
/// cannot be extended after creation without looking up its id, so very long
/// lists fall back to stacked sections instead.
pub fn recipe_blocks(record: &RecipeRecord, labels: &SectionLabels) -> Vec<Value> {
    let mut ingredients = vec![heading_2(&labels.ingredients)];
    ingredients.extend(record.ingredients.iter().map(|i| bulleted(i)));

    let mut instructions = vec![heading_2(&labels.instructions)];
    instructions.extend(record.instructions.iter().map(|s| numbered(s)));

    let mut blocks = Vec::new();
    if ingredients.len() <= MAX_CHILDREN && instructions.len() <= MAX_CHILDREN {
        blocks.push(json!({
            "object": "block",
            "type": "column_list",
            "column_list": {
                "children": [column(ingredients), column(instructions)]
            }
        }));
    } else {
        blocks.extend(ingredients);
        blocks.extend(instructions);
    }

    let notes: Vec<&str> = record.note_lines().collect();
    if !notes.is_empty() {
        blocks.push(heading_2(&labels.notes));
        blocks.extend(notes.into_iter().map(bulleted));
    }
    blocks
}

/// Split `content` into text objects of at most [`MAX_TEXT_LEN`] characters.
pub fn rich_text(content: &str) -> Vec<Value> {
    let chars: Vec<char> = content.chars().collect();
    chars
        .chunks(MAX_TEXT_LEN)
        .map(|chunk| {
            json!({
                "type": "text",
                "text": { "content": chunk.iter().collect::<String>() }
            })
        })
        .collect()
}

fn block(kind: &str, text: &str) -> Value {
    let mut b = json!({ "object": "block", "type": kind });
    b[kind] = json!({ "rich_text": rich_text(text) });
    b
}

fn heading_2(text: &str) -> Value {
    block("heading_2", text)
}

fn bulleted(text: &str) -> Value {
    block("bulleted_list_item", text)
}

fn numbered(text: &str) -> Value {
    block("numbered_list_item", text)
}

fn paragraph(text: &str) -> Value {
    block("paragraph", text)
}

fn column(children: Vec<Value>) -> Value {
    json!({
        "object": "block",
        "type": "column",
        "column": { "children": children }
    })
}
