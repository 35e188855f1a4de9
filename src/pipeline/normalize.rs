//! Normalisation: raw model output → validated [`RecipeRecord`].
//!
//! The vision model is asked for a single JSON object, but replies still
//! arrive wrapped in code fences or framed by a sentence of prose. This stage
//! locates the object, deserialises it into a tolerant typed payload, applies
//! the defaulting rules and cleans every string.
//!
//! ## Steps
//!
//! 1. Strip an outer ```` ```json ```` fence, then scan for the first balanced
//!    `{ … }` that parses as JSON. Braces inside strings are ignored.
//! 2. Deserialise into [`RawRecipe`], then coerce each optional field on its
//!    own. Untagged enums cover fields models emit in more than one shape; a
//!    field of the wrong type is logged and defaulted.
//! 3. Require a non-blank `title`.
//! 4. Clean text (line endings, invisible characters, NBSP, runs of blanks).
//!    Encoding artefacts are left alone rather than guessed at.
//! 5. Normalise alternatives one level deep. A bad alternative is logged and
//!    dropped; the primary recipe still succeeds.

use crate::error::ParseError;
use crate::recipe::{RecipeRecord, DEFAULT_EMOJI, MAX_ALTERNATIVE_DEPTH};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// A normalised record plus the alternatives that had to be discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub record: RecipeRecord,
    pub dropped: Vec<DroppedAlternative>,
}

/// An alternative recipe rejected during normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedAlternative {
    /// 0-based position in the payload's `alternatives` list.
    pub index: usize,
    pub reason: ParseError,
}

/// Normalise raw model output into a [`RecipeRecord`].
///
/// Fails with [`ParseError`] when no JSON object can be located or when the
/// object has no usable title. Optional fields of the wrong type fall back to
/// their defaults.
pub fn normalize(raw: &str) -> Result<RecipeRecord, ParseError> {
    normalize_detailed(raw).map(|n| n.record)
}

/// Like [`normalize`], also reporting dropped alternatives.
pub fn normalize_detailed(raw: &str) -> Result<Normalized, ParseError> {
    let object = locate_json_object(raw)?;
    normalize_value(Value::Object(object), 0)
}

// ── Step 1: locate the JSON object ──────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fence(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => trimmed,
    }
}

/// Find the first balanced `{ … }` in `raw` that parses as a JSON object.
///
/// A balanced candidate that fails to parse is skipped as a whole, so a valid
/// object nested inside a malformed one is never mistaken for the payload. An
/// unbalanced `{` is skipped on its own.
pub fn locate_json_object(raw: &str) -> Result<Map<String, Value>, ParseError> {
    let text = strip_code_fence(raw);
    let mut first_error: Option<String> = None;
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find('{') {
        let start = cursor + offset;
        let Some(len) = balanced_object_len(&text[start..]) else {
            cursor = start + 1;
            continue;
        };
        let candidate = &text[start..start + len];
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Object(map)) => {
                debug!("Located JSON object at byte {} ({} bytes)", start, len);
                return Ok(map);
            }
            Ok(_) => {}
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
        cursor = start + len;
    }

    match first_error {
        Some(detail) => Err(ParseError::InvalidJson { detail }),
        None => Err(ParseError::NoJsonObject),
    }
}

/// Byte length of the object starting at `s[0] == '{'`, or `None` if unbalanced.
fn balanced_object_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

// ── Step 2: typed payload ───────────────────────────────────────────────────

/// Field-by-field view of the payload. Only `title` can fail the record; every
/// other field is kept as raw JSON and coerced on its own.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRecipe {
    #[serde(alias = "name", alias = "titulo", alias = "título")]
    title: Option<Value>,
    emoji: Option<Value>,
    #[serde(alias = "portions", alias = "porciones")]
    servings: Option<Value>,
    #[serde(alias = "vegetariano")]
    vegetarian: Option<Value>,
    tags: Option<Value>,
    #[serde(alias = "ingredientes")]
    ingredients: Option<Value>,
    #[serde(alias = "steps", alias = "preparacion", alias = "preparación")]
    instructions: Option<Value>,
    #[serde(alias = "notas")]
    notes: Option<Value>,
    #[serde(alias = "alternative_recipes")]
    alternatives: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Servings {
    Count(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextList {
    Items(Vec<Value>),
    Text(String),
}

/// Coerce an optional field, falling back to `None` with a warning when the
/// model sent a shape we cannot use.
fn lenient<T: DeserializeOwned>(field: &str, value: Option<Value>) -> Option<T> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!(field, value = %v, "Ignoring field with unexpected type");
                None
            }
        },
    }
}

static RE_FIRST_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

impl Servings {
    fn count(self) -> Option<u32> {
        match self {
            Servings::Count(n) if n.is_finite() && n >= 1.0 && n <= u32::MAX as f64 => {
                Some(n.trunc() as u32)
            }
            Servings::Count(_) => None,
            Servings::Text(s) => RE_FIRST_INT
                .find(&s)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .filter(|n| *n > 0),
        }
    }
}

impl Flag {
    fn is_set(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Number(n) => n != 0.0,
            Flag::Text(s) => {
                let lowered = s.trim().to_lowercase();
                let word = lowered
                    .split(|c: char| !c.is_alphanumeric())
                    .find(|w| !w.is_empty())
                    .unwrap_or("");
                matches!(
                    word,
                    "yes" | "y" | "si" | "sí" | "true" | "1" | "vegetarian" | "vegetariano" | "vegetariana"
                )
            }
        }
    }
}

/// How a free-text value is split into items.
#[derive(Clone, Copy)]
enum Split {
    Lines,
    Commas,
}

impl TextList {
    /// Non-text entries (nested lists or objects) are skipped with a warning.
    fn into_items(self, field: &str, split: Split) -> Vec<String> {
        let raw_items: Vec<String> = match self {
            TextList::Text(s) => match split {
                Split::Lines => normalise_line_endings(&s).lines().map(str::to_string).collect(),
                Split::Commas => s.split(',').map(str::to_string).collect(),
            },
            TextList::Items(values) => values
                .into_iter()
                .enumerate()
                .filter_map(|(i, v)| match v {
                    Value::Null => None,
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    Value::Array(_) | Value::Object(_) => {
                        warn!(field, index = i, "Skipping list entry that is not text");
                        None
                    }
                })
                .collect(),
        };

        raw_items
            .iter()
            .map(|item| strip_bullet(&clean_line(item)).to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

fn text_items(field: &str, value: Option<Value>, split: Split) -> Vec<String> {
    lenient::<TextList>(field, value)
        .map(|list| list.into_items(field, split))
        .unwrap_or_default()
}

// ── Steps 3–5: validation, defaults, alternatives ───────────────────────────

fn normalize_value(value: Value, depth: usize) -> Result<Normalized, ParseError> {
    let raw: RawRecipe = serde_json::from_value(value).map_err(|e| ParseError::Schema {
        detail: e.to_string(),
    })?;

    let title = match raw.title {
        None | Some(Value::Null) => return Err(ParseError::MissingTitle),
        Some(Value::String(t)) => Some(clean_line(&t))
            .filter(|t| !t.is_empty())
            .ok_or(ParseError::MissingTitle)?,
        Some(other) => {
            return Err(ParseError::Schema {
                detail: format!("title must be text, got {other}"),
            })
        }
    };

    let emoji = lenient::<String>("emoji", raw.emoji)
        .map(|e| clean_line(&e))
        .and_then(|e| e.split_whitespace().next().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_EMOJI.to_string());

    let ingredients = text_items("ingredients", raw.ingredients, Split::Lines)
        .into_iter()
        .map(|item| apply_to_taste(&item))
        .collect();
    let instructions = text_items("instructions", raw.instructions, Split::Lines);
    let notes = text_items("notes", raw.notes, Split::Lines).join("\n");
    let tags: BTreeSet<String> = text_items("tags", raw.tags, Split::Commas)
        .into_iter()
        .collect();

    let mut record = RecipeRecord {
        title,
        emoji,
        servings: lenient::<Servings>("servings", raw.servings).and_then(Servings::count),
        vegetarian: lenient::<Flag>("vegetarian", raw.vegetarian)
            .map(Flag::is_set)
            .unwrap_or(false),
        tags,
        ingredients,
        instructions,
        notes,
        alternatives: Vec::new(),
    };

    let mut dropped = Vec::new();
    let alternatives = alternative_values(raw.alternatives);

    if depth >= MAX_ALTERNATIVE_DEPTH {
        if !alternatives.is_empty() {
            warn!(
                recipe = %record.title,
                count = alternatives.len(),
                "Ignoring alternatives nested below an alternative recipe"
            );
        }
    } else {
        for (index, alt) in alternatives.into_iter().enumerate() {
            match normalize_value(alt, depth + 1) {
                Ok(n) => record.alternatives.push(n.record),
                Err(reason) => {
                    warn!(
                        recipe = %record.title,
                        index,
                        "Dropping alternative recipe: {}",
                        reason
                    );
                    dropped.push(DroppedAlternative { index, reason });
                }
            }
        }
    }

    Ok(Normalized { record, dropped })
}

/// A lone object counts as one alternative; any other non-list value is a
/// single unusable entry and gets dropped downstream.
fn alternative_values(value: Option<Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    }
}

// ── Text cleanup rules ──────────────────────────────────────────────────────

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static RE_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*•·–]|\d{1,2}[.)])\s+").unwrap());
static RE_TO_TASTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bC\s*/\s*N\b").unwrap());

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

/// Deterministic cleanup applied to every multi-line string.
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s).replace(['\u{00A0}', '\u{202F}'], " ");
    s.lines()
        .map(|line| RE_BLANK_RUN.replace_all(line, " ").trim().to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// [`clean_text`] folded onto a single line.
pub fn clean_line(input: &str) -> String {
    let s = clean_text(input).replace('\n', " ");
    RE_BLANK_RUN.replace_all(&s, " ").into_owned()
}

fn strip_bullet(item: &str) -> &str {
    match RE_BULLET.find(item) {
        Some(m) => item[m.end()..].trim_start(),
        None => item,
    }
}

/// Scanned cookbooks write "C/N" (cantidad necesaria) for unmeasured amounts.
fn apply_to_taste(ingredient: &str) -> String {
    RE_TO_TASTE.replace_all(ingredient, "a gusto").into_owned()
}

// ── Tests ────────────────────────────────────────────────────────────────────
