//! The structured recipe produced by normalisation and consumed by the
//! uploader and the illustrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Icon used when the model does not pick an emoji.
pub const DEFAULT_EMOJI: &str = "🍽️";

/// Alternatives nest at most this deep below the primary recipe.
pub const MAX_ALTERNATIVE_DEPTH: usize = 1;

/// One recipe as extracted from a page.
///
/// Built by [`crate::pipeline::normalize::normalize`]; `title` is never empty
/// and `emoji` always holds something printable. Optional data is represented
/// by empty collections, an empty `notes` string or `servings: None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeRecord {
    pub title: String,
    pub emoji: String,
    pub servings: Option<u32>,
    pub vegetarian: bool,
    pub tags: BTreeSet<String>,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    pub notes: String,
    /// Sub-recipes printed on the same page (sauces, toppings, variations).
    pub alternatives: Vec<RecipeRecord>,
}

impl RecipeRecord {
    /// A record with the given title and every other field at its default.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            emoji: DEFAULT_EMOJI.to_string(),
            servings: None,
            vegetarian: false,
            tags: BTreeSet::new(),
            ingredients: Vec::new(),
            instructions: Vec::new(),
            notes: String::new(),
            alternatives: Vec::new(),
        }
    }

    /// Non-empty note lines, in order.
    pub fn note_lines(&self) -> impl Iterator<Item = &str> {
        self.notes.lines().map(str::trim).filter(|l| !l.is_empty())
    }

    /// Plain-text rendering used as context for the illustration prompt.
    ///
    /// Follows the `Title:` / `Ingredients:` layout the image brief was tuned on.
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();
        self.write_prompt_text(&mut out);
        if !self.alternatives.is_empty() {
            out.push_str("\nAlternative Recipes:\n");
            for (i, alt) in self.alternatives.iter().enumerate() {
                let _ = writeln!(out, "{}.", i + 1);
                alt.write_prompt_text(&mut out);
            }
        }
        out
    }

    fn write_prompt_text(&self, out: &mut String) {
        let _ = writeln!(out, "Title: {}", self.title);
        if let Some(n) = self.servings {
            let _ = writeln!(out, "Portions: {n}");
        }
        let _ = writeln!(
            out,
            "Vegetarian: {}",
            if self.vegetarian { "yes" } else { "no" }
        );
        out.push_str("Ingredients:\n");
        for item in &self.ingredients {
            let _ = writeln!(out, "- {item}");
        }
        out.push_str("Instructions:\n");
        for step in &self.instructions {
            let _ = writeln!(out, "- {step}");
        }
        if !self.notes.is_empty() {
            out.push_str("Notes:\n");
            for note in self.note_lines() {
                let _ = writeln!(out, "- {note}");
            }
        }
    }
}
