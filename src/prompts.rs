//! Prompts sent to the vision and image models.
//!
//! Kept in one place so prompt changes never touch retry or mapping code, and
//! so tests can assert on the contract the normaliser relies on (a single JSON
//! object with the documented keys).

/// System prompt for extracting a recipe from a scanned page image.
///
/// The reply must be one JSON object; [`crate::pipeline::normalize`] tolerates
/// surrounding prose and fences but nothing else.
pub const EXTRACTION_PROMPT: &str = r#"Extract the recipe(s) from this image. The content is in Spanish and your output must preserve the original Spanish. Do not translate titles, ingredients or instructions.

There may be more than one recipe on the page. The one at the top is the main recipe. Sub-recipes (sauces, toppings, fillings) and variations go in "alternatives", each with the same fields as the main recipe.

If an ingredient has the quantity "C/N", replace it with "a gusto".

Reply with ONE JSON object and nothing else, using exactly these keys:

{
  "emoji": "one emoji that best represents the dish",
  "title": "recipe title",
  "servings": 4,
  "vegetarian": false,
  "tags": ["optional", "short", "tags"],
  "ingredients": ["one ingredient with its quantity per item"],
  "instructions": ["one sentence per item, in order"],
  "notes": ["handwritten notes at the bottom of the page, if any"],
  "alternatives": [
    {
      "title": "sub-recipe title",
      "servings": null,
      "vegetarian": false,
      "ingredients": [],
      "instructions": [],
      "notes": []
    }
  ]
}

Rules:
- "vegetarian" is true only if no ingredient contains meat, poultry or fish.
- Use null for servings when the page does not say.
- Use empty lists for missing sections. Never omit "title".
- Do NOT wrap the JSON in code fences and do NOT add commentary."#;

/// The base scene the image brief is built on.
pub const BASE_IMAGE_PROMPT: &str = "A wide-format, highly detailed, ultra-photorealistic image of a freshly prepared dish \
placed prominently in the center of a rustic wooden table. The dish is the clear focus, \
beautifully lit with soft natural light that enhances its color and texture. Surrounding \
it, in the background or off to the side, a few of the raw ingredients used in the recipe \
are arranged casually. The atmosphere is warm and natural, evoking the feeling of a cozy, \
artisanal kitchen. Don't include any text in the image.";

/// Build the request asking the text model to write a dish-specific image prompt.
pub fn illustration_brief_request(recipe_text: &str) -> String {
    format!(
        "I want you to write a prompt for a model that creates images. Reply with the prompt \
itself and nothing else. Start from this base prompt and fill it out with details about the dish:\n\n\
{BASE_IMAGE_PROMPT}\n\n\
Modify and complete the base prompt so it is faithful to the recipe below and to how the \
final dish would look once prepared. If the recipe has alternative dishes, use common sense \
to decide which one to focus on and whether any of them are side dishes to include.\n\n\
Here is the recipe:\n\n{recipe_text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_names_every_key() {
        for key in [
            "\"emoji\"",
            "\"title\"",
            "\"servings\"",
            "\"vegetarian\"",
            "\"tags\"",
            "\"ingredients\"",
            "\"instructions\"",
            "\"notes\"",
            "\"alternatives\"",
        ] {
            assert!(EXTRACTION_PROMPT.contains(key), "missing {key}");
        }
    }

    #[test]
    fn extraction_prompt_example_is_a_valid_recipe() {
        let record = crate::pipeline::normalize::normalize(EXTRACTION_PROMPT)
            .expect("the example object in the prompt normalises");
        assert_eq!(record.title, "recipe title");
        assert_eq!(record.alternatives.len(), 1);
    }

    #[test]
    fn brief_request_embeds_recipe_and_base() {
        let req = illustration_brief_request("Title: Flan");
        assert!(req.contains("Title: Flan"));
        assert!(req.contains(BASE_IMAGE_PROMPT));
    }
}
