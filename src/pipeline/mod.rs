//! Per-page pipeline stages, from PDF to validated recipe.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the network-bound stage can be swapped for a fake.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ extract ──▶ normalize
//! (paths)   (pdfium)   (base64)   (vision)    (JSON → RecipeRecord)
//! ```
//!
//! 1. [`input`]     — expand the CLI argument into an ordered list of PDFs
//! 2. [`render`]    — rasterise one page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]    — PNG-encode and base64-wrap the page for the request body
//! 4. [`extract`]   — call the vision model with retry/backoff and a timeout
//! 5. [`normalize`] — locate, parse and clean the model's JSON reply

pub mod encode;
pub mod extract;
pub mod input;
pub mod normalize;
pub mod render;
