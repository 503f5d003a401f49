//! Output cleaning: strip model-internal markers from OCR text.
//!
//! Grounded modes emit `<|ref|>` and `<|det|>` marker tags around recognised
//! regions. They are internal to the model's grounding format and must not
//! leak into the returned text; HTML tables and all other content are
//! preserved untouched.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_MARKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\|(?:ref|det)\|>").unwrap());

/// Remove marker tags and surrounding whitespace from raw model output.
pub fn clean_output(text: &str) -> String {
    RE_MARKERS.replace_all(text, "").trim().to_string()
}
