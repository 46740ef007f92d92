use std::path::Path;

use async_trait::async_trait;
use regex::Regex;

use crate::error::Result;

/// The fixed prompt sent to the vision adapter. Item 5 asks for a
/// machine-readable slug the pipeline can parse back out with
/// [`parse_slug`] for building the element's stored filename.
pub const VISION_DESCRIPTION_PROMPT: &str = "Describe this image for a chat canvas entry. \
    Cover: 1) what's depicted, 2) notable text if any, 3) mood/context, 4) relevant details, \
    5) Slug: a short lowercase-with-dashes filename-safe slug for this image.";

/// External collaborator for image description.
#[async_trait]
pub trait VisionDescriber: Send + Sync {
    /// Returns the full description text (including the trailing
    /// `5) Slug: ...` line) as produced by the adapter.
    async fn describe(&self, image_path: &Path) -> Result<String>;
}

/// Stand-in describer until a real vision backend is wired up.
pub struct NullVisionDescriber;

#[async_trait]
impl VisionDescriber for NullVisionDescriber {
    async fn describe(&self, _image_path: &Path) -> Result<String> {
        Ok("1) An image. 5) Slug: image".to_string())
    }
}

/// Extract the machine-readable slug from a vision response: first try the
/// `5) Slug: <value>` line, then fall back to the first two alphanumeric
/// words of the whole response, lowercased and hyphen-joined.
pub fn parse_slug(description: &str) -> String {
    let slug_line = Regex::new(r"(?mi)^\s*5\)\s*slug:\s*(.+)$").unwrap();
    if let Some(caps) = slug_line.captures(description) {
        let raw = caps[1].trim();
        let cleaned = sanitize_slug(raw);
        if !cleaned.is_empty() {
            return cleaned;
        }
    }

    let word_re = Regex::new(r"[A-Za-z0-9]+").unwrap();
    let words: Vec<String> = word_re
        .find_iter(description)
        .take(2)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    if words.is_empty() {
        "image".to_string()
    } else {
        words.join("-")
    }
}

fn sanitize_slug(raw: &str) -> String {
    let word_re = Regex::new(r"[A-Za-z0-9]+").unwrap();
    let words: Vec<String> = word_re.find_iter(raw).map(|m| m.as_str().to_lowercase()).collect();
    words.join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_slug_line() {
        let desc = "1) A cat. 2) none. 3) calm. 4) sitting.\n5) Slug: orange-tabby-cat";
        assert_eq!(parse_slug(desc), "orange-tabby-cat");
    }

    #[test]
    fn falls_back_to_first_two_words() {
        let desc = "A lovely sunset over the ocean.";
        assert_eq!(parse_slug(desc), "a-lovely");
    }

    #[test]
    fn falls_back_when_slug_line_has_no_alnum() {
        let desc = "Some description.\n5) Slug: ---";
        assert_eq!(parse_slug(desc), "some-description");
    }
}
