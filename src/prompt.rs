//! Instruction text: decade presets and the fallback template.

use once_cell::sync::Lazy;
use regex::Regex;

/// Decades the photo booth renders for a full album.
pub const ALBUM_DECADES: [&str; 6] = ["1950s", "1960s", "1970s", "1980s", "1990s", "2000s"];

static DECADE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}s").expect("decade pattern is valid"));

/// First decade token ("1950s") in an instruction.
pub fn extract_decade(instruction: &str) -> Option<&str> {
    DECADE_TOKEN.find(instruction).map(|m| m.as_str())
}

/// Alternate instruction used once after the primary one is rejected.
pub fn fallback_prompt(decade: &str) -> String {
    format!(
        "Create a photograph of the person in this image as if they were living in the {decade}. \
         The photograph should capture the distinct fashion, hairstyles, and overall atmosphere \
         of that time period. Ensure the final image is a clear photograph that looks authentic \
         to the era."
    )
}

/// Stock photo-booth instruction for a decade.
pub fn decade_prompt(decade: &str) -> String {
    format!(
        "Reimagine the person in this photo in the style of the {decade}. \
         Change their clothing, hairstyle, photo quality and background to match the {decade}, \
         keeping their face recognisable. Return the generated image as a URL."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_decade() {
        assert_eq!(extract_decade("Make me look like the 1970s please"), Some("1970s"));
        assert_eq!(extract_decade("1950s then 1960s"), Some("1950s"));
        assert_eq!(extract_decade("a watercolor portrait"), None);
        assert_eq!(extract_decade("the '70s"), None);
        assert_eq!(extract_decade("year 1970"), None);
    }

    #[test]
    fn test_fallback_mentions_only_decade() {
        let prompt = fallback_prompt("1980s");
        assert!(prompt.contains("living in the 1980s."));
        assert_eq!(extract_decade(&prompt), Some("1980s"));
    }

    #[test]
    fn test_album_prompts_carry_their_decade() {
        for decade in ALBUM_DECADES {
            assert_eq!(extract_decade(&decade_prompt(decade)), Some(decade));
        }
    }
}
