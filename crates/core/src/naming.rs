//! Output filename derivation.
//!
//! The video-combine node is given a filename prefix derived from the
//! prompt so that artifacts on disk are recognizable and the prefix
//! search tier of artifact discovery has something to match on.

use std::sync::LazyLock;

use regex::Regex;

/// Characters that are illegal or hazardous in filenames.
static ILLEGAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Maximum length of the sanitized prompt portion.
const MAX_PROMPT_LEN: usize = 50;

/// Suffix identifying image-to-video outputs.
const PREFIX_SUFFIX: &str = "_I2V";

/// Turn a prompt into a safe filename fragment.
///
/// Strips illegal characters, collapses whitespace runs to `_`, and
/// truncates to 50 characters. An empty or whitespace-only prompt
/// becomes `no_prompt`.
pub fn sanitize_prompt(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return "no_prompt".to_string();
    }

    let stripped = ILLEGAL_CHARS.replace_all(trimmed, "");
    let joined = WHITESPACE.replace_all(&stripped, "_");
    joined.chars().take(MAX_PROMPT_LEN).collect()
}

/// Filename prefix handed to the video-combine node.
pub fn filename_prefix(prompt: &str) -> String {
    format!("{}{}", sanitize_prompt(prompt), PREFIX_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_prompt_passes_through() {
        assert_eq!(sanitize_prompt("a cat dancing"), "a_cat_dancing");
    }

    #[test]
    fn illegal_characters_stripped() {
        assert_eq!(sanitize_prompt(r#"a/b\c:d*e?f"g<h>i|j"#), "abcdefghij");
    }

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(sanitize_prompt("a   cat\t\tdancing"), "a_cat_dancing");
    }

    #[test]
    fn long_prompt_truncated() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_prompt(&long).len(), 50);
    }

    #[test]
    fn empty_prompt_falls_back() {
        assert_eq!(sanitize_prompt(""), "no_prompt");
        assert_eq!(sanitize_prompt("   "), "no_prompt");
    }

    #[test]
    fn prefix_gets_suffix() {
        assert_eq!(filename_prefix("a cat"), "a_cat_I2V");
        assert_eq!(filename_prefix(""), "no_prompt_I2V");
    }
}
