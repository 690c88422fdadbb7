//! Lexical entity extraction.
//!
//! Runs on every message regardless of which classifier tier answered.

use std::sync::LazyLock;

use regex_lite::Regex;
use steward_core::intent::Entities;

static FILE_PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[/\\][\w\-./\\]+\.\w+").ok());
static URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).ok());
static NUMBER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").ok());
static AT_REFERENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"@[\w\-./\\]+").ok());
static PATH_LIKE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[/\\][a-zA-Z0-9_\-./\\]+").ok());

fn find_all(re: &LazyLock<Option<Regex>>, text: &str) -> Vec<String> {
    let Some(re) = re.as_ref() else {
        return Vec::new();
    };
    let mut found: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let s = m.as_str().trim_end_matches(['.', ',', ')']).to_string();
        if !found.contains(&s) {
            found.push(s);
        }
    }
    found
}

fn strip_urls(text: &str) -> String {
    match URL.as_ref() {
        Some(re) => re.replace_all(text, " ").into_owned(),
        None => text.to_string(),
    }
}

/// Extract file paths, URLs, numbers and `@` references.
pub fn extract(message: &str) -> Entities {
    let without_urls = strip_urls(message);
    Entities {
        file_paths: find_all(&FILE_PATH, &without_urls),
        urls: find_all(&URL, message),
        numbers: find_all(&NUMBER, &without_urls),
        at_references: find_all(&AT_REFERENCE, &without_urls),
    }
}

/// Path-like tokens (with or without extension), URLs excluded.
pub fn path_tokens(message: &str) -> Vec<String> {
    find_all(&PATH_LIKE, &strip_urls(message))
        .into_iter()
        .filter(|p| p.len() > 1)
        .collect()
}

/// Whether the last path segment carries an extension.
pub fn has_extension(path: &str) -> bool {
    let last = path.rsplit(['/', '\\']).next().unwrap_or(path);
    last.rfind('.').is_some_and(|i| i > 0 && i + 1 < last.len())
}
