//! Allow-list normalization and matching

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static SLUG_ILLEGAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9#@._+-]+").unwrap());
static DASH_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

/// Trim entries, drop empty ones and de-duplicate, keeping first occurrences in order
pub fn normalize_allow_list<I, S>(list: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    dedupe(
        list.into_iter()
            .map(|entry| entry.as_ref().trim().to_string())
            .filter(|entry| !entry.is_empty()),
    )
}

/// Like [`normalize_allow_list`], lowercased
pub fn normalize_allow_list_lower<I, S>(list: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    dedupe(
        normalize_allow_list(list)
            .into_iter()
            .map(|entry| entry.to_lowercase()),
    )
}

/// Turn a display name into a slack-style handle: `"Jane Doe!"` -> `"jane-doe"`
pub fn normalize_slug(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let dashed = WHITESPACE.replace_all(&lower, "-");
    let cleaned = SLUG_ILLEGAL.replace_all(&dashed, "");
    let collapsed = DASH_RUNS.replace_all(&cleaned, "-");
    collapsed.trim_matches('-').to_string()
}

/// Check a sender against a lowercase-normalized allow-list.
///
/// An empty list matches nothing and `*` matches everyone. Ids also match
/// their `slack:` and `user:` prefixed forms; names match verbatim, with a
/// `slack:` prefix, or as a slug.
pub fn allow_list_matches(allow_list: &[String], id: Option<&str>, name: Option<&str>) -> bool {
    if allow_list.is_empty() {
        return false;
    }
    if allow_list.iter().any(|entry| entry == "*") {
        return true;
    }

    let mut candidates = Vec::with_capacity(6);
    if let Some(id) = id.map(str::trim).filter(|s| !s.is_empty()) {
        let id = id.to_lowercase();
        candidates.push(format!("slack:{}", id));
        candidates.push(format!("user:{}", id));
        candidates.push(id);
    }
    if let Some(name) = name.map(str::trim).filter(|s| !s.is_empty()) {
        let name = name.to_lowercase();
        let slug = normalize_slug(&name);
        candidates.push(format!("slack:{}", name));
        candidates.push(name);
        if !slug.is_empty() {
            candidates.push(slug);
        }
    }

    candidates
        .iter()
        .any(|candidate| allow_list.iter().any(|entry| entry == candidate))
}

fn dedupe(entries: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    entries.filter(|entry| seen.insert(entry.clone())).collect()
}
