/// Store slug helpers
///
/// Slugs are lowercase `a-z0-9-` with collapsed separators, followed by a
/// short random hex suffix.

const MAX_BASE_LEN: usize = 48;
const FALLBACK_BASE: &str = "store";
const SUFFIX_LEN: usize = 8;

/// Normalize a display name into a slug base
pub fn slugify(input: &str) -> String {
    let mut slug = String::new();
    let mut prev_dash = false;
    for ch in input.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }

    let truncated: String = slug.trim_matches('-').chars().take(MAX_BASE_LEN).collect();
    let normalized = truncated.trim_end_matches('-');
    if normalized.is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        normalized.to_string()
    }
}

/// Random lowercase hex suffix
pub fn random_suffix() -> String {
    let mut suffix = uuid::Uuid::new_v4().simple().to_string();
    suffix.truncate(SUFFIX_LEN);
    suffix
}

/// Slug for a new store: normalized base plus `-{suffix}`
pub fn store_slug(name: &str, suffix: &str) -> String {
    format!("{}-{}", slugify(name), suffix)
}
