use crate::error::CoreError;

/// Normalizes a task identifier into a URL-safe slug.
///
/// The input is trimmed and lowercased, and every run of characters outside
/// `[a-z0-9]` collapses into a single `-`. The same input always yields the
/// same slug, which is what lets an update round find the repository created
/// by round 1.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut in_separator = false;

    for ch in input.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            in_separator = false;
        } else if !in_separator {
            slug.push('-');
            in_separator = true;
        }
    }

    slug
}

/// Hosting repository name for a task.
pub fn artifact_name(task: &str) -> Result<String, CoreError> {
    let slug = slugify(task);
    if !slug.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(CoreError::InvalidTaskIdentifier(task.to_string()));
    }
    Ok(slug)
}
