//! Slug generation for articles and checklists

/// Build a URL slug from a title.
///
/// Lowercases, keeps ASCII alphanumerics and non-ASCII letters (Cyrillic
/// titles stay readable), turns everything else into single hyphens.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric()) {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Use the caller's slug when given, otherwise derive one from the title
pub fn slug_or_generate(slug: &str, title: &str) -> String {
    let trimmed = slug.trim();
    if trimmed.is_empty() {
        generate_slug(title)
    } else {
        generate_slug(trimmed)
    }
}
