use chrono::NaiveDate;

use crate::fingerprint::short_hash;

const MAX_SLUG_LEN: usize = 80;
const URL_HASH_LEN: usize = 8;

/// Lowercase ASCII slug: alphanumerics kept, every other run of characters
/// becomes a single `-`. Empty when the title has no ASCII alphanumerics.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut prev_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            slug.push('-');
            prev_dash = true;
        }
    }
    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
    }
    slug.trim_end_matches('-').to_string()
}

/// `{posts_dir}/{YYYY-MM-DD}-{slug}.md`, relative to the content root.
///
/// A title without a usable slug falls back to a hash of the source URL.
pub fn artifact_path(posts_dir: &str, date: NaiveDate, title: &str, source_url: &str) -> String {
    let mut slug = slugify(title);
    if slug.is_empty() {
        slug = url_hash(source_url);
    }
    join(posts_dir, &format!("{}-{}.md", date.format("%Y-%m-%d"), slug))
}

/// Variant of [`artifact_path`] used when another article already owns the
/// plain path.
pub fn disambiguated_path(path: &str, source_url: &str) -> String {
    let stem = path.strip_suffix(".md").unwrap_or(path);
    format!("{stem}-{}.md", url_hash(source_url))
}

fn url_hash(source_url: &str) -> String {
    short_hash(source_url.as_bytes(), URL_HASH_LEN)
}

fn join(dir: &str, file: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        file.to_string()
    } else {
        format!("{dir}/{file}")
    }
}
