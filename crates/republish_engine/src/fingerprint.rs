//! Content fingerprints for change detection.
//!
//! Normalisation is deliberately narrow: HTML comments are removed, runs of
//! whitespace collapse to a single space, and whitespace between two tags is
//! dropped. Any other difference, including attribute or markup changes,
//! produces a new fingerprint.

use std::fmt::Write;

use sha2::{Digest, Sha256};

const FIELD_SEPARATOR: u8 = 0x1f;

/// SHA-256 (lowercase hex) over the normalised fields, in order.
pub fn content_fingerprint(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            hasher.update([FIELD_SEPARATOR]);
        }
        hasher.update(normalize_html(field).as_bytes());
    }
    to_hex(&hasher.finalize())
}

pub fn normalize_html(input: &str) -> String {
    let without_comments = strip_comments(input);
    let mut out = String::with_capacity(without_comments.len());
    let mut pending_space = false;
    for ch in without_comments.chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            let between_tags = out.ends_with('>') && ch == '<';
            if !out.is_empty() && !between_tags {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("<!--") {
        out.push_str(&rest[..start]);
        match rest[start + 4..].find("-->") {
            Some(end) => rest = &rest[start + 4 + end + 3..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

/// First `len` hex characters of the SHA-256 of `input`.
pub fn short_hash(input: &[u8], len: usize) -> String {
    let digest = Sha256::digest(input);
    let mut hex = to_hex(&digest);
    hex.truncate(len);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_and_comments_do_not_matter() {
        let a = "<p>Hello   world</p>\n  <p>Second</p>";
        let b = "<p>Hello world</p><!-- rendered at 12:00 --><p>Second</p>";
        assert_eq!(content_fingerprint(&[a]), content_fingerprint(&[b]));
    }

    #[test]
    fn text_changes_do_matter() {
        let a = "<p>Hello world</p>";
        let b = "<p>Hello, world</p>";
        assert_ne!(content_fingerprint(&[a]), content_fingerprint(&[b]));
    }

    #[test]
    fn field_boundaries_are_significant() {
        assert_ne!(
            content_fingerprint(&["ab", "c"]),
            content_fingerprint(&["a", "bc"])
        );
    }

    #[test]
    fn unterminated_comment_drops_the_tail() {
        assert_eq!(normalize_html("<p>a</p><!-- open"), "<p>a</p>");
    }

    #[test]
    fn whitespace_between_tags_is_dropped() {
        assert_eq!(
            normalize_html("<span>a</span> <b>b</b>"),
            "<span>a</span><b>b</b>"
        );
        assert_eq!(normalize_html("  one \n two  "), "one two");
    }
}
