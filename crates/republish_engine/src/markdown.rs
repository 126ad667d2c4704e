//! Artifact rendering. Pure text assembly: the same inputs always produce the
//! same bytes.

use std::fmt::Write;

use crate::extract::ArticleBlock;
use crate::images::ImageMap;
use crate::translate::TranslatedArticle;

pub const MAX_EXCERPT_CHARS: usize = 160;
const ELLIPSIS: &str = "...";

/// Header fields that do not come from the article itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactMeta {
    pub tags: Vec<String>,
}

pub fn render_artifact(
    article: &TranslatedArticle,
    images: &ImageMap,
    meta: &ArtifactMeta,
) -> String {
    let image_paths: Vec<String> = images
        .assets()
        .iter()
        .map(|asset| asset.local_path.clone())
        .collect();

    let mut out = String::from("---\n");
    scalar(&mut out, "title", &article.title);
    scalar(&mut out, "originalTitle", &article.original_title);
    scalar(&mut out, "date", &article.date.format("%Y-%m-%d").to_string());
    scalar(&mut out, "author", &article.author);
    scalar(&mut out, "excerpt", &excerpt(&article.blocks));
    scalar(&mut out, "originalUrl", &article.source_url);
    list(&mut out, "images", &image_paths);
    list(&mut out, "tags", &meta.tags);
    out.push_str("---\n\n");

    let body: Vec<String> = article
        .blocks
        .iter()
        .map(|block| render_block(block, images))
        .collect();
    out.push_str(&body.join("\n\n"));
    out.push('\n');
    out
}

fn render_block(block: &ArticleBlock, images: &ImageMap) -> String {
    match block {
        ArticleBlock::Heading { level, text } => {
            format!("{} {}", "#".repeat(usize::from((*level).clamp(1, 6))), text)
        }
        ArticleBlock::Paragraph(text) => text.clone(),
        ArticleBlock::Image { url, alt } => {
            let target = images.get(url).unwrap_or(url.as_str());
            let alt = alt.as_deref().unwrap_or_default().replace(']', "\\]");
            format!("![{alt}]({target})")
        }
    }
}

/// First paragraph, cut at [`MAX_EXCERPT_CHARS`] characters.
pub fn excerpt(blocks: &[ArticleBlock]) -> String {
    let Some(first) = blocks.iter().find_map(|block| match block {
        ArticleBlock::Paragraph(text) if !text.trim().is_empty() => Some(text.trim()),
        _ => None,
    }) else {
        return String::new();
    };
    match first.char_indices().nth(MAX_EXCERPT_CHARS) {
        None => first.to_string(),
        Some((end, _)) => format!("{}{ELLIPSIS}", first[..end].trim_end()),
    }
}

fn scalar(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "{key}: {}", quote(value));
}

fn list(out: &mut String, key: &str, values: &[String]) {
    if values.is_empty() {
        let _ = writeln!(out, "{key}: []");
        return;
    }
    let _ = writeln!(out, "{key}:");
    for value in values {
        let _ = writeln!(out, "  - {}", quote(value));
    }
}

/// Double-quoted scalar; JSON string escaping is valid YAML.
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_escapes_yaml_sensitive_characters() {
        assert_eq!(quote("a: \"b\"\nc"), r#""a: \"b\"\nc""#);
    }

    #[test]
    fn excerpt_skips_headings_and_truncates_on_char_boundary() {
        let long = "字".repeat(MAX_EXCERPT_CHARS + 5);
        let blocks = vec![
            ArticleBlock::Heading {
                level: 2,
                text: "Intro".into(),
            },
            ArticleBlock::Paragraph(long),
        ];
        let text = excerpt(&blocks);
        assert!(text.ends_with(ELLIPSIS));
        assert_eq!(text.chars().count(), MAX_EXCERPT_CHARS + ELLIPSIS.len());
    }

    #[test]
    fn short_excerpt_is_kept_whole() {
        let blocks = vec![ArticleBlock::Paragraph("Short.".into())];
        assert_eq!(excerpt(&blocks), "Short.");
        assert_eq!(excerpt(&[]), "");
    }
}
