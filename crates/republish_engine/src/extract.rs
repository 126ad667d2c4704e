use chrono::{DateTime, FixedOffset, NaiveDate};
use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::fingerprint::content_fingerprint;

/// WeChat renders publish times in China Standard Time.
const WECHAT_UTC_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleBlock {
    Heading { level: u8, text: String },
    Paragraph(String),
    Image { url: String, alt: Option<String> },
}

/// Structured content of one source article, before translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArticle {
    pub source_url: String,
    pub title: String,
    pub author: String,
    pub date: NaiveDate,
    pub blocks: Vec<ArticleBlock>,
    pub fingerprint: String,
}

impl ExtractedArticle {
    /// Image URLs in order of first appearance.
    pub fn image_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for block in &self.blocks {
            if let ArticleBlock::Image { url, .. } = block {
                if !urls.contains(url) {
                    urls.push(url.clone());
                }
            }
        }
        urls
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("source url is not valid: {0}")]
    InvalidSourceUrl(String),
    #[error("document has no {0}")]
    MissingField(&'static str),
    #[error("could not parse publish date {0:?}")]
    InvalidDate(String),
    #[error("article body contains no text")]
    EmptyBody,
}

pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, source_url: &str) -> Result<ExtractedArticle, ExtractionError>;
}

/// Extractor for `mp.weixin.qq.com` article pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeChatExtractor;

impl Extractor for WeChatExtractor {
    fn extract(&self, html: &str, source_url: &str) -> Result<ExtractedArticle, ExtractionError> {
        let base = Url::parse(source_url)
            .map_err(|_| ExtractionError::InvalidSourceUrl(source_url.to_string()))?;
        let doc = Html::parse_document(html);

        let title = first_text(&doc, "#activity-name")
            .or_else(|| meta_content(&doc, r#"meta[property="og:title"]"#))
            .ok_or(ExtractionError::MissingField("title"))?;
        let author = first_text(&doc, "#js_author_name")
            .or_else(|| meta_content(&doc, r#"meta[name="author"]"#))
            .or_else(|| first_text(&doc, "#js_name"))
            .ok_or(ExtractionError::MissingField("author"))?;
        let date = extract_date(&doc, html)?;

        let body = select_first(&doc, "#js_content").ok_or(ExtractionError::MissingField("body"))?;
        let body_html = body.inner_html();

        let mut builder = BlockBuilder::new(base);
        builder.visit_children(body);
        let blocks = builder.finish();
        let has_text = blocks
            .iter()
            .any(|block| !matches!(block, ArticleBlock::Image { .. }));
        if !has_text {
            return Err(ExtractionError::EmptyBody);
        }

        let date_text = date.format("%Y-%m-%d").to_string();
        let fingerprint = content_fingerprint(&[&title, &author, &date_text, &body_html]);

        Ok(ExtractedArticle {
            source_url: source_url.to_string(),
            title,
            author,
            date,
            blocks,
            fingerprint,
        })
    }
}

fn select_first<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector).next()
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    select_first(doc, selector)
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|text| !text.is_empty())
}

fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    select_first(doc, selector)
        .and_then(|el| el.value().attr("content"))
        .map(collapse_whitespace)
        .filter(|text| !text.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Publish date from, in order: the visible `#publish_time`, the
/// `article:published_time` meta tag, or the `ct` timestamp in inline script.
fn extract_date(doc: &Html, raw_html: &str) -> Result<NaiveDate, ExtractionError> {
    if let Some(text) = first_text(doc, "#publish_time") {
        return parse_display_date(&text).ok_or(ExtractionError::InvalidDate(text));
    }
    if let Some(text) = meta_content(doc, r#"meta[property="article:published_time"]"#) {
        return parse_display_date(&text).ok_or(ExtractionError::InvalidDate(text));
    }
    if let Some(secs) = script_timestamp(raw_html) {
        let offset = FixedOffset::east_opt(WECHAT_UTC_OFFSET_SECS)
            .ok_or(ExtractionError::InvalidDate(secs.to_string()))?;
        return DateTime::from_timestamp(secs, 0)
            .map(|utc| utc.with_timezone(&offset).date_naive())
            .ok_or(ExtractionError::InvalidDate(secs.to_string()));
    }
    Err(ExtractionError::MissingField("publish date"))
}

fn parse_display_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Some(prefix) = text.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }
    let end = text.find('日')? + '日'.len_utf8();
    NaiveDate::parse_from_str(&text[..end], "%Y年%m月%d日").ok()
}

/// Reads `ct = "1705300000"` style assignments from inline script.
fn script_timestamp(html: &str) -> Option<i64> {
    let mut rest = html;
    while let Some(pos) = rest.find("ct") {
        let before = rest[..pos].chars().next_back();
        let after = rest[pos + 2..].trim_start();
        rest = &rest[pos + 2..];
        if before.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            continue;
        }
        let Some(value) = after.strip_prefix('=') else {
            continue;
        };
        let digits: String = value
            .trim_start()
            .trim_start_matches(['"', '\''].as_ref())
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        if let Ok(secs) = digits.parse::<i64>() {
            return Some(secs);
        }
    }
    None
}

/// Walks the article body and groups inline text into blocks.
struct BlockBuilder {
    base_url: Url,
    blocks: Vec<ArticleBlock>,
    current: String,
}

impl BlockBuilder {
    fn new(base_url: Url) -> Self {
        Self {
            base_url,
            blocks: Vec::new(),
            current: String::new(),
        }
    }

    fn finish(mut self) -> Vec<ArticleBlock> {
        self.flush_paragraph();
        self.blocks
    }

    fn visit_node(&mut self, node: NodeRef<'_, Node>) {
        match node.value() {
            Node::Text(text) => self.append_text(text),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(node) {
                    self.visit_element(element);
                }
            }
            _ => {
                for child in node.children() {
                    self.visit_node(child);
                }
            }
        }
    }

    fn visit_children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            self.visit_node(child);
        }
    }

    fn visit_element(&mut self, element: ElementRef<'_>) {
        let tag = element.value().name().to_ascii_lowercase();
        match tag.as_str() {
            "img" => self.handle_image(element),
            "br" | "hr" => self.flush_paragraph(),
            "li" => {
                self.flush_paragraph();
                self.current.push_str("- ");
                self.visit_children(element);
                self.flush_paragraph();
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush_paragraph();
                self.visit_children(element);
                let text = std::mem::take(&mut self.current).trim().to_string();
                if !text.is_empty() {
                    let level = tag[1..].parse().unwrap_or(2);
                    self.blocks.push(ArticleBlock::Heading { level, text });
                }
            }
            "p" | "div" | "section" | "blockquote" | "figure" | "figcaption" | "table" | "tr"
            | "ul" | "ol" | "pre" => {
                self.flush_paragraph();
                self.visit_children(element);
                self.flush_paragraph();
            }
            "script" | "style" | "noscript" | "iframe" | "template" | "svg" | "mpvoice"
            | "mpprofile" => {}
            _ => self.visit_children(element),
        }
    }

    fn handle_image(&mut self, element: ElementRef<'_>) {
        let attrs = element.value();
        let Some(url) = ["data-src", "src"]
            .iter()
            .filter_map(|name| attrs.attr(name))
            .find_map(|raw| resolve_image_url(raw, &self.base_url))
        else {
            return;
        };
        let alt = attrs
            .attr("alt")
            .map(collapse_whitespace)
            .filter(|alt| !alt.is_empty());
        self.flush_paragraph();
        self.blocks.push(ArticleBlock::Image {
            url: url.into(),
            alt,
        });
    }

    fn append_text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                if self.current.is_empty() || self.current.ends_with(' ') {
                    continue;
                }
                self.current.push(' ');
            } else {
                self.current.push(ch);
            }
        }
    }

    fn flush_paragraph(&mut self) {
        let text = std::mem::take(&mut self.current);
        let text = text.trim();
        if !text.is_empty() && text != "-" {
            self.blocks.push(ArticleBlock::Paragraph(text.to_string()));
        }
    }
}

fn resolve_image_url(reference: &str, base: &Url) -> Option<Url> {
    let trimmed = reference.trim();
    if trimmed.is_empty() || trimmed.to_ascii_lowercase().starts_with("data:") {
        return None;
    }
    let url = base.join(trimmed).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}
