use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use engine_logging::{engine_debug, engine_warn};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

use crate::extract::{ArticleBlock, ExtractedArticle};
use crate::glossary::Glossary;
use crate::retry::{with_retry, IsRetryable, RetryPolicy};

const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// External machine translation: text in, text out, glossary-agnostic.
#[async_trait::async_trait]
pub trait TranslationService: Send + Sync {
    /// Largest input, in characters, accepted by one call.
    fn max_chars(&self) -> usize;

    async fn translate(&self, text: &str) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("translation request timed out")]
    Timeout,
    #[error("translation service rate limited the request")]
    RateLimited,
    #[error("translation service returned http status {0}")]
    HttpStatus(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid translation response: {0}")]
    InvalidResponse(String),
}

impl IsRetryable for ServiceError {
    fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Timeout | ServiceError::RateLimited | ServiceError::Network(_) => true,
            ServiceError::HttpStatus(code) => (500..600).contains(code),
            ServiceError::InvalidResponse(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    #[error("segment {segment} contains a {len}-character sentence, over the {limit}-character limit")]
    SegmentTooLong {
        segment: usize,
        len: usize,
        limit: usize,
    },
    #[error("chunk {index}/{total} failed: {reason}")]
    ChunkFailed {
        index: usize,
        total: usize,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct TranslatorSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub max_chars_per_call: usize,
    pub request_timeout: Duration,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000/translate".to_string(),
            api_key: None,
            source_lang: "zh".to_string(),
            target_lang: "en".to_string(),
            max_chars_per_call: 4500,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// LibreTranslate-compatible JSON API client.
pub struct LibreTranslateService {
    client: reqwest::Client,
    settings: TranslatorSettings,
}

#[derive(Serialize)]
struct LibreRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Deserialize)]
struct LibreResponse {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

impl LibreTranslateService {
    pub fn new(settings: TranslatorSettings) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ServiceError::Network(err.to_string()))?;
        Ok(Self { client, settings })
    }
}

#[async_trait::async_trait]
impl TranslationService for LibreTranslateService {
    fn max_chars(&self) -> usize {
        self.settings.max_chars_per_call
    }

    async fn translate(&self, text: &str) -> Result<String, ServiceError> {
        let request = LibreRequest {
            q: text,
            source: &self.settings.source_lang,
            target: &self.settings.target_lang,
            format: "text",
            api_key: self.settings.api_key.as_deref(),
        };
        let body = serde_json::to_vec(&request)
            .map_err(|err| ServiceError::InvalidResponse(err.to_string()))?;

        let response = self
            .client
            .post(&self.settings.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ServiceError::RateLimited);
        }
        if !status.is_success() {
            return Err(ServiceError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let parsed: LibreResponse = serde_json::from_slice(&bytes)
            .map_err(|err| ServiceError::InvalidResponse(err.to_string()))?;
        Ok(parsed.translated_text)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Network(err.to_string())
    }
}

/// Part of one segment; a segment is only split when it exceeds the limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub segment: usize,
    pub text: String,
}

/// Pieces sent together in one service call, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub pieces: Vec<Piece>,
}

impl Chunk {
    fn text(&self) -> String {
        self.pieces
            .iter()
            .map(|piece| piece.text.as_str())
            .collect::<Vec<_>>()
            .join(PARAGRAPH_SEPARATOR)
    }
}

/// Groups segments into chunks of at most `limit` characters.
///
/// A segment spans chunks only when it is itself too long, in which case it
/// is split after sentence terminators. A single sentence over the limit is
/// an error.
pub fn plan_chunks(segments: &[String], limit: usize) -> Result<Vec<Chunk>, TranslationError> {
    let limit = limit.max(1);
    let separator_len = PARAGRAPH_SEPARATOR.chars().count();
    let mut chunks = Vec::new();
    let mut current: Vec<Piece> = Vec::new();
    let mut current_len = 0;

    for (segment, text) in segments.iter().enumerate() {
        for piece_text in split_segment(segment, text, limit)? {
            let len = piece_text.chars().count();
            let needed = if current.is_empty() {
                len
            } else {
                current_len + separator_len + len
            };
            if needed > limit && !current.is_empty() {
                chunks.push(Chunk {
                    pieces: std::mem::take(&mut current),
                });
                current_len = len;
            } else {
                current_len = needed;
            }
            current.push(Piece {
                segment,
                text: piece_text,
            });
        }
    }
    if !current.is_empty() {
        chunks.push(Chunk { pieces: current });
    }
    Ok(chunks)
}

fn split_segment(segment: usize, text: &str, limit: usize) -> Result<Vec<String>, TranslationError> {
    let text = text.replace('\n', " ");
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    if text.chars().count() <= limit {
        return Ok(vec![text.to_string()]);
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for sentence in sentences(text) {
        let len = sentence.chars().count();
        if len > limit {
            return Err(TranslationError::SegmentTooLong {
                segment,
                len,
                limit,
            });
        }
        if current.chars().count() + len > limit {
            pieces.push(std::mem::take(&mut current).trim().to_string());
        }
        current.push_str(sentence);
    }
    if !current.trim().is_empty() {
        pieces.push(current.trim().to_string());
    }
    Ok(pieces)
}

/// Splits after `。！？` and after `.!?` followed by whitespace. Each sentence
/// keeps its terminator and trailing whitespace.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut iter = text.char_indices().peekable();
    while let Some((idx, ch)) = iter.next() {
        let end_here = match ch {
            '。' | '！' | '？' => true,
            '.' | '!' | '?' => iter.peek().is_none_or(|(_, next)| next.is_whitespace()),
            _ => false,
        };
        if end_here {
            let mut end = idx + ch.len_utf8();
            while let Some(&(next_idx, next)) = iter.peek() {
                if !next.is_whitespace() {
                    break;
                }
                end = next_idx + next.len_utf8();
                iter.next();
            }
            out.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Article after translation. Blocks keep their order and kind; image URLs
/// are untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedArticle {
    pub source_url: String,
    pub title: String,
    pub original_title: String,
    pub author: String,
    pub date: NaiveDate,
    pub blocks: Vec<ArticleBlock>,
}

#[derive(Debug)]
enum AttemptError {
    Service(ServiceError),
    GlossaryLost { entry: usize },
    Misaligned { expected: usize, got: usize },
    EmptyOutput { segment: usize },
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Service(err) => write!(f, "{err}"),
            AttemptError::GlossaryLost { entry } => {
                write!(f, "glossary placeholder {entry} missing from translation")
            }
            AttemptError::Misaligned { expected, got } => {
                write!(f, "expected {expected} paragraphs, got {got}")
            }
            AttemptError::EmptyOutput { segment } => {
                write!(f, "empty translation for segment {segment}")
            }
        }
    }
}

impl IsRetryable for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Service(err) => err.is_retryable(),
            AttemptError::GlossaryLost { .. } | AttemptError::EmptyOutput { .. } => true,
            AttemptError::Misaligned { .. } => false,
        }
    }
}

impl From<ServiceError> for AttemptError {
    fn from(err: ServiceError) -> Self {
        AttemptError::Service(err)
    }
}

/// Glossary-aware, chunking translator. Holds no state between calls.
#[derive(Debug, Clone)]
pub struct Translator {
    glossary: Glossary,
    retry: RetryPolicy,
}

impl Translator {
    pub fn new(glossary: Glossary, retry: RetryPolicy) -> Self {
        Self { glossary, retry }
    }

    pub async fn translate_article(
        &self,
        service: &dyn TranslationService,
        article: &ExtractedArticle,
    ) -> Result<TranslatedArticle, TranslationError> {
        let mut segments = vec![article.title.clone()];
        for block in &article.blocks {
            match block {
                ArticleBlock::Heading { text, .. } | ArticleBlock::Paragraph(text) => {
                    segments.push(text.clone())
                }
                ArticleBlock::Image { alt: Some(alt), .. } => segments.push(alt.clone()),
                ArticleBlock::Image { alt: None, .. } => {}
            }
        }

        let mut translated = self.translate_segments(service, &segments).await?.into_iter();
        let title = translated.next().unwrap_or_default();
        let blocks = article
            .blocks
            .iter()
            .map(|block| match block {
                ArticleBlock::Heading { level, .. } => ArticleBlock::Heading {
                    level: *level,
                    text: translated.next().unwrap_or_default(),
                },
                ArticleBlock::Paragraph(_) => {
                    ArticleBlock::Paragraph(translated.next().unwrap_or_default())
                }
                ArticleBlock::Image { url, alt } => ArticleBlock::Image {
                    url: url.clone(),
                    alt: alt.as_ref().map(|_| translated.next().unwrap_or_default()),
                },
            })
            .collect();

        Ok(TranslatedArticle {
            source_url: article.source_url.clone(),
            title,
            original_title: article.title.clone(),
            author: self.glossary.apply(&article.author),
            date: article.date,
            blocks,
        })
    }

    /// Translates segments and returns one output per input, in input order.
    pub async fn translate_segments(
        &self,
        service: &dyn TranslationService,
        segments: &[String],
    ) -> Result<Vec<String>, TranslationError> {
        let protected: Vec<String> = segments
            .iter()
            .map(|segment| self.glossary.protect(segment).text)
            .collect();
        let chunks = plan_chunks(&protected, service.max_chars())?;
        let total = chunks.len();
        engine_debug!("translating {} segments in {} chunks", segments.len(), total);

        let mut outputs: Vec<Vec<String>> = vec![Vec::new(); segments.len()];
        for (position, chunk) in chunks.iter().enumerate() {
            let index = position + 1;
            let translated = self
                .translate_chunk(service, chunk, index, total)
                .await
                .map_err(|err| TranslationError::ChunkFailed {
                    index,
                    total,
                    reason: err.to_string(),
                })?;
            for (piece, text) in chunk.pieces.iter().zip(translated) {
                outputs[piece.segment].push(text);
            }
        }

        Ok(outputs.into_iter().map(|parts| parts.join(" ")).collect())
    }

    async fn translate_chunk(
        &self,
        service: &dyn TranslationService,
        chunk: &Chunk,
        index: usize,
        total: usize,
    ) -> Result<Vec<String>, AttemptError> {
        let label = format!("translate chunk {index}/{total}");
        let whole =
            with_retry(&self.retry, &label, move || self.attempt_chunk(service, chunk)).await;
        match whole {
            Err(AttemptError::Misaligned { expected, got }) => {
                engine_warn!(
                    "{}: expected {} paragraphs, got {}; translating pieces one by one",
                    label,
                    expected,
                    got
                );
                let mut out = Vec::with_capacity(chunk.pieces.len());
                for piece in &chunk.pieces {
                    let single = Chunk {
                        pieces: vec![piece.clone()],
                    };
                    let single = &single;
                    let text =
                        with_retry(&self.retry, &label, move || self.attempt_chunk(service, single))
                            .await?;
                    out.extend(text);
                }
                Ok(out)
            }
            other => other,
        }
    }

    async fn attempt_chunk(
        &self,
        service: &dyn TranslationService,
        chunk: &Chunk,
    ) -> Result<Vec<String>, AttemptError> {
        let response = service.translate(&chunk.text()).await?;
        let parts: Vec<String> = if chunk.pieces.len() == 1 {
            vec![split_paragraphs(&response).join(" ")]
        } else {
            split_paragraphs(&response)
        };
        if parts.len() != chunk.pieces.len() {
            return Err(AttemptError::Misaligned {
                expected: chunk.pieces.len(),
                got: parts.len(),
            });
        }

        chunk
            .pieces
            .iter()
            .zip(parts)
            .map(|(piece, part)| {
                if part.trim().is_empty() && !piece.text.trim().is_empty() {
                    return Err(AttemptError::EmptyOutput {
                        segment: piece.segment,
                    });
                }
                let used = self.glossary.placeholders_in(&piece.text);
                self.glossary
                    .restore(&part, &used)
                    .map_err(|entry| AttemptError::GlossaryLost { entry })
            })
            .collect()
    }
}

fn split_paragraphs(text: &str) -> Vec<String> {
    text.split(PARAGRAPH_SEPARATOR)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
