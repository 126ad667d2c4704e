use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::PathBuf;

use engine_logging::{engine_debug, engine_warn};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::fetch::Fetcher;
use crate::fingerprint::short_hash;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::retry::{with_retry, RetryPolicy};
use crate::FetchError;

const HASH_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct ImageSettings {
    /// Filesystem directory the optimised files are written to.
    pub assets_dir: PathBuf,
    /// Public prefix under which the assets directory is served.
    pub url_prefix: String,
    pub max_width: u32,
    pub jpeg_quality: u8,
    /// Reference used in place of an image that could not be processed.
    pub placeholder: String,
}

impl ImageSettings {
    pub fn new(assets_dir: PathBuf) -> Self {
        Self {
            assets_dir,
            url_prefix: "/images/posts".to_string(),
            max_width: 1200,
            jpeg_quality: 82,
            placeholder: "/images/placeholder.svg".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("unrecognised image format")]
    UnsupportedFormat,
    #[error("re-encoding failed: {0}")]
    Encode(String),
    #[error("write failed: {0}")]
    Write(#[from] PersistError),
}

/// One image file produced during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub original_url: String,
    /// Public reference used in the artifact.
    pub local_path: String,
    /// Truncated SHA-256 of the fetched bytes.
    pub content_hash: String,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageWarning {
    pub url: String,
    pub reason: String,
}

/// Original URL to local reference, for one article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMap {
    references: BTreeMap<String, String>,
    assets: Vec<ImageAsset>,
    warnings: Vec<ImageWarning>,
}

impl ImageMap {
    pub fn get(&self, original_url: &str) -> Option<&str> {
        self.references.get(original_url).map(String::as_str)
    }

    /// Distinct files written or reused, in first-seen order.
    pub fn assets(&self) -> &[ImageAsset] {
        &self.assets
    }

    pub fn warnings(&self) -> &[ImageWarning] {
        &self.warnings
    }

    pub fn insert(&mut self, original_url: impl Into<String>, local_path: impl Into<String>) {
        self.references.insert(original_url.into(), local_path.into());
    }
}

/// Fetches, de-duplicates and optimises the images of one article.
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    settings: ImageSettings,
    retry: RetryPolicy,
}

impl ImageProcessor {
    pub fn new(settings: ImageSettings, retry: RetryPolicy) -> Self {
        Self { settings, retry }
    }

    /// Never fails: an image that cannot be processed maps to the placeholder
    /// and is reported in [`ImageMap::warnings`].
    pub async fn process(&self, fetcher: &dyn Fetcher, urls: &[String]) -> ImageMap {
        let mut map = ImageMap::default();
        let mut by_hash: BTreeMap<String, String> = BTreeMap::new();

        for url in urls {
            if map.get(url).is_some() {
                continue;
            }
            match self.process_one(fetcher, url, &mut by_hash).await {
                Ok(Resolved::Written(asset)) => {
                    map.insert(url.clone(), asset.local_path.clone());
                    map.assets.push(asset);
                }
                Ok(Resolved::Duplicate(local_path)) => map.insert(url.clone(), local_path),
                Err(err) => {
                    engine_warn!("image {} replaced by placeholder: {}", url, err);
                    map.insert(url.clone(), self.settings.placeholder.clone());
                    map.warnings.push(ImageWarning {
                        url: url.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        map
    }

    async fn process_one(
        &self,
        fetcher: &dyn Fetcher,
        url: &str,
        by_hash: &mut BTreeMap<String, String>,
    ) -> Result<Resolved, ImageError> {
        let label = format!("fetch image {url}");
        let fetched = with_retry(&self.retry, &label, || fetcher.fetch(url)).await?;
        let content_hash = short_hash(&fetched.bytes, HASH_LEN);

        if let Some(local_path) = by_hash.get(&content_hash) {
            engine_debug!("image {} duplicates {}", url, local_path);
            return Ok(Resolved::Duplicate(local_path.clone()));
        }

        let (bytes, extension) = optimize(&fetched.bytes, &self.settings)?;
        let filename = format!("{content_hash}.{extension}");
        let file_path = self.settings.assets_dir.join(&filename);
        if !file_path.exists() {
            AtomicFileWriter::new(self.settings.assets_dir.clone())
                .write_bytes(&filename, &bytes)?;
        }
        let local_path = format!(
            "{}/{}",
            self.settings.url_prefix.trim_end_matches('/'),
            filename
        );
        by_hash.insert(content_hash.clone(), local_path.clone());

        Ok(Resolved::Written(ImageAsset {
            original_url: url.to_string(),
            local_path,
            content_hash,
            file_path,
        }))
    }
}

enum Resolved {
    Written(ImageAsset),
    /// Same bytes as an image already handled in this run.
    Duplicate(String),
}

fn optimize(bytes: &[u8], settings: &ImageSettings) -> Result<(Vec<u8>, &'static str), ImageError> {
    let format = image::guess_format(bytes).map_err(|_| ImageError::UnsupportedFormat)?;
    if format == ImageFormat::Gif {
        // Re-encoding would drop animation frames.
        return Ok((bytes.to_vec(), "gif"));
    }

    let decoded = match image::load_from_memory_with_format(bytes, format) {
        Ok(decoded) => decoded,
        Err(err) => {
            let extension = extension_for(format).ok_or(ImageError::UnsupportedFormat)?;
            engine_warn!("image kept as-is, decoding failed: {}", err);
            return Ok((bytes.to_vec(), extension));
        }
    };

    let resized = if decoded.width() > settings.max_width {
        decoded.resize(settings.max_width, u32::MAX, FilterType::Lanczos3)
    } else {
        decoded
    };

    let mut out = Vec::new();
    if resized.color().has_alpha() {
        resized
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .map_err(|err| ImageError::Encode(err.to_string()))?;
        Ok((out, "png"))
    } else {
        let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
        let encoder = JpegEncoder::new_with_quality(&mut out, settings.jpeg_quality);
        rgb.write_with_encoder(encoder)
            .map_err(|err| ImageError::Encode(err.to_string()))?;
        Ok((out, "jpg"))
    }
}

fn extension_for(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Png => Some("png"),
        ImageFormat::Gif => Some("gif"),
        ImageFormat::WebP => Some("webp"),
        _ => None,
    }
}
