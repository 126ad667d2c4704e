#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use republish_engine::{
    FailureKind, FetchError, FetchMetadata, FetchOutput, Fetcher, PublishError, ServiceError,
    TranslationService, VersionControl,
};

/// Serves canned responses keyed by URL; unknown URLs are a 404.
#[derive(Default)]
pub struct FakeFetcher {
    responses: Mutex<HashMap<String, (Vec<u8>, String)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>, content_type: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (body.into(), content_type.to_string()));
    }

    pub fn serve_html(&self, url: &str, html: &str) {
        self.serve(url, html.as_bytes().to_vec(), "text/html; charset=utf-8");
    }

    pub fn remove(&self, url: &str) {
        self.responses.lock().unwrap().remove(url);
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let found = self.responses.lock().unwrap().get(url).cloned();
        let (bytes, content_type) =
            found.ok_or_else(|| FetchError::new(FailureKind::HttpStatus(404), "not found"))?;
        Ok(FetchOutput {
            metadata: FetchMetadata {
                original_url: url.to_string(),
                final_url: url.to_string(),
                redirect_count: 0,
                content_type: Some(content_type),
                byte_len: bytes.len() as u64,
            },
            bytes,
        })
    }
}

/// Translates each blank-line separated paragraph to `EN(<paragraph>)`.
pub struct FakeTranslator {
    max_chars: usize,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeTranslator {
    pub fn new(max_chars: usize) -> Arc<Self> {
        Arc::new(Self {
            max_chars,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl TranslationService for FakeTranslator {
    fn max_chars(&self) -> usize {
        self.max_chars
    }

    async fn translate(&self, text: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::HttpStatus(400));
        }
        Ok(text
            .split("\n\n")
            .map(|p| format!("EN({p})"))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

/// Records commits instead of running git.
#[derive(Default)]
pub struct RecordingVcs {
    commits: Mutex<Vec<(Vec<PathBuf>, String)>>,
    failing: AtomicBool,
}

impl RecordingVcs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }

    pub fn commits(&self) -> Vec<(Vec<PathBuf>, String)> {
        self.commits.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl VersionControl for RecordingVcs {
    async fn commit(&self, paths: &[PathBuf], message: &str) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Commit {
                command: "git commit".into(),
                status: "exit status: 1".into(),
                stderr: "conflict".into(),
            });
        }
        self.commits
            .lock()
            .unwrap()
            .push((paths.to_vec(), message.to_string()));
        Ok(())
    }
}

/// Minimal WeChat article page.
pub fn wechat_page(title: &str, date: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
<div id="img-content">
  <h1 class="rich_media_title" id="activity-name">
    {title}
  </h1>
  <div id="meta_content">
    <span id="js_author_name">张三</span>
    <a id="js_name">科技日报</a>
    <em id="publish_time">{date}</em>
  </div>
  <div class="rich_media_content" id="js_content">
    {body}
  </div>
</div>
</body>
</html>"#
    )
}

/// Solid-colour RGB PNG of the given size.
pub fn png_bytes(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([shade, shade, shade]));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}
