use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use republish_engine::{render_artifact, ArticleBlock, ArtifactMeta, ImageMap, TranslatedArticle};

fn article() -> TranslatedArticle {
    TranslatedArticle {
        source_url: "https://mp.weixin.qq.com/s/abc".into(),
        title: "An \"Example\" Post".into(),
        original_title: "示例文章".into(),
        author: "Zhang San".into(),
        date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        blocks: vec![
            ArticleBlock::Paragraph("First paragraph.".into()),
            ArticleBlock::Heading {
                level: 2,
                text: "Section".into(),
            },
            ArticleBlock::Image {
                url: "https://mmbiz.qpic.cn/a.jpg".into(),
                alt: Some("Figure [1]".into()),
            },
            ArticleBlock::Image {
                url: "https://mmbiz.qpic.cn/unmapped.jpg".into(),
                alt: None,
            },
        ],
    }
}

fn meta() -> ArtifactMeta {
    ArtifactMeta {
        tags: vec!["wechat".into(), "translated".into()],
    }
}

#[test]
fn renders_frontmatter_then_body() {
    let mut images = ImageMap::default();
    images.insert("https://mmbiz.qpic.cn/a.jpg", "/images/posts/0123456789abcdef.jpg");

    let expected = r#"---
title: "An \"Example\" Post"
originalTitle: "示例文章"
date: "2025-01-15"
author: "Zhang San"
excerpt: "First paragraph."
originalUrl: "https://mp.weixin.qq.com/s/abc"
images: []
tags:
  - "wechat"
  - "translated"
---

First paragraph.

## Section

![Figure [1\]](/images/posts/0123456789abcdef.jpg)

![](https://mmbiz.qpic.cn/unmapped.jpg)
"#;
    assert_eq!(render_artifact(&article(), &images, &meta()), expected);
}

#[test]
fn identical_inputs_render_identical_bytes() {
    let mut images = ImageMap::default();
    images.insert("https://mmbiz.qpic.cn/a.jpg", "/images/posts/x.jpg");

    let first = render_artifact(&article(), &images, &meta());
    let second = render_artifact(&article(), &images.clone(), &meta());
    assert_eq!(first.as_bytes(), second.as_bytes());
}

#[test]
fn empty_tag_list_is_explicit() {
    let rendered = render_artifact(&article(), &ImageMap::default(), &ArtifactMeta::default());
    assert!(rendered.contains("\ntags: []\n"));
}
