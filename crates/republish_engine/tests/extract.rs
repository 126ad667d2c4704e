mod common;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use republish_engine::{ArticleBlock, ExtractionError, Extractor, WeChatExtractor};

use common::wechat_page;

const URL: &str = "https://mp.weixin.qq.com/s/abc123";

#[test]
fn extracts_fields_and_ordered_blocks() {
    let body = r#"
        <section><p>第一段。</p></section>
        <h2>小标题</h2>
        <p>第二段<strong>加粗</strong>文字。</p>
        <p><img data-src="https://mmbiz.qpic.cn/a.jpg" src="data:image/gif;base64,R0l" alt="图一"></p>
        <ul><li>要点一</li><li>要点二</li></ul>
        <script>var x = 1;</script>
    "#;
    let html = wechat_page("示例文章", "2025-01-15 08:30", body);

    let article = WeChatExtractor.extract(&html, URL).unwrap();
    assert_eq!(article.title, "示例文章");
    assert_eq!(article.author, "张三");
    assert_eq!(article.date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
    assert_eq!(
        article.blocks,
        vec![
            ArticleBlock::Paragraph("第一段。".into()),
            ArticleBlock::Heading {
                level: 2,
                text: "小标题".into()
            },
            ArticleBlock::Paragraph("第二段加粗文字。".into()),
            ArticleBlock::Image {
                url: "https://mmbiz.qpic.cn/a.jpg".into(),
                alt: Some("图一".into())
            },
            ArticleBlock::Paragraph("- 要点一".into()),
            ArticleBlock::Paragraph("- 要点二".into()),
        ]
    );
    assert_eq!(article.fingerprint.len(), 64);
}

#[test]
fn image_urls_are_deduplicated_in_order() {
    let body = r#"
        <p>正文</p>
        <img data-src="https://mmbiz.qpic.cn/b.png">
        <img data-src="https://mmbiz.qpic.cn/a.png">
        <img data-src="https://mmbiz.qpic.cn/b.png">
    "#;
    let html = wechat_page("图", "2025-01-15", body);
    let article = WeChatExtractor.extract(&html, URL).unwrap();
    assert_eq!(
        article.image_urls(),
        vec![
            "https://mmbiz.qpic.cn/b.png".to_string(),
            "https://mmbiz.qpic.cn/a.png".to_string()
        ]
    );
}

#[test]
fn missing_title_is_an_extraction_error() {
    let html = r#"<html><body>
        <span id="js_author_name">张三</span>
        <em id="publish_time">2025-01-15</em>
        <div id="js_content"><p>正文</p></div>
    </body></html>"#;
    assert_eq!(
        WeChatExtractor.extract(html, URL).unwrap_err(),
        ExtractionError::MissingField("title")
    );
}

#[test]
fn body_without_text_is_rejected() {
    let html = wechat_page("标题", "2025-01-15", r#"<p><img data-src="https://mmbiz.qpic.cn/a.jpg"></p>"#);
    assert_eq!(
        WeChatExtractor.extract(&html, URL).unwrap_err(),
        ExtractionError::EmptyBody
    );
}

#[test]
fn unparseable_document_fails_instead_of_guessing() {
    let err = WeChatExtractor
        .extract("\u{0}\u{1} not html at all", URL)
        .unwrap_err();
    assert!(matches!(err, ExtractionError::MissingField(_)));
}

#[test]
fn script_timestamp_is_read_in_china_time() {
    // 2025-01-14T16:30:00Z is 2025-01-15 00:30 in UTC+8.
    let html = r#"<html><head><script>var ct = "1736872200";</script></head><body>
        <h1 id="activity-name">标题</h1>
        <a id="js_name">科技日报</a>
        <div id="js_content"><p>正文</p></div>
    </body></html>"#;
    let article = WeChatExtractor.extract(html, URL).unwrap();
    assert_eq!(article.author, "科技日报");
    assert_eq!(article.date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
}

#[test]
fn cosmetic_rerender_keeps_the_fingerprint() {
    let a = wechat_page("标题", "2025-01-15", "<p>正文一</p><p>正文二</p>");
    let b = wechat_page(
        "标题",
        "2025-01-15",
        "\n   <p>正文一</p>\n\n<!-- cache 42 -->\n   <p>正文二</p>   ",
    );
    let fa = WeChatExtractor.extract(&a, URL).unwrap().fingerprint;
    let fb = WeChatExtractor.extract(&b, URL).unwrap().fingerprint;
    assert_eq!(fa, fb);
}

#[test]
fn content_edit_changes_the_fingerprint() {
    let a = wechat_page("标题", "2025-01-15", "<p>正文一</p>");
    let b = wechat_page("标题", "2025-01-15", "<p>正文二</p>");
    let fa = WeChatExtractor.extract(&a, URL).unwrap().fingerprint;
    let fb = WeChatExtractor.extract(&b, URL).unwrap().fingerprint;
    assert_ne!(fa, fb);
}

#[test]
fn invalid_source_url_is_rejected() {
    let html = wechat_page("标题", "2025-01-15", "<p>正文</p>");
    assert!(matches!(
        WeChatExtractor.extract(&html, "not a url"),
        Err(ExtractionError::InvalidSourceUrl(_))
    ));
}
