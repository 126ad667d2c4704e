use republish_engine::{ArticleOutcome, ArticleReport, BatchReport, PublishOutcome};

/// One stdout line per article.
pub fn status_line(report: &ArticleReport) -> String {
    match &report.outcome {
        ArticleOutcome::Skipped => format!("skipped    {} (unchanged)", report.url),
        ArticleOutcome::Processed {
            artifact_path,
            publish,
            resumed,
            image_warnings,
        } => {
            let mut line = format!("processed  {} -> {}", report.url, artifact_path);
            if *publish == PublishOutcome::Unchanged {
                line.push_str(" (artifact unchanged, not committed)");
            }
            if *resumed {
                line.push_str(" (resumed)");
            }
            if !image_warnings.is_empty() {
                line.push_str(&format!(" ({} image(s) replaced by placeholder)", image_warnings.len()));
            }
            line
        }
        ArticleOutcome::Failed { stage, reason } => {
            format!("failed     {} [{}]: {}", report.url, stage, reason)
        }
    }
}

pub fn summary_line(report: &BatchReport) -> String {
    let mut skipped = 0;
    let mut processed = 0;
    let mut failed = 0;
    for article in &report.articles {
        match article.outcome {
            ArticleOutcome::Skipped => skipped += 1,
            ArticleOutcome::Processed { .. } => processed += 1,
            ArticleOutcome::Failed { .. } => failed += 1,
        }
    }
    format!("{processed} processed, {skipped} skipped, {failed} failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use republish_engine::{ImageWarning, Stage};

    fn report(outcome: ArticleOutcome) -> ArticleReport {
        ArticleReport {
            url: "https://mp.weixin.qq.com/s/a".into(),
            outcome,
        }
    }

    #[test]
    fn lines_distinguish_the_three_outcomes() {
        assert_eq!(
            status_line(&report(ArticleOutcome::Skipped)),
            "skipped    https://mp.weixin.qq.com/s/a (unchanged)"
        );
        assert_eq!(
            status_line(&report(ArticleOutcome::Processed {
                artifact_path: "posts/2025-01-15-example.md".into(),
                publish: PublishOutcome::Written,
                resumed: false,
                image_warnings: vec![ImageWarning {
                    url: "https://mmbiz.qpic.cn/x".into(),
                    reason: "http status 404".into(),
                }],
            })),
            "processed  https://mp.weixin.qq.com/s/a -> posts/2025-01-15-example.md (1 image(s) replaced by placeholder)"
        );
        assert_eq!(
            status_line(&report(ArticleOutcome::Failed {
                stage: Stage::Translating,
                reason: "chunk 2/3 failed: timeout".into(),
            })),
            "failed     https://mp.weixin.qq.com/s/a [translating]: chunk 2/3 failed: timeout"
        );
    }

    #[test]
    fn summary_counts_outcomes() {
        let batch = BatchReport {
            articles: vec![
                report(ArticleOutcome::Skipped),
                report(ArticleOutcome::Failed {
                    stage: Stage::Fetching,
                    reason: "timeout".into(),
                }),
            ],
            fatal: None,
        };
        assert_eq!(summary_line(&batch), "0 processed, 1 skipped, 1 failed");
    }
}
