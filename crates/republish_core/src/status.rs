use std::fmt;

use serde::{Deserialize, Serialize};

/// Processing status of one source article.
///
/// The happy path is `Pending -> Extracted -> Translated -> Published`.
/// `Failed` can be entered from any non-terminal status and is left again by
/// beginning a new run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Pending,
    Extracted,
    Translated,
    Published,
    Failed,
}

impl ArticleStatus {
    /// The only status an `advance` from `self` may target.
    pub fn next(self) -> Option<ArticleStatus> {
        match self {
            ArticleStatus::Pending => Some(ArticleStatus::Extracted),
            ArticleStatus::Extracted => Some(ArticleStatus::Translated),
            ArticleStatus::Translated => Some(ArticleStatus::Published),
            ArticleStatus::Published | ArticleStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ArticleStatus::Published
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArticleStatus::Pending => "pending",
            ArticleStatus::Extracted => "extracted",
            ArticleStatus::Translated => "translated",
            ArticleStatus::Published => "published",
            ArticleStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
