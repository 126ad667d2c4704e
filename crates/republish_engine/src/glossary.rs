use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub source: String,
    pub target: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GlossaryError {
    #[error("failed to read glossary {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse glossary {path}: {message}")]
    Parse { path: String, message: String },
    #[error("glossary entry {index} has an empty source term")]
    EmptyTerm { index: usize },
}

/// Ordered source-term to fixed-rendering mapping.
///
/// Entries are applied in file order, so a longer term that contains a
/// shorter one must be listed first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Glossary {
    entries: Vec<GlossaryEntry>,
}

/// Text with glossary terms swapped for placeholders, plus the placeholders used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedText {
    pub text: String,
    pub used: Vec<usize>,
}

impl Glossary {
    pub fn new(entries: Vec<GlossaryEntry>) -> Result<Self, GlossaryError> {
        if let Some(index) = entries.iter().position(|e| e.source.is_empty()) {
            return Err(GlossaryError::EmptyTerm { index });
        }
        Ok(Self { entries })
    }

    /// Reads a RON list of `(source, target)` pairs.
    pub fn load(path: &Path) -> Result<Self, GlossaryError> {
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| GlossaryError::Read {
            path: display.clone(),
            source,
        })?;
        let pairs: Vec<(String, String)> =
            ron::from_str(&content).map_err(|err| GlossaryError::Parse {
                path: display,
                message: err.to_string(),
            })?;
        Self::new(
            pairs
                .into_iter()
                .map(|(source, target)| GlossaryEntry { source, target })
                .collect(),
        )
    }

    pub fn entries(&self) -> &[GlossaryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn placeholder(index: usize) -> String {
        format!("{{{{G{index}}}}}")
    }

    /// Replaces every source term with its placeholder in a single left to
    /// right pass; at each position the first matching entry wins. Inserted
    /// placeholders are never matched again.
    pub fn protect(&self, text: &str) -> ProtectedText {
        let mut out = String::with_capacity(text.len());
        let mut used = Vec::new();
        let mut rest = text;
        while let Some(ch) = rest.chars().next() {
            let matched = self
                .entries
                .iter()
                .enumerate()
                .find(|(_, entry)| rest.starts_with(entry.source.as_str()));
            match matched {
                Some((index, entry)) => {
                    out.push_str(&Self::placeholder(index));
                    if !used.contains(&index) {
                        used.push(index);
                    }
                    rest = &rest[entry.source.len()..];
                }
                None => {
                    out.push(ch);
                    rest = &rest[ch.len_utf8()..];
                }
            }
        }
        used.sort_unstable();
        ProtectedText { text: out, used }
    }

    /// Indices of the placeholders that occur in already-protected text.
    pub fn placeholders_in(&self, protected: &str) -> Vec<usize> {
        (0..self.entries.len())
            .filter(|&index| protected.contains(&Self::placeholder(index)))
            .collect()
    }

    /// Puts the fixed renderings back. Returns the index of the first
    /// placeholder that went missing in `translated`, if any.
    pub fn restore(&self, translated: &str, used: &[usize]) -> Result<String, usize> {
        let mut out = translated.to_string();
        for &index in used {
            let placeholder = Self::placeholder(index);
            if !out.contains(&placeholder) {
                return Err(index);
            }
            out = out.replace(&placeholder, &self.entries[index].target);
        }
        Ok(out)
    }

    /// Direct substitution, for fields that are not machine translated.
    pub fn apply(&self, text: &str) -> String {
        let protected = self.protect(text);
        match self.restore(&protected.text, &protected.used) {
            Ok(restored) => restored,
            Err(_) => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn glossary() -> Glossary {
        Glossary::new(vec![
            GlossaryEntry {
                source: "腾讯科技".into(),
                target: "Tencent Technology".into(),
            },
            GlossaryEntry {
                source: "腾讯".into(),
                target: "Tencent".into(),
            },
        ])
        .unwrap()
    }

    #[test]
    fn longer_terms_listed_first_win() {
        let protected = glossary().protect("腾讯科技和腾讯");
        assert_eq!(protected.text, "{{G0}}和{{G1}}");
        assert_eq!(protected.used, vec![0, 1]);
    }

    #[test]
    fn later_terms_do_not_rewrite_earlier_placeholders() {
        let g = Glossary::new(vec![
            GlossaryEntry {
                source: "腾讯".into(),
                target: "Tencent".into(),
            },
            GlossaryEntry {
                source: "G".into(),
                target: "Gee".into(),
            },
            GlossaryEntry {
                source: "0".into(),
                target: "zero".into(),
            },
            GlossaryEntry {
                source: "{".into(),
                target: "(".into(),
            },
        ])
        .unwrap();

        let protected = g.protect("腾讯G0");
        assert_eq!(protected.text, "{{G0}}{{G1}}{{G2}}");
        assert_eq!(protected.used, vec![0, 1, 2]);
        assert_eq!(g.apply("腾讯G0{"), "TencentGeezero(");
    }

    #[test]
    fn restore_reports_lost_placeholders() {
        let g = glossary();
        assert_eq!(
            g.restore("{{G0}} and {{G1}}", &[0, 1]).unwrap(),
            "Tencent Technology and Tencent"
        );
        assert_eq!(g.restore("only {{G1}}", &[0, 1]), Err(0));
    }

    #[test]
    fn apply_substitutes_directly() {
        assert_eq!(glossary().apply("腾讯 作者"), "Tencent 作者");
    }

    #[test]
    fn empty_source_terms_are_rejected() {
        let err = Glossary::new(vec![GlossaryEntry {
            source: String::new(),
            target: "x".into(),
        }])
        .unwrap_err();
        assert!(matches!(err, GlossaryError::EmptyTerm { index: 0 }));
    }
}
