use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::TaskId;

//
// ─── CATEGORY ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown task category: {0}")]
pub struct UnknownCategory(pub String);

/// Study area a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Hiragana,
    Katakana,
    Vocabulary,
    Grammar,
    Listening,
    Reading,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Hiragana,
        Category::Katakana,
        Category::Vocabulary,
        Category::Grammar,
        Category::Listening,
        Category::Reading,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Hiragana => "hiragana",
            Category::Katakana => "katakana",
            Category::Vocabulary => "vocabulary",
            Category::Grammar => "grammar",
            Category::Listening => "listening",
            Category::Reading => "reading",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_owned()))
    }
}

//
// ─── TASK ─────────────────────────────────────────────────────────────────────
//

/// Atomic unit of study content, resolved from the curriculum.
///
/// `week` and `day` locate the task in the static week → day → task
/// hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub category: Category,
    pub points: u32,
    pub week: u32,
    pub day: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_its_own_label() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn category_rejects_unknown_label() {
        let err = "kanji".parse::<Category>().unwrap_err();
        assert_eq!(err, UnknownCategory("kanji".into()));
    }

    #[test]
    fn category_serializes_lowercase() {
        let json = serde_json::to_string(&Category::Listening).unwrap();
        assert_eq!(json, "\"listening\"");
    }
}
