//! Review and Issue: the reviewer's verdict on a step or a whole plan.
//!
//! Severity and category are open: any string the model emits survives a
//! round trip through [`Severity::Unknown`] / [`Category::Unknown`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// How serious an issue is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Critical,
    Warning,
    #[default]
    Info,
    Unknown(String),
}

impl Severity {
    /// The severity the UI should treat this as. Unknown values count as info.
    pub fn effective(&self) -> Severity {
        match self {
            Self::Unknown(_) => Self::Info,
            other => other.clone(),
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "critical" => Self::Critical,
            "warning" => Self::Warning,
            "info" => Self::Info,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Severity> for String {
    fn from(value: Severity) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What area an issue falls into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Security,
    #[default]
    Bug,
    Performance,
    Style,
    Unknown(String),
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Security => "security",
            Self::Bug => "bug",
            Self::Performance => "performance",
            Self::Style => "style",
            Self::Unknown(raw) => raw,
        }
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "security" => Self::Security,
            "bug" => Self::Bug,
            "performance" => Self::Performance,
            "style" => Self::Style,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding from the reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub category: Category,

    #[serde(alias = "description", alias = "text")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_line")]
    pub line: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "fix")]
    pub suggestion: Option<String>,
}

impl Issue {
    pub fn new(severity: Severity, category: Category, message: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            file: None,
            line: None,
            suggestion: None,
        }
    }

    /// `file:line` when known.
    pub fn location(&self) -> Option<String> {
        let file = self.file.as_deref()?;
        Some(match self.line {
            Some(line) => format!("{file}:{line}"),
            None => file.to_string(),
        })
    }
}

/// The reviewer's verdict. `approved` is required; an object without it
/// is not a review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub approved: bool,

    /// 0–10. Out-of-range values are clamped on parse.
    #[serde(default, deserialize_with = "clamped_score")]
    pub score: u8,

    #[serde(default)]
    pub issues: Vec<Issue>,

    #[serde(default)]
    pub suggestions: Vec<String>,

    #[serde(default)]
    pub summary: String,
}

impl Review {
    fn count(&self, severity: &Severity) -> usize {
        self.issues
            .iter()
            .filter(|i| &i.severity.effective() == severity)
            .count()
    }

    pub fn critical_count(&self) -> usize {
        self.count(&Severity::Critical)
    }

    pub fn warning_count(&self) -> usize {
        self.count(&Severity::Warning)
    }

    /// Info count, including issues with an unrecognized severity.
    pub fn info_count(&self) -> usize {
        self.count(&Severity::Info)
    }

    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity.is_critical())
    }
}

fn clamped_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let score = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().split('/').next().unwrap_or("").trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    Ok(score.round().clamp(0.0, 10.0) as u8)
}

fn lenient_line<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_severity_survives_round_trip() {
        let json = r#"{"severity":"blocker","category":"naming","message":"rename x"}"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.severity, Severity::Unknown("blocker".into()));
        assert_eq!(issue.category, Category::Unknown("naming".into()));
        assert_eq!(issue.severity.effective(), Severity::Info);

        let back = serde_json::to_string(&issue).unwrap();
        assert!(back.contains(r#""severity":"blocker""#));
        assert!(back.contains(r#""category":"naming""#));
    }

    #[test]
    fn counts_treat_unknown_as_info() {
        let json = r#"{
            "approved": false,
            "score": 4,
            "issues": [
                {"severity": "CRITICAL", "category": "security", "message": "SQL injection"},
                {"severity": "warning", "category": "style", "message": "long fn"},
                {"severity": "nit", "category": "style", "message": "typo"},
                {"severity": "info", "category": "bug", "message": "edge case"}
            ],
            "suggestions": ["use prepared statements"],
            "summary": "Needs work"
        }"#;
        let review: Review = serde_json::from_str(json).unwrap();
        assert!(review.has_critical());
        assert_eq!(review.critical_count(), 1);
        assert_eq!(review.warning_count(), 1);
        assert_eq!(review.info_count(), 2);
        assert_eq!(review.issues.len(), 4);
    }

    #[test]
    fn score_is_clamped() {
        let review: Review = serde_json::from_str(r#"{"approved": true, "score": 42}"#).unwrap();
        assert_eq!(review.score, 10);
        let review: Review =
            serde_json::from_str(r#"{"approved": true, "score": "7/10"}"#).unwrap();
        assert_eq!(review.score, 7);
        let review: Review = serde_json::from_str(r#"{"approved": false, "score": -3}"#).unwrap();
        assert_eq!(review.score, 0);
    }

    #[test]
    fn object_without_verdict_is_not_a_review() {
        let parsed = serde_json::from_str::<Review>(r#"{"verdict": "looks good", "notes": "ship it"}"#);
        assert!(parsed.is_err());
        let parsed = serde_json::from_str::<Review>(r#"{"approved": true}"#).unwrap();
        assert_eq!(parsed.score, 0);
        assert!(parsed.issues.is_empty());
    }

    #[test]
    fn issue_location() {
        let mut issue = Issue::new(Severity::Warning, Category::Bug, "off by one");
        assert!(issue.location().is_none());
        issue.file = Some("src/lib.rs".into());
        issue.line = Some(12);
        assert_eq!(issue.location().as_deref(), Some("src/lib.rs:12"));
    }
}
