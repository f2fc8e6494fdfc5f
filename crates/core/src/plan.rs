//! Plan and Step: the ordered task list produced by the planning stage.
//!
//! Deserialization is deliberately lenient: models emit numbers as strings,
//! single file names instead of lists, or unknown step types. Everything that
//! can be salvaged is; shape problems are reported by [`Plan::validate`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

use crate::error::WorkflowError;

/// Kind of work a step performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    #[default]
    Code,
    Test,
    Doc,
    Config,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Test => "test",
            Self::Doc => "doc",
            Self::Config => "config",
        }
    }
}

impl From<String> for StepType {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "test" | "tests" | "testing" => Self::Test,
            "doc" | "docs" | "documentation" => Self::Doc,
            "config" | "configuration" => Self::Config,
            _ => Self::Code,
        }
    }
}

impl From<StepType> for String {
    fn from(value: StepType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rough size of a plan as judged by the planner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl From<String> for Complexity {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "low" | "simple" | "easy" => Self::Low,
            "high" | "complex" | "hard" => Self::High,
            _ => Self::Medium,
        }
    }
}

impl From<Complexity> for String {
    fn from(value: Complexity) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One atomic unit of work within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Stable identifier within the plan; referenced by `dependencies`.
    #[serde(default, deserialize_with = "lenient_u32")]
    pub order: u32,

    #[serde(alias = "title", alias = "task")]
    pub description: String,

    #[serde(default, rename = "type", alias = "step_type", alias = "kind")]
    pub step_type: StepType,

    /// Target file paths, relative to the project root.
    #[serde(default, alias = "target_files", alias = "file_paths", deserialize_with = "lenient_strings")]
    pub files: Vec<String>,

    /// Orders of steps this one depends on. Recorded, not enforced.
    #[serde(default, alias = "depends_on", deserialize_with = "lenient_orders")]
    pub dependencies: Vec<u32>,

    #[serde(
        default,
        alias = "estimatedMinutes",
        alias = "estimated_time",
        deserialize_with = "lenient_u32"
    )]
    pub estimated_minutes: u32,

    // --- runtime state ---
    #[serde(default)]
    pub completed: bool,

    #[serde(default)]
    pub skipped: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Step {
    /// Create a pending step.
    pub fn new(order: u32, description: impl Into<String>, step_type: StepType) -> Self {
        Self {
            order,
            description: description.into(),
            step_type,
            files: Vec::new(),
            dependencies: Vec::new(),
            estimated_minutes: 0,
            completed: false,
            skipped: false,
            result: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<u32>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn mark_started(&mut self) {
        self.started_at = Some(Utc::now());
        self.finished_at = None;
    }

    pub fn mark_completed(&mut self, result: impl Into<String>) {
        self.completed = true;
        self.skipped = false;
        self.result = Some(result.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.completed = false;
        self.result = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.skipped = true;
        self.result = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock time between start and finish, if both are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }

    /// Lifecycle label used in documents and status output.
    pub fn status_label(&self) -> &'static str {
        if self.completed {
            "completed"
        } else if self.skipped {
            "skipped"
        } else if self.started_at.is_some() && self.finished_at.is_some() {
            "failed"
        } else if self.started_at.is_some() {
            "in progress"
        } else {
            "pending"
        }
    }
}

/// An ordered set of steps toward one goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub goal: String,

    /// Free-text summary of the project context the plan was made against.
    #[serde(default, alias = "context_summary", alias = "summary")]
    pub context: String,

    #[serde(default)]
    pub complexity: Complexity,

    #[serde(default, alias = "estimatedTime", alias = "estimated_duration", deserialize_with = "lenient_string")]
    pub estimated_time: String,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            context: String::new(),
            complexity: Complexity::default(),
            estimated_time: String::new(),
            steps: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.completed).count()
    }

    /// All steps completed.
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.completed)
    }

    pub fn step(&self, order: u32) -> Option<&Step> {
        self.steps.iter().find(|s| s.order == order)
    }

    pub fn step_mut(&mut self, order: u32) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.order == order)
    }

    /// Give steps that arrived without an order their list position
    /// (1-based), or the next order above every used one when that position
    /// is already taken.
    ///
    /// Orders the model did provide are left alone so dependency references
    /// stay valid.
    pub fn fill_missing_orders(&mut self) {
        let mut taken: HashSet<u32> = self
            .steps
            .iter()
            .map(|s| s.order)
            .filter(|o| *o != 0)
            .collect();
        let mut next = taken.iter().max().map_or(1, |max| max + 1);

        for (i, step) in self.steps.iter_mut().enumerate() {
            if step.order != 0 {
                continue;
            }
            let position = i as u32 + 1;
            let order = if taken.contains(&position) {
                while taken.contains(&next) {
                    next += 1;
                }
                next
            } else {
                position
            };
            debug!(position, order, "Step without an order");
            taken.insert(order);
            step.order = order;
        }
    }

    /// Reassign orders 1..N in list order, discarding the previous numbering.
    pub fn renumber(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.order = i as u32 + 1;
        }
    }

    /// Check the shape rules a freshly created plan must satisfy.
    pub fn validate(&self, max_steps: usize) -> Result<(), WorkflowError> {
        if self.steps.is_empty() {
            return Err(WorkflowError::NoSteps);
        }
        if self.steps.len() > max_steps {
            return Err(WorkflowError::Validation {
                message: format!(
                    "plan has {} steps, the limit is {max_steps}",
                    self.steps.len()
                ),
                raw: None,
            });
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.order) {
                return Err(WorkflowError::Validation {
                    message: format!("duplicate step order {}", step.order),
                    raw: None,
                });
            }
            if step.description.trim().is_empty() {
                return Err(WorkflowError::Validation {
                    message: format!("step {} has no description", step.order),
                    raw: None,
                });
            }
        }
        Ok(())
    }

    /// Dependencies that reference no step in this plan, as `(step, missing)`.
    pub fn dangling_dependencies(&self) -> Vec<(u32, u32)> {
        let orders: HashSet<u32> = self.steps.iter().map(|s| s.order).collect();
        self.steps
            .iter()
            .flat_map(|s| {
                s.dependencies
                    .iter()
                    .filter(|d| !orders.contains(d))
                    .map(move |d| (s.order, *d))
            })
            .collect()
    }

    /// Declared dependencies of `order` that have not completed yet.
    pub fn unmet_dependencies(&self, order: u32) -> Vec<u32> {
        let Some(step) = self.step(order) else {
            return Vec::new();
        };
        step.dependencies
            .iter()
            .copied()
            .filter(|d| *d != order)
            .filter(|d| self.step(*d).is_some_and(|dep| !dep.completed))
            .collect()
    }

    /// Compact one-line-per-step listing for prompts and status output.
    pub fn outline(&self) -> String {
        self.steps
            .iter()
            .map(|s| {
                let mut line = format!("{}. [{}] {}", s.order, s.step_type, s.description);
                if !s.files.is_empty() {
                    line.push_str(&format!(" (files: {})", s.files.join(", ")));
                }
                if s.completed {
                    line.push_str(" ✓");
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ── Lenient field decoders ────────────────────────────────────────────────

fn value_to_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(|n| n.min(u32::MAX as u64) as u32)
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u32)),
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_u32(&value).unwrap_or(0))
}

fn lenient_orders<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().filter_map(value_to_u32).collect(),
        Value::String(s) => s
            .split(|c: char| !c.is_ascii_digit())
            .filter_map(|tok| tok.parse().ok())
            .collect(),
        other => value_to_u32(&other).into_iter().collect(),
    })
}

fn lenient_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
