//! Personas: the three roles the model plays in the workflow.
//!
//! Each persona resolves to a model, a temperature, and a system prompt.
//! The set is built once from configuration and passed explicitly to the
//! engine; nothing here reads files or environment variables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// File name of the project rules appended to every persona prompt.
pub const RULES_FILE: &str = "RULES.md";

/// Which role a persona plays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaKind {
    #[default]
    Planner,
    Executor,
    Reviewer,
}

impl PersonaKind {
    pub const ALL: [PersonaKind; 3] = [Self::Planner, Self::Executor, Self::Reviewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Executor => "executor",
            Self::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for PersonaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "planner" | "plan" => Ok(Self::Planner),
            "executor" | "exec" | "coder" => Ok(Self::Executor),
            "reviewer" | "review" => Ok(Self::Reviewer),
            other => Err(format!(
                "unknown persona '{other}' (expected planner, executor, or reviewer)"
            )),
        }
    }
}

/// A fully resolved persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub kind: PersonaKind,
    pub model: String,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Persona {
    pub fn new(
        kind: PersonaKind,
        model: impl Into<String>,
        temperature: f32,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            model: model.into(),
            temperature,
            system_prompt: system_prompt.into(),
        }
    }

    /// Append project rules to the system prompt. Blank rules are ignored.
    pub fn with_rules(mut self, rules: Option<&str>) -> Self {
        if let Some(rules) = rules.map(str::trim).filter(|r| !r.is_empty()) {
            self.system_prompt = format!(
                "{}\n\n## Project Rules\n\n{rules}",
                self.system_prompt.trim_end()
            );
        }
        self
    }
}

/// The three personas used by one session.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonaSet {
    pub planner: Persona,
    pub executor: Persona,
    pub reviewer: Persona,
}

impl PersonaSet {
    pub fn get(&self, kind: PersonaKind) -> &Persona {
        match kind {
            PersonaKind::Planner => &self.planner,
            PersonaKind::Executor => &self.executor,
            PersonaKind::Reviewer => &self.reviewer,
        }
    }

    /// Apply the same project rules to every persona.
    pub fn with_rules(self, rules: Option<&str>) -> Self {
        Self {
            planner: self.planner.with_rules(rules),
            executor: self.executor.with_rules(rules),
            reviewer: self.reviewer.with_rules(rules),
        }
    }
}
