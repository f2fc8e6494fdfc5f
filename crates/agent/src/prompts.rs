//! Built-in persona prompts and the per-stage user prompts.

use localcoder_config::AppConfig;
use localcoder_core::persona::{Persona, PersonaKind, PersonaSet};
use localcoder_core::plan::{Plan, Step};
use std::fmt::Write as _;

use crate::stages::execution::StepExecutionResult;

pub const PLANNER_PROMPT: &str = r#"You are a senior software engineer who breaks a coding goal into a short, ordered plan.

Respond with ONE JSON object and nothing else. Schema:
{
  "goal": "restated goal",
  "context": "one or two sentences about the relevant parts of the project",
  "complexity": "low" | "medium" | "high",
  "estimated_time": "free text, e.g. 30 minutes",
  "steps": [
    {
      "order": 1,
      "description": "what to do, concrete and self-contained",
      "type": "code" | "test" | "doc" | "config",
      "files": ["relative/path.ext"],
      "dependencies": [],
      "estimated_minutes": 10
    }
  ]
}

Rules:
- Each step must be small enough to implement in one response.
- List every file a step will create or modify, relative to the project root.
- "dependencies" lists the order numbers of earlier steps this step needs.
- Do not write any code in the plan."#;

pub const EXECUTOR_PROMPT: &str = r#"You are a careful software engineer implementing one step of a plan.

To create or replace a file, output its COMPLETE new content in a fenced block whose
info string names the path:

```file: relative/path.ext
...entire file content...
```

To run a shell command, put it in a ```bash block, one command per line.

Rules:
- Always write whole files, never diffs or fragments.
- Only touch files needed for this step.
- Keep explanations short; the fenced blocks are what gets applied."#;

pub const REVIEWER_PROMPT: &str = r#"You are a strict code reviewer.

Respond with ONE JSON object and nothing else. Schema:
{
  "approved": true | false,
  "score": 0-10,
  "issues": [
    {
      "severity": "critical" | "warning" | "info",
      "category": "security" | "bug" | "performance" | "style",
      "message": "what is wrong",
      "file": "relative/path.ext",
      "line": 42,
      "suggestion": "how to fix it"
    }
  ],
  "suggestions": ["general improvement"],
  "summary": "one paragraph verdict"
}

Use "critical" only for problems that must be fixed before continuing."#;

/// Built-in system prompt for a persona.
pub fn builtin_prompt(kind: PersonaKind) -> &'static str {
    match kind {
        PersonaKind::Planner => PLANNER_PROMPT,
        PersonaKind::Executor => EXECUTOR_PROMPT,
        PersonaKind::Reviewer => REVIEWER_PROMPT,
    }
}

/// Resolve all three personas from configuration plus optional project rules.
pub fn build_personas(config: &AppConfig, rules: Option<&str>) -> PersonaSet {
    let resolve = |kind: PersonaKind| {
        let prompt = config
            .personas
            .get(kind)
            .system_prompt
            .clone()
            .unwrap_or_else(|| builtin_prompt(kind).to_string());
        Persona::new(
            kind,
            config.model_for(kind),
            config.temperature_for(kind),
            prompt,
        )
    };
    PersonaSet {
        planner: resolve(PersonaKind::Planner),
        executor: resolve(PersonaKind::Executor),
        reviewer: resolve(PersonaKind::Reviewer),
    }
    .with_rules(rules)
}

pub fn planning_prompt(goal: &str, context: &str) -> String {
    let mut out = format!("## Goal\n\n{goal}\n");
    if !context.trim().is_empty() {
        let _ = write!(out, "\n## Project Context\n\n{}\n", context.trim());
    }
    out.push_str("\nProduce the plan as a single JSON object.");
    out
}

/// Existing file content (or absence) shown to the executor.
pub struct FileSnapshot {
    pub path: String,
    pub content: Option<String>,
    pub truncated: bool,
}

pub fn execution_prompt(plan: &Plan, step: &Step, files: &[FileSnapshot]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Overall Goal\n\n{}\n", plan.goal);
    let _ = writeln!(out, "## Plan\n\n{}\n", plan.outline());
    let _ = writeln!(
        out,
        "## Current Step ({} of {})\n\n{} [{}]",
        step.order,
        plan.total_steps(),
        step.description,
        step.step_type
    );

    if !files.is_empty() {
        let _ = writeln!(out, "\n## Files");
        for file in files {
            match &file.content {
                Some(content) => {
                    let note = if file.truncated { " (truncated)" } else { "" };
                    let _ = writeln!(out, "\n### {}{note}\n```\n{}\n```", file.path, content.trim_end());
                }
                None => {
                    let _ = writeln!(out, "\n### {}\n(does not exist yet)", file.path);
                }
            }
        }
    }

    out.push_str("\nImplement this step now.");
    out
}

pub fn step_review_prompt(plan: &Plan, step: &Step, result: &StepExecutionResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Goal\n\n{}\n", plan.goal);
    let _ = writeln!(out, "## Step {}\n\n{}\n", step.order, step.description);
    let _ = writeln!(out, "## Applied Actions\n");
    if result.actions.is_empty() {
        let _ = writeln!(out, "(none)");
    }
    for action in &result.actions {
        let _ = writeln!(out, "- {action}");
    }
    let _ = writeln!(out, "\n## Implementation\n\n{}", result.response.trim());
    out.push_str("\nReview this step as a single JSON object.");
    out
}

pub fn final_review_prompt(plan: &Plan, results: &[StepExecutionResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Goal\n\n{}\n", plan.goal);
    let _ = writeln!(out, "## Plan\n\n{}\n", plan.outline());
    let _ = writeln!(out, "## Changes");
    for result in results {
        let _ = writeln!(out, "\n### Step {}", result.step.order);
        for action in &result.actions {
            let _ = writeln!(out, "- {action}");
        }
    }
    out.push_str("\nReview the complete change set as a single JSON object.");
    out
}
