//! Markdown documents for plans and reviews.
//!
//! [`to_document`] and [`from_document`] form a practical round trip: goal,
//! complexity, estimated time, and each step's description, type, files, and
//! dependencies survive. Step orders are always reassigned 1..N on import so a
//! human can add, drop, or reorder steps without renumbering by hand.

use chrono::{DateTime, Local};
use std::fmt::Write as _;

use crate::error::WorkflowError;
use crate::plan::{Complexity, Plan, Step, StepType};
use crate::review::{Review, Severity};

/// Longest goal prefix used for artifact slugs.
pub const SLUG_MAX_CHARS: usize = 50;

// ── Export ────────────────────────────────────────────────────────────────

/// Render a plan as an editable Markdown document.
pub fn to_document(plan: &Plan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Plan: {}\n", plan.goal);
    let _ = writeln!(out, "**Goal:** {}", plan.goal);
    let _ = writeln!(out, "**Complexity:** {}", plan.complexity);
    if !plan.estimated_time.trim().is_empty() {
        let _ = writeln!(out, "**Estimated Time:** {}", plan.estimated_time.trim());
    }
    let _ = writeln!(
        out,
        "**Progress:** {}/{} steps completed",
        plan.completed_steps(),
        plan.total_steps()
    );

    if !plan.context.trim().is_empty() {
        let _ = writeln!(out, "\n## Context\n\n{}", plan.context.trim());
    }

    let _ = writeln!(out, "\n## Steps");
    for step in &plan.steps {
        let _ = writeln!(out, "\n### Step {}: {}\n", step.order, step.description);
        let _ = writeln!(out, "- **Type:** {}", step.step_type);
        if step.estimated_minutes > 0 {
            let _ = writeln!(out, "- **Estimated:** {} min", step.estimated_minutes);
        }
        if !step.files.is_empty() {
            let _ = writeln!(out, "- **Files:**");
            for file in &step.files {
                let _ = writeln!(out, "  - `{file}`");
            }
        }
        if !step.dependencies.is_empty() {
            let deps: Vec<String> = step.dependencies.iter().map(u32::to_string).collect();
            let _ = writeln!(out, "- **Dependencies:** Steps {}", deps.join(", "));
        }
        let _ = writeln!(out, "- **Status:** {}", step.status_label());
        if let Some(result) = step.result.as_deref().filter(|r| !r.trim().is_empty()) {
            let _ = writeln!(out, "- **Result:** {}", single_line(result));
        }
    }
    out
}

/// Render a review as a Markdown record.
pub fn review_to_document(goal: &str, review: &Review) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Review: {goal}\n");
    let _ = writeln!(
        out,
        "**Approved:** {}",
        if review.approved { "yes" } else { "no" }
    );
    let _ = writeln!(out, "**Score:** {}/10", review.score);
    let _ = writeln!(
        out,
        "**Issues:** {} critical, {} warning, {} info",
        review.critical_count(),
        review.warning_count(),
        review.info_count()
    );

    if !review.summary.trim().is_empty() {
        let _ = writeln!(out, "\n## Summary\n\n{}", review.summary.trim());
    }

    if !review.issues.is_empty() {
        let _ = writeln!(out, "\n## Issues");
        for (heading, severity) in [
            ("Critical", Severity::Critical),
            ("Warning", Severity::Warning),
            ("Info", Severity::Info),
        ] {
            let group: Vec<_> = review
                .issues
                .iter()
                .filter(|i| i.severity.effective() == severity)
                .collect();
            if group.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n### {heading}\n");
            for issue in group {
                let mut line = format!("- **[{}]** {}", issue.category, issue.message);
                if let Severity::Unknown(raw) = &issue.severity {
                    line.push_str(&format!(" _(severity: {raw})_"));
                }
                if let Some(location) = issue.location() {
                    line.push_str(&format!(" (`{location}`)"));
                }
                let _ = writeln!(out, "{line}");
                if let Some(suggestion) = &issue.suggestion {
                    let _ = writeln!(out, "  - Suggestion: {suggestion}");
                }
            }
        }
    }

    if !review.suggestions.is_empty() {
        let _ = writeln!(out, "\n## Suggestions\n");
        for suggestion in &review.suggestions {
            let _ = writeln!(out, "- {suggestion}");
        }
    }
    out
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Import ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Context,
    Steps,
    Other,
}

/// Parse state for the single forward pass over the document.
struct DocumentParser {
    plan: Plan,
    title_goal: Option<String>,
    section: Section,
    context: Vec<String>,
    step: Option<Step>,
    in_files: bool,
}

impl DocumentParser {
    fn new() -> Self {
        Self {
            plan: Plan::new(String::new()),
            title_goal: None,
            section: Section::Preamble,
            context: Vec::new(),
            step: None,
            in_files: false,
        }
    }

    fn finish_step(&mut self) {
        self.in_files = false;
        if let Some(step) = self.step.take() {
            self.plan.steps.push(step);
        }
    }

    fn line(&mut self, raw: &str) {
        let trimmed = raw.trim();

        if let Some(heading) = trimmed.strip_prefix("### ") {
            if let Some(description) = step_heading(heading) {
                self.finish_step();
                self.section = Section::Steps;
                self.step = Some(Step::new(0, description, StepType::default()));
                return;
            }
        }

        if let Some(heading) = trimmed.strip_prefix("## ") {
            self.finish_step();
            self.section = match heading.trim().to_lowercase().as_str() {
                "context" => Section::Context,
                "steps" => Section::Steps,
                _ => Section::Other,
            };
            return;
        }

        if self.section == Section::Context {
            self.context.push(raw.trim_end().to_string());
            return;
        }

        if let Some(title) = trimmed.strip_prefix("# ") {
            let title = title.trim();
            let goal = title
                .strip_prefix("Plan:")
                .map(str::trim)
                .unwrap_or(title);
            self.title_goal.get_or_insert_with(|| goal.to_string());
            return;
        }

        if let Some((label, value)) = bold_label(trimmed) {
            self.in_files = false;
            if self.step.is_some() {
                self.step_label(&label, value);
            } else {
                self.plan_label(&label, value);
            }
            return;
        }

        if self.in_files && raw.starts_with([' ', '\t']) {
            if let Some(file) = file_bullet(trimmed) {
                if let Some(step) = self.step.as_mut() {
                    step.files.push(file);
                }
            }
        }
    }

    fn plan_label(&mut self, label: &str, value: &str) {
        match label {
            "goal" => self.plan.goal = value.to_string(),
            "complexity" => self.plan.complexity = Complexity::from(value.to_string()),
            "estimated time" => self.plan.estimated_time = value.to_string(),
            _ => {}
        }
    }

    fn step_label(&mut self, label: &str, value: &str) {
        let Some(step) = self.step.as_mut() else {
            return;
        };
        match label {
            "type" => step.step_type = StepType::from(value.to_string()),
            "estimated" | "estimated time" => step.estimated_minutes = leading_number(value),
            "files" => {
                self.in_files = true;
                step.files.extend(inline_files(value));
            }
            "dependencies" | "depends on" => step.dependencies = integer_tokens(value),
            "status" => {
                let status = value.to_lowercase();
                step.completed = status.starts_with("completed") || status.starts_with("done");
                step.skipped = status.starts_with("skipped");
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Result<Plan, WorkflowError> {
        self.finish_step();
        if self.plan.goal.trim().is_empty() {
            self.plan.goal = self.title_goal.unwrap_or_default();
        }
        self.plan.context = self.context.join("\n").trim().to_string();
        if self.plan.steps.is_empty() {
            return Err(WorkflowError::NoSteps);
        }
        self.plan.renumber();
        Ok(self.plan)
    }
}

/// Parse a Markdown plan document.
///
/// Fails with [`WorkflowError::NoSteps`] when the document contains no
/// `### Step N: ...` headings.
pub fn from_document(text: &str) -> Result<Plan, WorkflowError> {
    let mut parser = DocumentParser::new();
    for line in text.lines() {
        parser.line(line);
    }
    parser.finish()
}

/// `Step 3: Do the thing` → `Do the thing`.
fn step_heading(heading: &str) -> Option<String> {
    let heading = heading.trim();
    let keyword = heading.get(..4)?;
    let next = heading[4..].chars().next();
    if !keyword.eq_ignore_ascii_case("step")
        || !next.is_some_and(|c| c == ':' || c.is_whitespace() || c.is_ascii_digit())
    {
        return None;
    }
    let description = match heading.split_once(':') {
        Some((_, after)) => after,
        None => heading[4..].trim_start().trim_start_matches(|c: char| c.is_ascii_digit()),
    };
    Some(description.trim().to_string())
}

/// `- **Files:** x` / `**Goal**: x` → `("files", "x")`.
fn bold_label(line: &str) -> Option<(String, &str)> {
    let line = ["- ", "* ", "+ "]
        .iter()
        .find_map(|bullet| line.strip_prefix(bullet))
        .map(str::trim_start)
        .unwrap_or(line);
    let inner = line.strip_prefix("**")?;
    let close = inner.find("**")?;
    let (label, after) = (&inner[..close], &inner[close + 2..]);
    let (label, value) = match label.strip_suffix(':') {
        Some(label) => (label, after),
        None => (label, after.trim_start().strip_prefix(':')?),
    };
    Some((label.trim().to_lowercase(), value.trim()))
}

/// `- \`src/lib.rs\`` → `src/lib.rs`.
fn file_bullet(line: &str) -> Option<String> {
    let item = line.strip_prefix(['-', '*', '+'])?.trim();
    let item = match item.strip_prefix('`').and_then(|s| s.split_once('`')) {
        Some((path, _)) => path,
        None => item,
    };
    let item = item.trim();
    (!item.is_empty()).then(|| item.to_string())
}

fn inline_files(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_matches('`').trim())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn integer_tokens(value: &str) -> Vec<u32> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter_map(|tok| tok.trim().parse().ok())
        .collect()
}

fn leading_number(value: &str) -> u32 {
    value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

// ── Artifact naming ───────────────────────────────────────────────────────

/// Filesystem-safe slug of a goal.
///
/// Truncate to [`SLUG_MAX_CHARS`], drop invalid characters, collapse
/// whitespace and hyphen runs to a single hyphen, trim hyphens, lowercase.
/// Falls back to `plan` when nothing survives.
pub fn slug(goal: &str) -> String {
    let truncated: String = goal.chars().take(SLUG_MAX_CHARS).collect();
    let cleaned: String = truncated
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') && !c.is_control())
        .collect();

    let mut out = String::with_capacity(cleaned.len());
    for c in cleaned.chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    let out = out.trim_matches('-').to_lowercase();
    if out.is_empty() { "plan".to_string() } else { out }
}

/// `{slug}-{yyyyMMdd-HHmmss}.md`.
pub fn artifact_file_name(goal: &str, at: DateTime<Local>) -> String {
    format!("{}-{}.md", slug(goal), at.format("%Y%m%d-%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{Category, Issue};
    use chrono::TimeZone;

    fn sample_plan() -> Plan {
        let mut plan = Plan::new("Add JWT auth");
        plan.context = "Rust web service.\nUses axum.".into();
        plan.complexity = Complexity::High;
        plan.estimated_time = "2 hours".into();
        plan.steps = vec![
            Step::new(1, "Create user model", StepType::Code)
                .with_files(vec!["src/user.rs".into(), "src/lib.rs".into()]),
            Step::new(2, "Write docs", StepType::Doc),
            Step::new(3, "Add tests", StepType::Test).with_dependencies(vec![1, 2]),
        ];
        plan.steps[0].estimated_minutes = 20;
        plan
    }

    #[test]
    fn round_trip_preserves_content() {
        let plan = sample_plan();
        let parsed = from_document(&to_document(&plan)).unwrap();

        assert_eq!(parsed.goal, plan.goal);
        assert_eq!(parsed.complexity, plan.complexity);
        assert_eq!(parsed.estimated_time, plan.estimated_time);
        assert_eq!(parsed.context, plan.context);
        assert_eq!(parsed.total_steps(), 3);
        for (a, b) in parsed.steps.iter().zip(&plan.steps) {
            assert_eq!(a.description, b.description);
            assert_eq!(a.step_type, b.step_type);
            assert_eq!(a.files, b.files);
            assert_eq!(a.dependencies, b.dependencies);
        }
        assert_eq!(parsed.steps[0].estimated_minutes, 20);
    }

    #[test]
    fn orders_are_reassigned_sequentially() {
        let doc = "# Plan: x\n\n## Steps\n\n### Step 7: first\n\n### Step 3: second\n\n### Step 10: third: with colon\n";
        let plan = from_document(doc).unwrap();
        let orders: Vec<u32> = plan.steps.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(plan.steps[2].description, "third: with colon");
        assert_eq!(plan.goal, "x");
    }

    #[test]
    fn zero_steps_is_an_error() {
        let doc = "# Plan: empty\n\n**Goal:** nothing\n\n## Steps\n";
        assert!(matches!(from_document(doc), Err(WorkflowError::NoSteps)));
        assert!(matches!(from_document(""), Err(WorkflowError::NoSteps)));
    }

    #[test]
    fn step_without_files_omits_files_block() {
        let doc = to_document(&sample_plan());
        let step2 = doc.split("### Step 2").nth(1).unwrap();
        let step2 = step2.split("### Step 3").next().unwrap();
        assert!(!step2.contains("Files:"));
        assert!(doc.contains("  - `src/user.rs`"));
    }

    #[test]
    fn dependencies_keep_only_integers() {
        let doc = "## Steps\n### Step 1: a\n- **Dependencies:** Steps 1, two, 3x, 4\n";
        let plan = from_document(doc).unwrap();
        assert_eq!(plan.steps[0].dependencies, vec![1, 4]);
    }

    #[test]
    fn status_survives_round_trip() {
        let mut plan = sample_plan();
        plan.steps[0].mark_completed("ok");
        plan.steps[1].mark_skipped("not needed");
        let parsed = from_document(&to_document(&plan)).unwrap();
        assert!(parsed.steps[0].completed);
        assert!(parsed.steps[1].skipped);
        assert!(!parsed.steps[2].completed);
    }

    #[test]
    fn hand_edited_labels_are_tolerated() {
        let doc = "\
# Plan: hand written

**Goal**: Ship it
**Complexity:** LOW

## Steps

### Step 1: Configure
* **Type:** configuration
* **Files:** `Cargo.toml`, `build.rs`
";
        let plan = from_document(doc).unwrap();
        assert_eq!(plan.goal, "Ship it");
        assert_eq!(plan.complexity, Complexity::Low);
        assert_eq!(plan.steps[0].step_type, StepType::Config);
        assert_eq!(plan.steps[0].files, vec!["Cargo.toml", "build.rs"]);
    }

    #[test]
    fn slug_sanitizes_goal() {
        assert_eq!(slug("Add JWT auth: login/logout?"), "add-jwt-auth-loginlogout");
        assert_eq!(slug("  --Hello   World--  "), "hello-world");
        assert_eq!(slug("???"), "plan");
        let long = "a".repeat(80);
        assert_eq!(slug(&long).len(), SLUG_MAX_CHARS);
    }

    #[test]
    fn artifact_file_name_format() {
        let at = Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            artifact_file_name("Fix bug", at),
            "fix-bug-20250309-140507.md"
        );
    }

    #[test]
    fn review_document_groups_by_severity() {
        let mut review = Review {
            approved: false,
            score: 5,
            issues: vec![
                Issue::new(Severity::Critical, Category::Security, "secret in logs"),
                Issue::new(Severity::Unknown("nit".into()), Category::Style, "spacing"),
            ],
            suggestions: vec!["rotate keys".into()],
            summary: "Mostly fine".into(),
        };
        review.issues[0].file = Some("src/auth.rs".into());
        review.issues[0].line = Some(3);

        let doc = review_to_document("Add auth", &review);
        assert!(doc.starts_with("# Review: Add auth"));
        assert!(doc.contains("**Score:** 5/10"));
        assert!(doc.contains("### Critical"));
        assert!(doc.contains("`src/auth.rs:3`"));
        assert!(doc.contains("### Info"));
        assert!(doc.contains("(severity: nit)"));
        assert!(doc.contains("- rotate keys"));
        assert!(!doc.contains("### Warning"));
    }
}
