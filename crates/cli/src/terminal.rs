//! Terminal I/O: shared stdin reader, interactive confirmer, event renderer.

use async_trait::async_trait;
use localcoder_core::event::{DomainEvent, WorkflowState};
use localcoder_core::workspace::Confirmer;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{Mutex, broadcast};

/// Lines shown from a proposed file before asking.
const PREVIEW_LINES: usize = 12;

/// One stdin reader shared by the prompt loop and the confirmer.
#[derive(Clone)]
pub struct Input {
    lines: Arc<Mutex<Lines<BufReader<Stdin>>>>,
}

impl Input {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines())),
        }
    }

    /// Print `prompt` and read one line. `None` on end of input.
    pub async fn read_line(&self, prompt: &str) -> std::io::Result<Option<String>> {
        print!("{prompt}");
        std::io::stdout().flush()?;
        self.lines.lock().await.next_line().await
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}

/// Asks on the terminal. End of input counts as "no".
pub struct TerminalConfirmer {
    input: Input,
}

impl TerminalConfirmer {
    pub fn new(input: Input) -> Self {
        Self { input }
    }
}

#[async_trait]
impl Confirmer for TerminalConfirmer {
    async fn confirm(&self, question: &str) -> bool {
        match self.input.read_line(&format!("\n? {question} [y/N] ")).await {
            Ok(Some(answer)) => is_yes(&answer),
            _ => false,
        }
    }

    async fn confirm_write(&self, path: &str, current: Option<&str>, proposed: &str) -> bool {
        println!();
        match current {
            None => println!("  new file {path} ({} lines)", proposed.lines().count()),
            Some(current) => {
                let (added, removed) = line_changes(current, proposed);
                println!("  modify {path} (+{added} -{removed})");
            }
        }
        for line in proposed.lines().take(PREVIEW_LINES) {
            println!("  │ {line}");
        }
        let hidden = proposed.lines().count().saturating_sub(PREVIEW_LINES);
        if hidden > 0 {
            println!("  │ … {hidden} more lines");
        }
        self.confirm(&format!("Write {path}?")).await
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Lines added and removed, counted as a multiset difference.
pub fn line_changes(current: &str, proposed: &str) -> (usize, usize) {
    let mut counts: HashMap<&str, isize> = HashMap::new();
    for line in current.lines() {
        *counts.entry(line).or_default() -= 1;
    }
    for line in proposed.lines() {
        *counts.entry(line).or_default() += 1;
    }
    counts.values().fold((0, 0), |(added, removed), &n| {
        if n > 0 {
            (added + n as usize, removed)
        } else {
            (added, removed + n.unsigned_abs())
        }
    })
}

/// Print engine events until the bus closes.
pub async fn render_events(mut rx: broadcast::Receiver<Arc<DomainEvent>>) {
    let mut mid_line = false;
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if let DomainEvent::ModelFragment { text, .. } = event.as_ref() {
            print!("{text}");
            let _ = std::io::stdout().flush();
            mid_line = !text.ends_with('\n');
            continue;
        }
        if mid_line {
            println!();
            mid_line = false;
        }
        if let Some(line) = describe_event(&event) {
            println!("{line}");
        }
    }
}

/// One display line per event; `None` for events shown elsewhere.
pub fn describe_event(event: &DomainEvent) -> Option<String> {
    Some(match event {
        DomainEvent::StateChanged { state, .. } => match state {
            WorkflowState::Planning => "── planning".into(),
            WorkflowState::FinalReview => "── final review".into(),
            WorkflowState::Reviewing(order) => format!("── reviewing step {order}"),
            _ => return None,
        },
        DomainEvent::PlanCreated { goal, steps, outline } => {
            format!("\nPlan for \"{goal}\" ({steps} steps):\n{outline}")
        }
        DomainEvent::StepStarted {
            order,
            total,
            description,
            ..
        } => format!("\n▶ Step {order}/{total}: {description}"),
        DomainEvent::ModelFragment { .. } => return None,
        DomainEvent::ActionApplied {
            action,
            status,
            detail,
            ..
        } => match detail {
            Some(detail) => format!("  {status}: {action} ({detail})"),
            None => format!("  {status}: {action}"),
        },
        DomainEvent::CommandOutput { line, is_stderr } => {
            let gutter = if *is_stderr { "!" } else { "│" };
            format!("    {gutter} {line}")
        }
        DomainEvent::StepFinished {
            order,
            success,
            duration_ms,
            error,
        } => match (success, error) {
            (true, _) => format!("✓ Step {order} done in {:.1}s", *duration_ms as f64 / 1000.0),
            (false, Some(error)) => format!("✗ Step {order} failed: {error}"),
            (false, None) => format!("✗ Step {order} failed"),
        },
        DomainEvent::ReviewCompleted {
            order,
            approved,
            score,
            critical,
            warnings,
        } => {
            let scope = order.map_or("Final review".to_string(), |o| format!("Review of step {o}"));
            let verdict = if *approved { "approved" } else { "not approved" };
            format!("{scope}: {score}/10, {verdict}, {critical} critical, {warnings} warnings")
        }
        DomainEvent::ReviewSkipped { order, reason } => {
            let scope = order.map_or("final review".to_string(), |o| format!("review of step {o}"));
            format!("Skipped {scope}: {reason}")
        }
        DomainEvent::ArtifactSaved { kind, path } => format!("Saved {kind} to {path}"),
        DomainEvent::ArtifactFailed { kind, reason } => format!("Could not save {kind}: {reason}"),
        DomainEvent::ErrorOccurred { error_message, .. } => format!("Error: {error_message}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_answers() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES \n"));
        assert!(!is_yes(""));
        assert!(!is_yes("nope"));
    }

    #[test]
    fn counts_changed_lines() {
        assert_eq!(line_changes("a\nb\nc\n", "a\nB\nc\nd\n"), (2, 1));
        assert_eq!(line_changes("same\n", "same\n"), (0, 0));
        assert_eq!(line_changes("", "x\ny\n"), (2, 0));
    }

    #[test]
    fn describes_step_and_review_events() {
        let started = DomainEvent::StepStarted {
            order: 2,
            total: 3,
            description: "Add tests".into(),
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(describe_event(&started).unwrap(), "\n▶ Step 2/3: Add tests");

        let review = DomainEvent::ReviewCompleted {
            order: None,
            approved: false,
            score: 4,
            critical: 1,
            warnings: 2,
        };
        assert_eq!(
            describe_event(&review).unwrap(),
            "Final review: 4/10, not approved, 1 critical, 2 warnings"
        );
        assert!(describe_event(&DomainEvent::state(WorkflowState::Done)).is_none());
    }
}
