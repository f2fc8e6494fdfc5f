//! Plan and review documents written under the project root.
//!
//! Failures here are reported on the event bus and never end a run.

use async_trait::async_trait;
use chrono::Local;
use localcoder_config::ArtifactsConfig;
use localcoder_core::document::{artifact_file_name, review_to_document, to_document};
use localcoder_core::error::WorkflowError;
use localcoder_core::event::{DomainEvent, EventBus};
use localcoder_core::plan::Plan;
use localcoder_core::review::Review;
use localcoder_tools::resolve_within;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::orchestrator::{OrchestratorResult, PlanListener};

pub struct ArtifactStore {
    root: PathBuf,
    config: ArtifactsConfig,
    bus: Arc<EventBus>,
    restrict_to_root: bool,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, config: ArtifactsConfig, bus: Arc<EventBus>) -> Self {
        Self {
            root: root.into(),
            config,
            bus,
            restrict_to_root: true,
        }
    }

    /// Allow `/export` targets outside the project root.
    pub fn with_restrict_to_root(mut self, restrict: bool) -> Self {
        self.restrict_to_root = restrict;
        self
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.root.join(&self.config.plans_dir)
    }

    pub fn reviews_dir(&self) -> PathBuf {
        self.root.join(&self.config.reviews_dir)
    }

    /// Write the plan document under the plans directory.
    pub async fn save_plan(&self, plan: &Plan) -> Result<PathBuf, WorkflowError> {
        let path = unique_path(&self.plans_dir(), &artifact_file_name(&plan.goal, Local::now()));
        write_document(&path, &to_document(plan)).await?;
        Ok(path)
    }

    /// Write a review document under the reviews directory.
    pub async fn save_review(&self, goal: &str, review: &Review) -> Result<PathBuf, WorkflowError> {
        let path = unique_path(&self.reviews_dir(), &artifact_file_name(goal, Local::now()));
        write_document(&path, &review_to_document(goal, review)).await?;
        Ok(path)
    }

    /// Write the review of one step, titled and named after the goal and step.
    pub async fn save_step_review(
        &self,
        goal: &str,
        order: u32,
        review: &Review,
    ) -> Result<PathBuf, WorkflowError> {
        self.save_review(&format!("{goal} step {order}"), review).await
    }

    /// Write the plan document to `target` (relative to the root), or to a
    /// fresh name in the plans directory. Runs even when automatic
    /// artifacts are disabled.
    pub async fn export_plan(&self, plan: &Plan, target: Option<&str>) -> Result<PathBuf, WorkflowError> {
        match target {
            Some(target) => {
                let path = if self.restrict_to_root {
                    resolve_within(&self.root, target).map_err(|e| WorkflowError::Persistence {
                        path: target.to_string(),
                        reason: e.to_string(),
                    })?
                } else {
                    self.root.join(target)
                };
                write_document(&path, &to_document(plan)).await?;
                Ok(path)
            }
            None => self.save_plan(plan).await,
        }
    }

    /// Report the outcome of an automatic save.
    fn report(&self, kind: &str, saved: Result<PathBuf, WorkflowError>) {
        match saved {
            Ok(path) => {
                info!(kind, path = %path.display(), "Artifact saved");
                self.bus.publish(DomainEvent::ArtifactSaved {
                    kind: kind.to_string(),
                    path: path.display().to_string(),
                });
            }
            Err(e) => {
                warn!(kind, error = %e, "Could not save artifact");
                self.bus.publish(DomainEvent::ArtifactFailed {
                    kind: kind.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[async_trait]
impl PlanListener for ArtifactStore {
    async fn on_plan_created(&self, plan: &Plan) {
        if self.config.enabled {
            let saved = self.save_plan(plan).await;
            self.report("plan", saved);
        }
    }

    async fn on_run_finished(&self, result: &OrchestratorResult) {
        if !self.config.enabled {
            return;
        }
        let Some(plan) = &result.plan else {
            return;
        };
        for (order, review) in &result.reviews {
            let saved = self.save_step_review(&plan.goal, *order, review).await;
            self.report("step review", saved);
        }
        if let Some(review) = &result.final_review {
            let saved = self.save_review(&plan.goal, review).await;
            self.report("review", saved);
        }
    }
}

/// `dir/name`, or `dir/stem-2.ext`, `dir/stem-3.ext`, … when taken.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    (2..)
        .map(|n| {
            if ext.is_empty() {
                dir.join(format!("{stem}-{n}"))
            } else {
                dir.join(format!("{stem}-{n}.{ext}"))
            }
        })
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

async fn write_document(path: &Path, content: &str) -> Result<(), WorkflowError> {
    let persistence = |e: std::io::Error| WorkflowError::Persistence {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(persistence)?;
    }
    tokio::fs::write(path, content).await.map_err(persistence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Outcome;
    use localcoder_core::plan::{Step, StepType};

    fn plan() -> Plan {
        let mut plan = Plan::new("Add JWT auth!");
        plan.steps.push(Step::new(1, "Create model", StepType::Code));
        plan
    }

    fn store(root: &Path, enabled: bool) -> (ArtifactStore, Arc<EventBus>) {
        let bus = Arc::new(EventBus::default());
        let config = ArtifactsConfig {
            enabled,
            ..ArtifactsConfig::default()
        };
        (ArtifactStore::new(root, config, bus.clone()), bus)
    }

    #[tokio::test]
    async fn saves_plan_under_plans_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(dir.path(), true);

        let path = store.save_plan(&plan()).await.unwrap();
        assert!(path.starts_with(dir.path().join("docs/plans")));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("add-jwt-auth!-"), "{name}");
        assert!(name.ends_with(".md"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Plan: Add JWT auth!"));
    }

    #[tokio::test]
    async fn same_second_saves_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let taken = dir.path().join("report.md");
        std::fs::write(&taken, "x").unwrap();
        std::fs::write(dir.path().join("report-2.md"), "x").unwrap();

        assert_eq!(unique_path(dir.path(), "report.md"), dir.path().join("report-3.md"));
        assert_eq!(unique_path(dir.path(), "fresh.md"), dir.path().join("fresh.md"));
    }

    #[tokio::test]
    async fn export_to_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(dir.path(), false);

        let path = store.export_plan(&plan(), Some("out/plan.md")).await.unwrap();
        assert_eq!(path, dir.path().join("out/plan.md"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn export_outside_root_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir(&root).unwrap();
        let (store, _) = store(&root, false);

        let err = store
            .export_plan(&plan(), Some("../../escaped.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Persistence { .. }));
        let outside = dir.path().join("elsewhere.md");
        let err = store
            .export_plan(&plan(), Some(outside.to_str().unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Persistence { .. }));
        assert!(!outside.exists());
    }

    #[tokio::test]
    async fn unrestricted_export_may_leave_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir(&root).unwrap();
        let (store, _) = store(&root, false);
        let store = store.with_restrict_to_root(false);

        let path = store.export_plan(&plan(), Some("../shared.md")).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn failed_save_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the plans directory should be.
        std::fs::write(dir.path().join("docs"), "not a dir").unwrap();
        let (store, bus) = store(dir.path(), true);
        let mut events = bus.subscribe();

        store.on_plan_created(&plan()).await;

        let event = events.recv().await.unwrap();
        assert!(matches!(event.as_ref(), DomainEvent::ArtifactFailed { kind, .. } if kind == "plan"));
    }

    fn review(approved: bool, score: u8) -> Review {
        Review {
            approved,
            score,
            issues: Vec::new(),
            suggestions: Vec::new(),
            summary: "Solid.".into(),
        }
    }

    #[tokio::test]
    async fn final_review_is_saved_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(dir.path(), true);
        let result = OrchestratorResult {
            plan: Some(plan()),
            step_results: Vec::new(),
            reviews: Vec::new(),
            final_review: Some(review(true, 9)),
            outcome: Outcome::Success,
        };

        store.on_run_finished(&result).await;

        let saved: Vec<_> = std::fs::read_dir(store.reviews_dir()).unwrap().collect();
        assert_eq!(saved.len(), 1);
    }

    #[tokio::test]
    async fn step_reviews_are_saved_without_a_final_review() {
        let dir = tempfile::tempdir().unwrap();
        let (store, bus) = store(dir.path(), true);
        let mut events = bus.subscribe();
        let result = OrchestratorResult {
            plan: Some(plan()),
            step_results: Vec::new(),
            reviews: vec![(1, review(true, 8)), (2, review(false, 4))],
            final_review: None,
            outcome: Outcome::Success,
        };

        store.on_run_finished(&result).await;

        let mut names: Vec<String> = std::fs::read_dir(store.reviews_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].starts_with("add-jwt-auth!-step-1-"), "{}", names[0]);
        assert!(names[1].starts_with("add-jwt-auth!-step-2-"), "{}", names[1]);

        let event = events.recv().await.unwrap();
        assert!(matches!(event.as_ref(), DomainEvent::ArtifactSaved { kind, .. } if kind == "step review"));
    }

    #[tokio::test]
    async fn disabled_store_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store(dir.path(), false);
        store.on_plan_created(&plan()).await;
        assert!(!store.plans_dir().exists());
    }
}
