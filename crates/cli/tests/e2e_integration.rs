//! End-to-end tests for the localcoder workflow.
//!
//! These drive a session the way the terminal does: real files on disk in a
//! temp project, a scripted model backend, scripted confirmations.

use std::path::Path;
use std::sync::Arc;

use localcoder_agent::test_helpers::{
    ScriptedConfirmer, ScriptedRunner, SequentialMockProvider, personas, plan_json, review_json,
};
use localcoder_agent::{
    ArtifactStore, Collaborators, OrchestratorConfig, Reply, SessionController,
};
use localcoder_config::ArtifactsConfig;
use localcoder_core::event::{DomainEvent, EventBus};
use localcoder_core::persona::PersonaKind;
use localcoder_tools::{FileListingContext, LocalFileSystem};
use tokio_util::sync::CancellationToken;

struct Harness {
    provider: Arc<SequentialMockProvider>,
    runner: Arc<ScriptedRunner>,
    bus: Arc<EventBus>,
    controller: SessionController,
}

fn harness(root: &Path, responses: Vec<String>, config: OrchestratorConfig) -> Harness {
    let provider = Arc::new(SequentialMockProvider::new(responses));
    let runner = Arc::new(ScriptedRunner::new());
    let bus = Arc::new(EventBus::default());
    let deps = Collaborators {
        provider: provider.clone(),
        fs: Arc::new(LocalFileSystem::new(root, true)),
        runner: runner.clone(),
        confirmer: Arc::new(ScriptedConfirmer::always(true)),
        bus: bus.clone(),
    };
    let controller = SessionController::new(
        deps,
        personas(),
        config,
        Arc::new(FileListingContext::new(root)),
        ArtifactStore::new(root, ArtifactsConfig::default(), bus.clone()),
        20,
    );
    Harness {
        provider,
        runner,
        bus,
        controller,
    }
}

fn files_in(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

// ── Full goal ────────────────────────────────────────────────────────────

#[tokio::test]
async fn goal_writes_files_runs_commands_and_saves_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"demo\"\n").unwrap();

    let responses = vec![
        plan_json("Add a greeting", &[("Create greet module", &["src/greet.rs"])]),
        "Creating the module.\n```rust file: src/greet.rs\npub fn greet() -> &'static str {\n    \"hi\"\n}\n```\n```bash\ncargo check\n```".to_string(),
        review_json(true, &["info"]),
        review_json(true, &[]),
    ];
    let config = OrchestratorConfig {
        auto_approve: false,
        review_enabled: true,
        ..OrchestratorConfig::default()
    };
    let mut h = harness(dir.path(), responses, config);
    let mut events = h.bus.subscribe();
    let cancel = CancellationToken::new();

    let reply = h.controller.handle_input("Add a greeting", &cancel).await;
    assert_eq!(
        reply,
        Reply::Text("Done: 1/1 steps completed. Final review score 8/10.".into())
    );

    let written = std::fs::read_to_string(dir.path().join("src/greet.rs")).unwrap();
    assert!(written.contains("pub fn greet()"));
    assert_eq!(h.runner.commands(), vec!["cargo check"]);
    assert_eq!(h.provider.call_count(), 4);

    // The planner saw the project listing
    let planning = &h.provider.requests()[0].messages[1].content;
    assert!(planning.contains("Cargo.toml"));

    assert_eq!(files_in(&dir.path().join("docs/plans")).len(), 1);
    // One per-step review and the final review
    assert_eq!(files_in(&dir.path().join("docs/reviews")).len(), 2);

    let mut saved = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::ArtifactSaved { kind, .. } = event.as_ref() {
            saved.push(kind.clone());
        }
    }
    assert_eq!(saved, vec!["plan", "step review", "review"]);
}

#[tokio::test]
async fn write_outside_the_project_fails_the_step() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("project");
    std::fs::create_dir(&root).unwrap();

    let responses = vec![
        plan_json("Escape", &[("Write outside", &[])]),
        "```file: ../outside.txt\nnope\n```".to_string(),
    ];
    let config = OrchestratorConfig {
        auto_approve: true,
        ..OrchestratorConfig::default()
    };
    let mut h = harness(&root, responses, config);

    let reply = h
        .controller
        .handle_input("Escape", &CancellationToken::new())
        .await;
    match reply {
        Reply::Text(text) => assert!(text.starts_with("Failed: Step 1 failed"), "{text}"),
        other => panic!("unexpected reply {other:?}"),
    }
    assert!(!dir.path().join("outside.txt").exists());
}

// ── Plan documents ───────────────────────────────────────────────────────

#[tokio::test]
async fn exported_plan_can_be_imported_and_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let responses = vec![
        plan_json(
            "Write docs",
            &[("Write README", &["README.md"]), ("Write CHANGELOG", &["CHANGELOG.md"])],
        ),
        "```markdown file: README.md\n# demo\n```".to_string(),
        "```markdown file: CHANGELOG.md\n# Changes\n```".to_string(),
    ];
    let config = OrchestratorConfig {
        auto_approve: true,
        ..OrchestratorConfig::default()
    };
    let mut h = harness(dir.path(), responses, config);
    let cancel = CancellationToken::new();

    let reply = h.controller.handle_input("Write docs", &cancel).await;
    assert_eq!(reply, Reply::Text("Done: 2/2 steps completed.".into()));

    let reply = h.controller.handle_input("/export saved-plan.md", &cancel).await;
    match reply {
        Reply::Text(text) => assert!(text.starts_with("Plan exported to"), "{text}"),
        other => panic!("unexpected reply {other:?}"),
    }
    let document = std::fs::read_to_string(dir.path().join("saved-plan.md")).unwrap();
    assert!(document.contains("Write docs"));

    let reply = h.controller.handle_input("/export ../escaped.md", &cancel).await;
    match reply {
        Reply::Text(text) => assert!(text.starts_with("Export failed"), "{text}"),
        other => panic!("unexpected reply {other:?}"),
    }
    assert!(!dir.path().parent().unwrap().join("escaped.md").exists());

    let reply = h.controller.handle_input("/import saved-plan.md", &cancel).await;
    assert_eq!(
        reply,
        Reply::Text("Imported plan: Write docs (2 steps, 2 completed)".into())
    );

    // Everything is already done, so running it asks the model nothing
    let reply = h.controller.handle_input("/run", &cancel).await;
    assert_eq!(reply, Reply::Text("Done: 2/2 steps completed.".into()));
    assert_eq!(h.provider.call_count(), 3);
}

// ── Session ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn persona_switch_routes_to_chat() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        dir.path(),
        vec!["Use a HashMap.".to_string()],
        OrchestratorConfig::default(),
    );
    let cancel = CancellationToken::new();

    let reply = h.controller.handle_input("/persona reviewer", &cancel).await;
    assert_eq!(reply, Reply::Text("Switched to reviewer.".into()));
    assert_eq!(h.controller.session().persona, PersonaKind::Reviewer);

    let reply = h
        .controller
        .handle_input("How should I store sessions?", &cancel)
        .await;
    assert_eq!(reply, Reply::Silent);
    assert_eq!(h.controller.session().history_len(), 1);
    assert_eq!(h.provider.requests()[0].model, "test-model");

    assert_eq!(h.controller.handle_input("/exit", &cancel).await, Reply::Exit);
    assert!(!h.controller.is_running());
}

#[tokio::test]
async fn cancelled_goal_leaves_the_session_usable() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        dir.path(),
        vec![plan_json("Never", &[("x", &[])])],
        OrchestratorConfig::default(),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let reply = h.controller.handle_input("Never", &cancel).await;
    assert_eq!(reply, Reply::Text("Cancelled (0/0 steps completed).".into()));
    assert!(h.controller.is_running());

    let reply = h
        .controller
        .handle_input("/help", &CancellationToken::new())
        .await;
    assert!(matches!(reply, Reply::Text(text) if text.contains("/persona")));
}
