//! `localcoder doctor`: diagnose config and backend health.

use localcoder_config::AppConfig;
use localcoder_core::error::ProviderError;
use localcoder_core::persona::{PersonaKind, RULES_FILE};
use localcoder_core::provider::Provider;
use localcoder_providers::{OllamaProvider, model_available};
use std::path::PathBuf;

use crate::app::{CliResult, project_root};

pub async fn run(root: Option<PathBuf>, model: Option<String>) -> CliResult {
    println!("🩺 localcoder doctor");
    println!("====================\n");

    let mut issues = 0;
    let root = project_root(root)?;
    println!("  ✅ Project root {}", root.display());

    let project_config = AppConfig::project_config_path(&root);
    if project_config.exists() {
        println!("  ✅ Project config {}", project_config.display());
    } else {
        println!("  ⚠️  No project config; run `localcoder init` (using defaults)");
    }

    let mut config = match AppConfig::load(&root) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. See above for details.");
            return Ok(());
        }
    };
    if let Some(model) = model {
        config.default_model = model;
    }

    if AppConfig::project_dir(&root).join(RULES_FILE).exists() {
        println!("  ✅ Project rules loaded");
    }

    let provider = OllamaProvider::from_config(&config.backend)?;
    match provider.probe().await {
        Ok(()) => println!("  ✅ Backend reachable at {}", provider.base_url()),
        Err(e) => {
            println!("  ❌ {}", backend_hint(&e));
            issues += 1;
        }
    }

    if issues == 0 {
        match provider.list_models().await {
            Ok(models) => {
                for kind in PersonaKind::ALL {
                    let wanted = config.model_for(kind);
                    if model_available(&models, wanted) {
                        println!("  ✅ {kind} model {wanted} installed");
                    } else {
                        println!("  ❌ {kind} model {wanted} missing; run `ollama pull {wanted}`");
                        issues += 1;
                    }
                }
            }
            Err(e) => {
                println!("  ❌ Could not list models: {e}");
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}

fn backend_hint(error: &ProviderError) -> String {
    match error {
        ProviderError::ConnectionRefused(url) => {
            format!("Nothing listening at {url}; start it with `ollama serve`")
        }
        ProviderError::HostUnresolved(url) => {
            format!("Cannot resolve the host in {url}; check backend.base_url")
        }
        ProviderError::Timeout(url) => format!("{url} did not answer in time"),
        other => format!("Backend check failed: {other}"),
    }
}
