//! `localcoder models`: list installed backend models.

use localcoder_config::AppConfig;
use localcoder_core::provider::Provider;
use localcoder_providers::{OllamaProvider, model_available};
use std::path::PathBuf;

use crate::app::{CliResult, project_root};

pub async fn run(root: Option<PathBuf>) -> CliResult {
    let root = project_root(root)?;
    let config = AppConfig::load(&root)?;
    let provider = OllamaProvider::from_config(&config.backend)?;

    let models = provider.list_models().await?;
    if models.is_empty() {
        println!("No models installed on {}.", provider.base_url());
        println!("Pull one with `ollama pull {}`.", config.default_model);
        return Ok(());
    }

    println!("Models on {}:", provider.base_url());
    for model in &models {
        let marker = if model_available(std::slice::from_ref(model), &config.default_model) {
            " (default)"
        } else {
            ""
        };
        println!("  {model}{marker}");
    }
    Ok(())
}
