//! `localcoder init`: write `.localcoder/config.toml` and a rules template.

use localcoder_config::AppConfig;
use localcoder_core::persona::RULES_FILE;
use std::path::{Path, PathBuf};

use crate::app::{CliResult, project_root};

const RULES_TEMPLATE: &str = "\
# Project rules

Every persona sees these rules appended to its system prompt.

- Follow the existing code style.
- Keep changes small and focused.
";

pub async fn run(root: Option<PathBuf>, force: bool) -> CliResult {
    let root = project_root(root)?;
    let dir = AppConfig::project_dir(&root);
    tokio::fs::create_dir_all(&dir).await?;

    write_unless_present(&AppConfig::project_config_path(&root), &AppConfig::default_toml(), force)
        .await?;
    write_unless_present(&dir.join(RULES_FILE), RULES_TEMPLATE, force).await?;

    println!("\nEdit the files above, then run `localcoder doctor` to check the backend.");
    Ok(())
}

async fn write_unless_present(path: &Path, content: &str, force: bool) -> CliResult {
    if path.exists() && !force {
        println!("  ⏭️  {} exists (use --force to overwrite)", path.display());
        return Ok(());
    }
    tokio::fs::write(path, content).await?;
    println!("  ✅ Wrote {}", path.display());
    Ok(())
}
