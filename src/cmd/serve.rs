//! Server commands: `pmboard serve` and `pmboard init`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use pmboard::board::server::{ServerConfig, prepare_database, start_server};
use pmboard::config::{BoardConfig, CONFIG_DIR, CONFIG_FILE};

pub async fn cmd_serve(project_dir: PathBuf, config: BoardConfig) -> Result<()> {
    start_server(ServerConfig {
        project_dir,
        board: config,
    })
    .await
}

pub async fn cmd_init(project_dir: &Path, config: &BoardConfig, force: bool) -> Result<()> {
    let config_dir = project_dir.join(CONFIG_DIR);
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    let config_path = config_dir.join(CONFIG_FILE);
    if config_path.exists() && !force {
        println!("Keeping existing {}", config_path.display());
    } else {
        BoardConfig::default().save(&config_path)?;
        println!("Wrote {}", config_path.display());
    }

    let server = ServerConfig {
        project_dir: project_dir.to_path_buf(),
        board: config.clone(),
    };
    prepare_database(&server).await?;
    println!("Database ready at {}", server.db_path().display());
    println!("Initialized pmboard project in {}", project_dir.display());
    Ok(())
}
