// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use cc_config::CoordConfig;
use cc_daemon::{build_app, AppState};
use cc_orchestrator::Orchestrator;
use cc_runner::Runner;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cc-daemon", version, about = "Codex Coordinator daemon")]
struct Args {
    /// Bind address; overrides `CC_BIND` and the built-in default.
    #[arg(long)]
    bind: Option<String>,

    /// Directory to start repo-root discovery from.
    #[arg(long, default_value = ".")]
    start_dir: PathBuf,

    /// Enable verbose debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("cc=debug")
    } else {
        EnvFilter::new("cc=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = CoordConfig::from_env().context("load configuration from environment")?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let repo_root = cc_paths::find_repo_root(&args.start_dir);
    let agent_home = cc_paths::resolve_agent_home(&repo_root);
    std::fs::create_dir_all(&agent_home)
        .with_context(|| format!("create agent home {}", agent_home.display()))?;

    let runner = Arc::new(Runner::new(config.agent_binary.clone()));
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&runner)));

    let state = Arc::new(AppState {
        runner,
        orchestrator,
        repo_root: repo_root.clone(),
        agent_home: agent_home.clone(),
        config,
    });

    let app = build_app(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(&state.config.bind)
        .await
        .with_context(|| format!("bind {}", state.config.bind))?;
    info!(
        bind = %state.config.bind,
        repo_root = %repo_root.display(),
        agent_home = %agent_home.display(),
        "cc-daemon listening"
    );

    axum::serve(listener, app).await.context("serve")
}
