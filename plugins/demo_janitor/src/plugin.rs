use anyhow::{Context, Result};
use tracing::info;

use crate::{
    config::Config,
    core_bridge, db, demo,
    janitor::{run_cleanup, spawn_periodic, Janitor},
    seed,
    store::Store,
};

/// How the plugin was asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Driven by the homecore stdio protocol and its timer ticks.
    Stdio,
    /// Sweep once and exit.
    Once,
    /// Own interval timer until Ctrl+C.
    Standalone,
}

/// Open the database, install the demo data and build the janitor.
pub fn prepare(cfg: &Config) -> Result<Janitor> {
    if let Some(dir) = cfg.db_path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
    }
    let pool = db::init_pool(&cfg.db_path)
        .with_context(|| format!("opening {}", cfg.db_path.display()))?;
    let store = demo::install_hooks(Store::builder(pool)).build();
    seed::install(&store).context("installing demo data")?;
    seed::install_credentials(&store, &cfg.demo.username, &cfg.demo.password)
        .context("setting demo credentials")?;
    Ok(Janitor::new(store, cfg.policy))
}

/// Entry point for running the plugin in the requested mode.
pub async fn run(mode: Mode, cfg: Config) -> Result<()> {
    let prep = cfg.clone();
    let janitor = tokio::task::spawn_blocking(move || prepare(&prep)).await??;
    match mode {
        Mode::Stdio => core_bridge::run_stdio(janitor, cfg.interval).await,
        Mode::Once => {
            let report = run_cleanup(janitor).await.context("sweep failed")?;
            println!(
                "candidates={} deleted={} skipped={}",
                report.candidates, report.deleted, report.skipped
            );
            Ok(())
        }
        Mode::Standalone => {
            let handle = spawn_periodic(janitor, cfg.interval);
            info!(every_secs = cfg.interval.as_secs(), "janitor running - press Ctrl+C to exit");
            tokio::signal::ctrl_c().await?;
            handle.abort();
            Ok(())
        }
    }
}
