use std::{fs, path::PathBuf, time::Duration as StdDuration};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use time::Duration;

use crate::janitor::SweepPolicy;

/// Command line options for the plugin.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Run with stdio protocol used by the core.
    #[arg(long)]
    pub stdio: bool,
    /// Run a single sweep and exit.
    #[arg(long, conflicts_with = "stdio")]
    pub once: bool,
    /// Path to the resource database.
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Seconds between sweeps.
    #[arg(long)]
    pub interval_secs: Option<u64>,
    /// Enable or disable logging (true/false).
    #[arg(long)]
    pub logging: Option<bool>,
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Login the demo account is provisioned with.
#[derive(Clone, PartialEq, Eq)]
pub struct DemoCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for DemoCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemoCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Runtime configuration resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    /// SQLite database holding the resources.
    pub db_path: PathBuf,
    /// Time between two sweeps.
    pub interval: StdDuration,
    pub policy: SweepPolicy,
    pub demo: DemoCredentials,
    /// Whether verbose logging is enabled.
    pub logging_enabled: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    database: FileDatabase,
    #[serde(default)]
    janitor: FileJanitor,
    #[serde(default)]
    demo: FileDemo,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Deserialize, Default)]
struct FileDatabase {
    path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct FileJanitor {
    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
    #[serde(default = "default_max_age_hours")]
    max_age_hours: i64,
    #[serde(default = "default_idle_grace_minutes")]
    idle_grace_minutes: i64,
}

#[derive(Deserialize)]
struct FileDemo {
    #[serde(default = "default_demo_login")]
    username: String,
    #[serde(default = "default_demo_login")]
    password: String,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

/// One week.
const MAX_INTERVAL_SECS: u64 = 7 * 24 * 3600;
/// Ten years.
const MAX_AGE_HOURS: i64 = 10 * 365 * 24;
/// One year.
const MAX_IDLE_GRACE_MINUTES: i64 = 365 * 24 * 60;

fn default_interval_secs() -> u64 {
    3600
}

fn default_max_age_hours() -> i64 {
    24
}

fn default_idle_grace_minutes() -> i64 {
    60
}

fn default_demo_login() -> String {
    "demo".into()
}

fn default_logging() -> bool {
    true
}

impl Default for FileJanitor {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_age_hours: default_max_age_hours(),
            idle_grace_minutes: default_idle_grace_minutes(),
        }
    }
}

impl Default for FileDemo {
    fn default() -> Self {
        Self {
            username: default_demo_login(),
            password: default_demo_login(),
        }
    }
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("DEMO_JANITOR_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/demo_janitor.toml"));

        let file_cfg = match fs::read(&config_path) {
            Ok(bytes) => {
                let contents = String::from_utf8_lossy(&bytes);
                toml::from_str::<FileConfig>(&contents).with_context(|| {
                    format!("invalid config file {}", config_path.display())
                })?
            }
            Err(_) => FileConfig::default(),
        };

        let mut db_path = file_cfg
            .database
            .path
            .unwrap_or_else(|| default_data_dir().join("demo_janitor.db"));
        let mut interval_secs = file_cfg.janitor.interval_secs;
        let mut logging = file_cfg.logging.enabled;

        // environment overrides
        if let Ok(p) = std::env::var("DEMO_JANITOR_DB") {
            db_path = PathBuf::from(p);
        }
        if let Ok(s) = std::env::var("DEMO_JANITOR_INTERVAL_SECS") {
            if let Ok(s) = s.parse::<u64>() {
                interval_secs = s;
            }
        }
        if let Ok(l) = std::env::var("DEMO_JANITOR_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }

        // CLI overrides
        if let Some(p) = &cli.db {
            db_path = p.clone();
        }
        if let Some(s) = cli.interval_secs {
            interval_secs = s;
        }
        if let Some(l) = cli.logging {
            logging = l;
        }

        if interval_secs == 0 || interval_secs > MAX_INTERVAL_SECS {
            anyhow::bail!("invalid_interval");
        }
        if !(1..=MAX_AGE_HOURS).contains(&file_cfg.janitor.max_age_hours)
            || !(1..=MAX_IDLE_GRACE_MINUTES).contains(&file_cfg.janitor.idle_grace_minutes)
        {
            anyhow::bail!("invalid_sweep_policy");
        }
        if file_cfg.demo.username.trim().is_empty() || file_cfg.demo.password.is_empty() {
            anyhow::bail!("invalid_demo_credentials");
        }

        Ok(Self {
            db_path,
            interval: StdDuration::from_secs(interval_secs),
            policy: SweepPolicy {
                max_age: Duration::hours(file_cfg.janitor.max_age_hours),
                idle_grace: Duration::minutes(file_cfg.janitor.idle_grace_minutes),
            },
            demo: DemoCredentials {
                username: file_cfg.demo.username,
                password: file_cfg.demo.password,
            },
            logging_enabled: logging,
        })
    }
}

/// Determine the default data directory for the plugin.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PLUGIN_DATA_DIR") {
        PathBuf::from(dir)
    } else if let Ok(home) = std::env::var("HOME") {
        let mut p = PathBuf::from(home);
        p.push(".local/share/homecore/plugins/demo_janitor");
        p
    } else {
        PathBuf::from("./demo_janitor_data")
    }
}
