//! Settings: optional TOML file, then flags / environment on top.
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//!
//! [queue]
//! project_id = "my-project"
//! location = "us-central1"
//! queue_name = "mutations"
//! execution_base_url = "https://mutations.example.com"
//!
//! [dispatch]
//! reference_tz = "America/New_York"
//! midnight_skip_hour = 0
//!
//! [rate_limit]
//! max_tokens = 10
//! window_size_ms = 60000
//!
//! [store]
//! backend = "firestore"
//! database = "(default)"
//! ```

use anyhow::Context;
use chrono_tz::Tz;
use clap::Parser;
use mutation_core::config::{DispatchConfig, QueueConfig, RateLimitConfig};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::adapters::{cloud_tasks, firestore};

#[derive(Debug, Parser)]
#[command(name = "mutation-api", version, about = "Lineup mutation dispatch and execution API")]
pub struct Cli {
    /// TOML settings file.
    #[arg(long, env = "MUTATION_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where the HTTP API listens, e.g. 0.0.0.0:8080
    #[arg(long, env = "MUTATION_LISTEN")]
    pub listen: Option<String>,

    #[arg(long, env = "GCP_PROJECT_ID")]
    pub project_id: Option<String>,

    #[arg(long, env = "TASK_QUEUE_LOCATION")]
    pub queue_location: Option<String>,

    #[arg(long, env = "TASK_QUEUE_NAME")]
    pub queue_name: Option<String>,

    /// Base URL the queue uses to reach this service.
    #[arg(long, env = "MUTATION_API_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, env = "SPORTS_DATA_PRIMARY_URL")]
    pub sports_data_primary_url: Option<String>,

    #[arg(long, env = "SPORTS_DATA_FALLBACK_URL")]
    pub sports_data_fallback_url: Option<String>,

    #[arg(long, env = "LINEUP_OPTIMIZER_URL")]
    pub optimizer_url: Option<String>,

    /// IANA zone that defines "today", e.g. America/New_York
    #[arg(long, env = "REFERENCE_TIMEZONE")]
    pub reference_timezone: Option<String>,

    /// Hour at which set-lineup passes are skipped.
    #[arg(long, env = "MIDNIGHT_SKIP_HOUR", conflicts_with = "no_midnight_skip")]
    pub midnight_skip_hour: Option<u32>,

    /// Disable the rollover-hour guard.
    #[arg(long, default_value_t = false)]
    pub no_midnight_skip: bool,

    #[arg(long, env = "CLOUD_TASKS_ACCESS_TOKEN", hide_env_values = true)]
    pub cloud_tasks_access_token: Option<String>,

    /// Where shared documents live.
    #[arg(long, env = "MUTATION_STORE_BACKEND", value_enum)]
    pub store_backend: Option<StoreBackend>,

    /// Firestore project; defaults to the queue's project.
    #[arg(long, env = "FIRESTORE_PROJECT_ID")]
    pub firestore_project_id: Option<String>,

    #[arg(long, env = "FIRESTORE_DATABASE")]
    pub firestore_database: Option<String>,

    /// Defaults to the Cloud Tasks token.
    #[arg(long, env = "FIRESTORE_ACCESS_TOKEN", hide_env_values = true)]
    pub firestore_access_token: Option<String>,

    /// JSON file of `{"collection/id": document}` loaded into the in-memory store at startup.
    #[arg(long, env = "MUTATION_STORE_SEED")]
    pub store_seed: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SportsDataSettings {
    pub primary_url: Option<String>,
    pub fallback_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudTasksSettings {
    pub endpoint: String,
    pub access_token: Option<String>,
}

impl Default for CloudTasksSettings {
    fn default() -> Self {
        Self {
            endpoint: cloud_tasks::DEFAULT_ENDPOINT.to_string(),
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map; nothing is shared between instances.
    #[default]
    Memory,
    Firestore,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub endpoint: String,
    pub project_id: Option<String>,
    pub database: String,
    pub access_token: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            endpoint: firestore::DEFAULT_ENDPOINT.to_string(),
            project_id: None,
            database: firestore::DEFAULT_DATABASE.to_string(),
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listen: String,
    pub queue: QueueConfig,
    pub dispatch: DispatchConfig,
    pub rate_limit: RateLimitConfig,
    pub sports_data: SportsDataSettings,
    pub optimizer: OptimizerSettings,
    pub cloud_tasks: CloudTasksSettings,
    pub store: StoreSettings,
    pub store_seed: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            queue: QueueConfig::default(),
            dispatch: DispatchConfig::default(),
            rate_limit: RateLimitConfig::default(),
            sports_data: SportsDataSettings::default(),
            optimizer: OptimizerSettings::default(),
            cloud_tasks: CloudTasksSettings::default(),
            store: StoreSettings::default(),
            store_seed: None,
        }
    }
}

fn overlay<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

impl Settings {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid settings file")
    }

    pub fn load(cli: Cli) -> anyhow::Result<Self> {
        let mut settings = match &cli.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        settings.apply(cli)?;
        Ok(settings)
    }

    /// Flags and environment win over the file.
    pub fn apply(&mut self, cli: Cli) -> anyhow::Result<()> {
        if let Some(listen) = cli.listen {
            self.listen = listen;
        }
        overlay(&mut self.queue.project_id, cli.project_id);
        overlay(&mut self.queue.location, cli.queue_location);
        overlay(&mut self.queue.queue_name, cli.queue_name);
        overlay(&mut self.queue.execution_base_url, cli.base_url);
        overlay(&mut self.sports_data.primary_url, cli.sports_data_primary_url);
        overlay(&mut self.sports_data.fallback_url, cli.sports_data_fallback_url);
        overlay(&mut self.optimizer.url, cli.optimizer_url);
        overlay(&mut self.cloud_tasks.access_token, cli.cloud_tasks_access_token);
        overlay(&mut self.store.project_id, cli.firestore_project_id);
        overlay(&mut self.store.access_token, cli.firestore_access_token);
        overlay(&mut self.store_seed, cli.store_seed);
        if let Some(backend) = cli.store_backend {
            self.store.backend = backend;
        }
        if let Some(database) = cli.firestore_database {
            self.store.database = database;
        }
        if self.store.project_id.is_none() {
            self.store.project_id = self.queue.project_id.clone();
        }
        if self.store.access_token.is_none() {
            self.store.access_token = self.cloud_tasks.access_token.clone();
        }
        if self.store.backend == StoreBackend::Firestore {
            anyhow::ensure!(
                self.store.project_id.is_some(),
                "the firestore store needs a project id"
            );
            anyhow::ensure!(
                self.store_seed.is_none(),
                "a store seed only applies to the in-memory store"
            );
        }
        if let Some(zone) = cli.reference_timezone {
            self.dispatch.reference_tz = zone
                .parse::<Tz>()
                .map_err(|e| anyhow::anyhow!("invalid reference timezone {zone}: {e}"))?;
        }
        if cli.no_midnight_skip {
            self.dispatch.midnight_skip_hour = None;
        } else if let Some(hour) = cli.midnight_skip_hour {
            anyhow::ensure!(hour < 24, "midnight skip hour must be 0-23, got {hour}");
            self.dispatch.midnight_skip_hour = Some(hour);
        }
        Ok(())
    }
}
