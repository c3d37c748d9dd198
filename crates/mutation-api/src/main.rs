use anyhow::Context;
use clap::Parser;
use mutation_api::adapters::{
    CloudTasksQueue, FirestoreStore, HttpLineupOptimizer, HttpScheduleProvider,
};
use mutation_api::config::{Cli, Settings, StoreBackend};
use mutation_api::{AppState, Collaborators, ServiceSettings, create_router};
use mutation_core::impls::InMemoryDocumentStore;
use mutation_core::ports::{DocPath, DocumentStore, GameScheduleProvider, SystemClock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load(Cli::parse())?;
    if let Err(error) = settings.queue.target() {
        warn!(error = %error, "task queue is not fully configured; dispatch will fail");
    }

    let client = reqwest::Client::new();
    let primary_url = settings
        .sports_data
        .primary_url
        .clone()
        .context("sports-data primary url is required")?;
    let optimizer_url = settings
        .optimizer
        .url
        .clone()
        .context("lineup optimizer url is required")?;

    let primary = Arc::new(HttpScheduleProvider::new("primary", primary_url, client.clone()));
    let fallback: Arc<dyn GameScheduleProvider> = match &settings.sports_data.fallback_url {
        Some(url) => Arc::new(HttpScheduleProvider::new("fallback", url, client.clone())),
        None => primary.clone(),
    };

    let store = open_store(&settings, client.clone())?;

    let collaborators = Collaborators {
        store,
        queue: Arc::new(CloudTasksQueue::new(
            client.clone(),
            settings.cloud_tasks.endpoint.clone(),
            settings.cloud_tasks.access_token.clone(),
        )),
        primary_schedule: primary.clone(),
        fallback_schedule: fallback,
        starting_players: primary,
        optimizer: Arc::new(HttpLineupOptimizer::new(optimizer_url, client)),
        clock: Arc::new(SystemClock),
    };
    let state = AppState::wire(collaborators, &ServiceSettings::from(&settings))?;
    let app = create_router(state);

    let addr: SocketAddr = settings
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", settings.listen))?;
    info!(%addr, tz = %settings.dispatch.reference_tz, "mutation-api listening");

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn open_store(
    settings: &Settings,
    client: reqwest::Client,
) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let store = &settings.store;
    match store.backend {
        StoreBackend::Firestore => {
            let project_id = store
                .project_id
                .as_deref()
                .context("firestore project id is required")?;
            info!(project_id, database = %store.database, "using firestore store");
            Ok(Arc::new(FirestoreStore::new(
                client,
                &store.endpoint,
                project_id,
                &store.database,
                store.access_token.clone(),
            )))
        }
        StoreBackend::Memory => {
            warn!("in-memory store: limits and task records are not shared between instances");
            let memory = InMemoryDocumentStore::new();
            if let Some(path) = &settings.store_seed {
                let count = seed_store(&memory, path)?;
                info!(documents = count, path = %path.display(), "store seeded");
            }
            Ok(Arc::new(memory))
        }
    }
}

/// Load `{"collection/id": document}` into the store.
fn seed_store(store: &InMemoryDocumentStore, path: &Path) -> anyhow::Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let docs: BTreeMap<String, Value> =
        serde_json::from_str(&text).context("seed file must be a JSON object")?;
    let count = docs.len();
    for (key, doc) in docs {
        let (collection, id) = key
            .split_once('/')
            .with_context(|| format!("seed key {key} is not collection/id"))?;
        store.insert(DocPath::new(collection, id), doc);
    }
    Ok(count)
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
