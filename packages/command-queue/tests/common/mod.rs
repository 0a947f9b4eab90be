#![allow(dead_code)]

pub mod harness;

use std::sync::Arc;
use std::time::Duration;

use command_queue::{
    Command, CommandCatalog, CommandId, CommandRecord, CommandService, CommandStatus,
    CommandStore, ExecutorConfig, InMemoryCommandStore,
};
use serde::{Deserialize, Serialize};

pub use harness::TestHarness;

// ============================================================================
// Test commands
// ============================================================================

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RefreshSeries {
    pub series_id: Option<i64>,
}

impl Command for RefreshSeries {
    const NAME: &'static str = "RefreshSeries";

    fn send_updates_to_client(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RssSync {}

impl Command for RssSync {
    const NAME: &'static str = "RssSync";
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DownloadEpisode {
    pub episode_id: i64,
}

impl Command for DownloadEpisode {
    const NAME: &'static str = "DownloadEpisode";
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Backup {}

impl Command for Backup {
    const NAME: &'static str = "Backup";

    fn priority(&self) -> command_queue::CommandPriority {
        command_queue::CommandPriority::High
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Housekeeping {}

impl Command for Housekeeping {
    const NAME: &'static str = "Housekeeping";

    fn priority(&self) -> command_queue::CommandPriority {
        command_queue::CommandPriority::Low
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn catalog() -> CommandCatalog {
    let mut catalog = CommandCatalog::new();
    catalog.register::<RefreshSeries>().expect("register RefreshSeries");
    catalog.register::<RssSync>().expect("register RssSync");
    catalog.register::<DownloadEpisode>().expect("register DownloadEpisode");
    catalog.register::<Backup>().expect("register Backup");
    catalog.register::<Housekeeping>().expect("register Housekeeping");
    catalog
}

pub fn memory_service() -> (Arc<InMemoryCommandStore>, Arc<CommandService>) {
    let store = Arc::new(InMemoryCommandStore::new());
    let service = CommandService::new(store.clone(), catalog()).into_shared();
    (store, service)
}

/// Small pool with fast polling for tests.
pub fn fast_executor_config(workers: usize) -> ExecutorConfig {
    ExecutorConfig {
        worker_count: workers,
        poll_interval: Duration::from_millis(20),
        error_backoff: Duration::from_millis(20),
        shutdown_timeout: Duration::from_secs(5),
        executor_id: "test-executor".to_string(),
    }
}

/// Poll until the record reaches `status`, or panic after five seconds.
pub async fn wait_for_status(
    service: &CommandService,
    id: CommandId,
    status: CommandStatus,
) -> CommandRecord {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let record = service.get(id).await.expect("record exists");
        if record.status == status {
            return record;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("command {id} stuck in {} waiting for {status}", record.status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until no record is Queued or Started.
pub async fn wait_until_idle(store: &dyn CommandStore) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let queued = store.find_by_status(CommandStatus::Queued).await.expect("query");
        let started = store.find_by_status(CommandStatus::Started).await.expect("query");
        if queued.is_empty() && started.is_empty() {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("{} queued and {} started commands never drained", queued.len(), started.len());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
