//! Progress messages raised through `tracing` inside handlers.
//!
//! These run on a current-thread runtime so the subscriber installed with
//! `set_default` is the one the executor's workers log through.

mod common;

use std::sync::Arc;
use std::time::Duration;

use command_queue::{CommandExecutor, CommandStatus, HandlerRegistry, ProgressLayer};
use tokio::sync::Notify;
use tracing_subscriber::layer::SubscriberExt;

use common::{RefreshSeries, RssSync, fast_executor_config, memory_service, wait_for_status};

async fn scan_library(reported: Arc<Notify>, release: Arc<Notify>) {
    tracing::info!(progress = true, "Scanning {} of {} folders", 2, 5);
    reported.notify_one();
    release.notified().await;
}

#[tokio::test]
async fn logged_progress_reaches_message_cache_and_events() {
    let (layer, broadcast) = ProgressLayer::new();
    let subscriber = tracing_subscriber::registry().with(layer);
    let _guard = tracing::subscriber::set_default(subscriber);

    let (_store, service) = memory_service();
    let _broadcast = broadcast.spawn(service.clone());
    let mut events = service.events().subscribe();

    let reported = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let mut registry = HandlerRegistry::new();
    let (reported_tx, release_rx) = (reported.clone(), release.clone());
    registry
        .register::<RefreshSeries, _, _>(move |_cmd, _ctx| {
            let reported = reported_tx.clone();
            let release = release_rx.clone();
            async move {
                // Progress logged from a nested function, no context in hand.
                scan_library(reported, release).await;
                Ok(())
            }
        })
        .unwrap();

    let handle = CommandExecutor::new(service.clone(), registry)
        .with_config(fast_executor_config(1))
        .start()
        .await
        .unwrap();

    let record = service.enqueue(RefreshSeries { series_id: Some(7) }).await.unwrap();
    reported.notified().await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let current = service.get(record.id).await.unwrap();
        if current.message.as_deref() == Some("Scanning 2 of 5 folders") {
            assert_eq!(current.status, CommandStatus::Started);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "progress never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    release.notify_one();
    let done = wait_for_status(&service, record.id, CommandStatus::Completed).await;
    assert_eq!(done.message, None);

    let mut progress_events = 0;
    while let Ok(event) = events.try_recv() {
        if event.resource().message.as_deref() == Some("Scanning 2 of 5 folders") {
            progress_events += 1;
        }
    }
    assert_eq!(progress_events, 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn quiet_commands_ignore_progress_logs() {
    let (layer, broadcast) = ProgressLayer::new();
    let subscriber = tracing_subscriber::registry().with(layer);
    let _guard = tracing::subscriber::set_default(subscriber);

    let (_store, service) = memory_service();
    let _broadcast = broadcast.spawn(service.clone());

    let observed = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let mut registry = HandlerRegistry::new();
    let (observed_tx, release_rx) = (observed.clone(), release.clone());
    registry
        .register::<RssSync, _, _>(move |_cmd, _ctx| {
            let observed = observed_tx.clone();
            let release = release_rx.clone();
            async move {
                tracing::info!(progress = true, "Fetching feeds");
                observed.notify_one();
                release.notified().await;
                Ok(())
            }
        })
        .unwrap();

    let handle = CommandExecutor::new(service.clone(), registry)
        .with_config(fast_executor_config(1))
        .start()
        .await
        .unwrap();

    let record = service.enqueue(RssSync {}).await.unwrap();
    observed.notified().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let running = service.get(record.id).await.unwrap();
    assert_eq!(running.status, CommandStatus::Started);
    assert_eq!(running.message, None);

    release.notify_one();
    wait_for_status(&service, record.id, CommandStatus::Completed).await;
    handle.shutdown().await;
}
