//! `watch`: follow a board's live channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mfgsuite_sync::{
    BoardStore, ChannelEvent, LiveTransport, SchedulerSession, StoreEvent, WsTransport,
};
use tracing::info;

use super::Backend;

pub async fn watch(backend: &Backend, limit: Option<Duration>) -> Result<()> {
    let Some(base) = backend.live_base.clone() else {
        anyhow::bail!("The demo board has no live channel; `watch` needs a server.");
    };
    let transport: Arc<dyn LiveTransport> = Arc::new(WsTransport::new(base));
    let session = SchedulerSession::start(
        backend.session_config(false),
        backend.source.clone(),
        backend.credentials.clone(),
        Some(transport),
    )
    .await?;

    let store = session.store().clone();
    let reader = Arc::downgrade(&store);
    store.subscribe(move |event| {
        if let Some(store) = reader.upgrade() {
            if let Some(line) = describe(&store, event) {
                println!("{}", line);
            }
        }
    });

    let board = store.snapshot();
    println!(
        "Watching board \"{}\" ({} operations). Ctrl-C to stop.",
        board.id,
        board.operations.len()
    );

    match limit {
        Some(d) => {
            tokio::select! {
                _ = tokio::time::sleep(d) => {}
                r = tokio::signal::ctrl_c() => r?,
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    info!("stopping watch");
    session.shutdown().await;
    Ok(())
}

/// One output line per store event worth showing.
pub fn describe(store: &BoardStore, event: &StoreEvent) -> Option<String> {
    match event {
        StoreEvent::BoardReplaced => {
            let board = store.snapshot();
            Some(format!("snapshot: {} operations", board.operations.len()))
        }
        StoreEvent::OperationChanged { operation_id } => {
            let line = match store.operation(operation_id) {
                Some(op) => format!(
                    "{}: {} {} .. {} {}",
                    op.id,
                    op.work_center_id,
                    op.start.format("%H:%M"),
                    op.end.format("%H:%M"),
                    op.status.as_str()
                ),
                None => format!("{}: removed", operation_id),
            };
            Some(line)
        }
        StoreEvent::SyncFailed {
            operation_id,
            message,
        } => Some(format!("{}: update failed: {}", operation_id, message)),
        StoreEvent::Channel(ChannelEvent::Connected) => Some("connected".to_string()),
        StoreEvent::Channel(ChannelEvent::Disconnected { retry_in }) => Some(format!(
            "disconnected, retrying in {:.1}s",
            retry_in.as_secs_f64()
        )),
        StoreEvent::DeltaQueued { .. } | StoreEvent::GestureChanged => None,
    }
}
