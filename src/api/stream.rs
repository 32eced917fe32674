//! Server-sent event streams for new block heights and account history.
//!
//! Each request runs one live session in a background task. Dropping the
//! response stream closes the session's outbound channel, which ends it.

use crate::models::{ActionRecord, BlockHeight};
use crate::state::AppState;
use crate::sync::SessionError;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

const STREAM_BUFFER_SIZE: usize = 32;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn to_event<T: Serialize>(name: &'static str, item: &T) -> Result<Event, Infallible> {
    Ok(Event::default().event(name).json_data(item).unwrap_or_else(|e| {
        warn!("Cannot encode {} event: {}", name, e);
        Event::default().event("error").data(e.to_string())
    }))
}

fn log_session_end(name: &str, end: SessionError) {
    match end {
        SessionError::Cancelled => info!("{} stream closed by client", name),
        other => warn!("{} stream ended: {}", name, other),
    }
}

/// GET /stream/blocks
pub async fn stream_blocks(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<BlockHeight>(STREAM_BUFFER_SIZE);
    let service = state.service.clone();
    let cancel = service.shutdown_token().child_token();

    tokio::spawn(async move {
        if let Err(end) = service.new_block(tx, cancel).await {
            log_session_end("NewBlock", end);
        }
    });

    let stream = ReceiverStream::new(rx).map(|height| to_event("block", &height));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

/// GET /stream/history
pub async fn stream_history(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<ActionRecord>(STREAM_BUFFER_SIZE);
    let service = state.service.clone();
    let cancel = service.shutdown_token().child_token();

    tokio::spawn(async move {
        if let Err(end) = service.new_tx(tx, cancel).await {
            log_session_end("NewTx", end);
        }
    });

    let stream = ReceiverStream::new(rx).map(|record| to_event("history", &record));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}
