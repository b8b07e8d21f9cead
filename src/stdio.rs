//! Line-delimited JSON adapter: commands on stdin, responses and repaint
//! events on stdout. Stands in for the map UI during headless runs.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::{watch, Mutex},
};
use tokio_util::sync::CancellationToken;

use crate::{
    annotations::StoreSnapshot,
    commands::{dispatch, Command, Response},
    AppState,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

type SharedOut = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

pub async fn serve(state: AppState) -> Result<()> {
    let out: SharedOut = Arc::new(Mutex::new(Box::new(tokio::io::stdout())));

    let cancel_token = CancellationToken::new();
    let renderer = tokio::spawn(render_loop(
        state.pipeline.store().subscribe(),
        out.clone(),
        cancel_token.clone(),
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read command")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Command>(line) {
            Ok(command) => dispatch(&state, command).await,
            Err(err) => Response::Error {
                kind: "parse".into(),
                message: err.to_string(),
            },
        };
        write_line(&out, &response).await?;
    }

    log_info!("input closed; waiting for background recomputes");
    state.tasks.close();
    state.tasks.wait().await;

    cancel_token.cancel();
    renderer.await.context("render loop task failed to join")?;
    Ok(())
}

/// Emits a `repaint` event for every published store snapshot.
async fn render_loop(
    mut snapshots: watch::Receiver<StoreSnapshot>,
    out: SharedOut,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                let event = json!({
                    "type": "repaint",
                    "revision": snapshot.revision,
                    "polygons": snapshot.polygons,
                });
                if let Err(err) = write_line(&out, &event).await {
                    log_error!("failed to emit repaint: {err:?}");
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                break;
            }
        }
    }
}

async fn write_line<T: Serialize>(out: &SharedOut, value: &T) -> Result<()> {
    let mut line = serde_json::to_vec(value).context("failed to serialize output")?;
    line.push(b'\n');

    let mut guard = out.lock().await;
    guard.write_all(&line).await.context("failed to write output")?;
    guard.flush().await.context("failed to flush output")
}
