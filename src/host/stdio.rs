//! Newline-delimited JSON bridge for the host command channel.
//!
//! Reads `CommandEnvelope` lines, dispatches them through the
//! `HostCommandServer` router, and writes `ResponseEnvelope` and
//! `EventEnvelope` lines back.
//!
//! When run over stdin/stdout, stdout is exclusively reserved for the JSON
//! protocol; all diagnostic output (tracing, logs) must be routed to stderr.

use crate::error::InteractionError;
use crate::host::channel::{HostCommandClient, SessionHostHandler, command_channel};
use crate::host::contract::{CommandEnvelope, EventEnvelope, ResponseEnvelope};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};

/// Default request channel capacity for the bridge.
const REQUEST_CAPACITY: usize = 64;

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Run the bridge over the process's stdin and stdout until stdin closes.
pub async fn run_stdio_bridge<H: SessionHostHandler>(
    handler: H,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> crate::Result<()> {
    run_bridge(tokio::io::stdin(), tokio::io::stdout(), handler, event_tx).await
}

/// Run the bridge over arbitrary streams until `reader` reaches EOF.
///
/// Three concurrent tasks operate in parallel:
///
/// 1. **Reader** -- reads newline-delimited JSON, dispatches each
///    `CommandEnvelope` through the host command client, and writes the
///    resulting `ResponseEnvelope`.
/// 2. **Event forwarder** -- writes every broadcast `EventEnvelope` as a
///    JSON line.
/// 3. **Server** -- runs the `HostCommandServer` router loop.
pub async fn run_bridge<R, W, H>(
    reader: R,
    writer: W,
    handler: H,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> crate::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    H: SessionHostHandler,
{
    let (client, server) = command_channel(REQUEST_CAPACITY, event_tx, handler);
    let writer = Arc::new(Mutex::new(BufWriter::new(writer)));

    let server_handle = tokio::spawn(server.run());

    let event_writer = Arc::clone(&writer);
    let mut event_rx = client.subscribe_events();
    let event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event_envelope) => match serde_json::to_string(&event_envelope) {
                    Ok(json) => {
                        let mut w = event_writer.lock().await;
                        if let Err(e) = write_line(&mut w, &json).await {
                            tracing::warn!(
                                error = %e,
                                "failed to write event envelope; stopping event forwarder"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("event broadcast channel closed; stopping event forwarder");
                    break;
                }
            }
        }
    });

    let reader_result = run_reader(reader, client, Arc::clone(&writer)).await;

    // The client is dropped by `run_reader`, which closes the request
    // channel and lets the server exit.
    event_handle.abort();
    let _ = event_handle.await;
    let _ = server_handle.await;

    reader_result
}

async fn run_reader<R, W>(
    reader: R,
    client: HostCommandClient,
    writer: SharedWriter<W>,
) -> crate::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| InteractionError::Channel(format!("failed to read command line: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down host bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<CommandEnvelope>(trimmed) {
            Ok(envelope) => {
                let request_id = envelope.request_id.clone();
                let command = envelope.command.as_str();
                match client.send(envelope).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        tracing::warn!(error = %e, command, "host command failed");
                        ResponseEnvelope::error(request_id, e.to_string())
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse command envelope");
                ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                )
            }
        };

        let json = serde_json::to_string(&response).map_err(|e| {
            InteractionError::Protocol(format!("failed to serialize response envelope: {e}"))
        })?;
        let mut w = writer.lock().await;
        write_line(&mut w, &json).await?;
    }

    Ok(())
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line<W: AsyncWrite + Unpin>(
    writer: &mut BufWriter<W>,
    json: &str,
) -> crate::Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| InteractionError::Channel(format!("failed to write line: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| InteractionError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| InteractionError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
