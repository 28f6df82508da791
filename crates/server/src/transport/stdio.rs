use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use multiapi_common::api::jsonrpc::JsonRpcResponse;
use multiapi_common::{MultiApiError, Result};

use crate::dispatch::Dispatcher;

/// Serve newline-delimited envelopes from `reader`, writing one response
/// line per request to `writer`.
///
/// Requests are dispatched concurrently, so responses may come back out of
/// order; clients correlate by `id`. Returns once `reader` hits EOF (or
/// fails) and every in-flight request has been answered.
pub async fn serve<R, W>(dispatcher: Dispatcher, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let writer_task = tokio::spawn(write_responses(rx, writer));

    let mut reader = BufReader::new(reader);
    let mut in_flight = JoinSet::new();
    let mut line = Vec::new();

    tracing::info!("Stdio transport ready");

    // Lines are read as raw bytes: one that is not UTF-8 gets a parse error
    // envelope like any other unparsable line.
    let read_result = loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break Ok(()),
            Ok(_) => {}
            Err(e) => break Err(MultiApiError::from(e)),
        }

        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let body = std::mem::take(&mut line);
        let dispatcher = dispatcher.clone();
        let tx = tx.clone();
        in_flight.spawn(async move {
            let response = dispatcher.dispatch_bytes(&body).await;
            if tx.send(response).is_err() {
                tracing::warn!("Response writer closed, dropping response");
            }
        });

        while in_flight.try_join_next().is_some() {}
    };

    if let Err(e) = &read_result {
        tracing::error!(error = %e, "Stdio input failed, draining in-flight requests");
    }

    while in_flight.join_next().await.is_some() {}
    drop(tx);

    tracing::info!("Stdio input closed, shutting down");

    let write_result = writer_task
        .await
        .map_err(|e| MultiApiError::Internal(format!("Response writer failed: {}", e)))?;

    read_result.and(write_result)
}

/// Single writer, so concurrent responses never interleave within a line.
async fn write_responses<W>(
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
    mut writer: W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
