use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::broadcast::BroadcastHub;

/// Longest accepted channel request, newline included.
pub const MAX_REQUEST_LEN: u64 = 256;

/// Serves announcements to display clients over TCP.
///
/// Protocol: the client sends one line naming the channel it wants, then
/// receives every later message on that channel as a `\n`-terminated line.
/// Nothing published before the subscription is replayed. A client that does
/// not send its request line within `request_timeout`, or sends more than
/// [`MAX_REQUEST_LEN`] bytes without a newline, is disconnected.
#[instrument(skip_all, fields(addr = ?listener.local_addr().ok()))]
pub async fn run(
    listener: TcpListener,
    hub: BroadcastHub,
    request_timeout: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    info!("subscriber server listening");
    let mut clients = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting subscriber server");
                break;
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "subscriber connected");
                    let hub = hub.clone();
                    let cancel = cancel.clone();
                    clients.spawn(async move {
                        let served = serve_client(stream, peer, hub, request_timeout, cancel);
                        if let Err(err) = served.await {
                            debug!(%peer, error = %err, "subscriber dropped");
                        }
                    });
                }
                Err(err) => warn!(error = %err, "accept failed"),
            },

            // Reap finished connections so the set does not grow unbounded.
            Some(_) = clients.join_next(), if !clients.is_empty() => {}
        }
    }

    clients.shutdown().await;
    Ok(())
}

async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    hub: BroadcastHub,
    request_timeout: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut request = Vec::new();
    let mut limited = (&mut reader).take(MAX_REQUEST_LEN);
    let read = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        read = timeout(request_timeout, limited.read_until(b'\n', &mut request)) => read
            .context("no channel request before deadline")?
            .context("failed to read channel name")?,
    };
    if read == 0 {
        return Ok(());
    }
    ensure!(
        request.ends_with(b"\n"),
        "channel request not newline-terminated within {MAX_REQUEST_LEN} bytes"
    );
    let channel = String::from_utf8(request).context("channel name is not UTF-8")?;
    let channel = channel.trim().to_string();
    // Subscribe only after the request line so earlier traffic is not replayed.
    let mut rx = hub.subscribe();
    info!(%peer, %channel, "subscriber attached");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            received = rx.recv() => match received {
                Ok(announcement) if announcement.channel == channel => {
                    let mut line = announcement.message;
                    line.push('\n');
                    write_half
                        .write_all(line.as_bytes())
                        .await
                        .context("failed to write announcement")?;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%peer, skipped, "subscriber lagging; announcements dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let _ = write_half.shutdown().await;
    Ok(())
}
