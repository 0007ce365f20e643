//! Host bridge: feeds protocol lines to the interceptor actor and writes
//! decisions, actions and relay replies back.
//!
//! Events and requests are forwarded in line order. Relay requests run in
//! the background and their replies may interleave with later output.

use crate::protocol::{Inbound, Outbound};
use crate::relay::RelayClient;
use loopback_core::{parse_command, HostCommand, InterceptorError, InterceptorHandle, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

const OUTBOUND_CAPACITY: usize = 256;

pub struct HostBridge {
    interceptor: InterceptorHandle,
    relay: RelayClient,
}

impl HostBridge {
    pub fn new(interceptor: InterceptorHandle, relay: RelayClient) -> Self {
        Self { interceptor, relay }
    }

    /// Serve until the reader hits end of input. Outstanding relay replies
    /// are flushed before returning.
    pub async fn serve<R, W>(self, mut reader: R, mut writer: W, rules: usize) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(OUTBOUND_CAPACITY);

        let writer_task = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let line = match message.to_line() {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Failed to encode outbound message: {}", e);
                        continue;
                    }
                };
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            Ok::<_, std::io::Error>(())
        });

        out_tx.send(Outbound::Ready { rules }).await?;

        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let inbound = match decode_line(&buf) {
                Ok(Some(inbound)) => inbound,
                Ok(None) => continue,
                Err(e) => {
                    warn!("{}", e);
                    out_tx
                        .send(Outbound::Error {
                            message: e.to_string(),
                        })
                        .await?;
                    continue;
                }
            };
            self.handle(inbound, &out_tx).await?;
        }

        debug!("Host input closed");
        drop(out_tx);
        writer_task
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
        Ok(())
    }

    async fn handle(&self, inbound: Inbound, out_tx: &mpsc::Sender<Outbound>) -> Result<()> {
        match inbound {
            Inbound::Inventory {
                tab_id,
                frame_id,
                url,
            } => self.interceptor.inventory_result(tab_id, frame_id, url).await?,
            Inbound::FrameInventory { tab_id, frames } => {
                self.interceptor.frame_inventory(tab_id, frames).await?
            }
            Inbound::NavigationCommitted {
                tab_id,
                frame_id,
                url,
            } => {
                self.interceptor
                    .navigation_committed(tab_id, frame_id, url)
                    .await?
            }
            Inbound::TabClosed { tab_id } => self.interceptor.tab_closed(tab_id).await?,
            Inbound::Request { details } => {
                let request_id = details.request_id.clone();
                let decision = self.interceptor.decide(details).await;
                out_tx
                    .send(Outbound::Decision {
                        request_id,
                        decision,
                    })
                    .await?;
            }
            Inbound::Message {
                message_id,
                sender,
                body,
            } => match parse_command(&sender, &body) {
                Some(HostCommand::Action(action)) => out_tx.send(Outbound::Action(action)).await?,
                Some(HostCommand::Relay(details)) => {
                    let relay = self.relay.clone();
                    let out_tx = out_tx.clone();
                    tokio::spawn(async move {
                        let body = relay.relay(&details).await;
                        let Some(message_id) = message_id else {
                            return;
                        };
                        if out_tx
                            .send(Outbound::Reply { message_id, body })
                            .await
                            .is_err()
                        {
                            debug!("Output closed before relay reply");
                        }
                    });
                }
                None => debug!("Ignoring message {:?}", message_id),
            },
        }
        Ok(())
    }
}

/// Decode one raw host line. Blank lines yield `None`.
fn decode_line(raw: &[u8]) -> std::result::Result<Option<Inbound>, InterceptorError> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| InterceptorError::Protocol(format!("malformed message: {}", e)))?;
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| InterceptorError::Protocol(format!("malformed message: {}", e)))
}
