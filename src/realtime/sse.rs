//! Server-sent-event write loop for one notification stream.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::context::CorrelationId;
use crate::db::Notification;
use crate::realtime::registry::Unsubscribe;

pub const NOTIFICATION_EVENT: &str = "notification";

/// Frames buffered between the session task and the response body.
pub const OUTBOUND_BUFFER: usize = 16;

pub fn notification_frame(notification: &Notification) -> Result<Bytes, serde_json::Error> {
    let data = serde_json::to_string(notification)?;
    Ok(Bytes::from(format!(
        "event: {}\ndata: {}\n\n",
        NOTIFICATION_EVENT, data
    )))
}

pub fn keep_alive_frame(now: DateTime<Utc>) -> Bytes {
    Bytes::from(format!(
        ": keep-alive {}\n\n",
        now.to_rfc3339_opts(SecondsFormat::Secs, true)
    ))
}

/// Why a session loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamExit {
    /// Server-side cancellation (shutdown).
    Cancelled,
    /// The response body was dropped or a write failed.
    ClientGone,
    /// The registry side of the channel went away.
    SourceClosed,
}

pub struct StreamSession {
    pub recipient: String,
    pub correlation_id: CorrelationId,
    pub notifications: mpsc::Receiver<Notification>,
    pub unsubscribe: Unsubscribe,
    pub keep_alive: Duration,
    pub cancel: CancellationToken,
}

impl StreamSession {
    /// Drive the stream until the client goes away or `cancel` fires. Frames
    /// are written to `out`, which feeds the HTTP response body.
    pub async fn run(self, out: mpsc::Sender<Bytes>) -> StreamExit {
        let StreamSession {
            recipient,
            correlation_id,
            mut notifications,
            unsubscribe,
            keep_alive,
            cancel,
        } = self;

        tracing::debug!(
            correlation_id = %correlation_id,
            recipient = %recipient,
            keep_alive_secs = keep_alive.as_secs_f64(),
            "notification stream opened"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + keep_alive, keep_alive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let exit = loop {
            tokio::select! {
                _ = cancel.cancelled() => break StreamExit::Cancelled,
                _ = out.closed() => break StreamExit::ClientGone,
                item = notifications.recv() => {
                    let Some(notification) = item else {
                        break StreamExit::SourceClosed;
                    };
                    let frame = match notification_frame(&notification) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!(
                                correlation_id = %correlation_id,
                                notification_id = notification.id,
                                "skipping unserializable notification: {}", e
                            );
                            continue;
                        }
                    };
                    if let Err(exit) = write(&out, frame, &cancel).await {
                        tracing::debug!(
                            correlation_id = %correlation_id,
                            recipient = %recipient,
                            "notification write failed, closing stream"
                        );
                        break exit;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(exit) = write(&out, keep_alive_frame(Utc::now()), &cancel).await {
                        tracing::debug!(
                            correlation_id = %correlation_id,
                            recipient = %recipient,
                            "keep-alive write failed, closing stream"
                        );
                        break exit;
                    }
                }
            }
        };

        drop(ticker);
        unsubscribe.unsubscribe();

        tracing::debug!(
            correlation_id = %correlation_id,
            recipient = %recipient,
            ?exit,
            "notification stream closed"
        );
        exit
    }
}

async fn write(
    out: &mpsc::Sender<Bytes>,
    frame: Bytes,
    cancel: &CancellationToken,
) -> Result<(), StreamExit> {
    tokio::select! {
        _ = cancel.cancelled() => Err(StreamExit::Cancelled),
        sent = out.send(frame) => sent.map_err(|_| StreamExit::ClientGone),
    }
}
