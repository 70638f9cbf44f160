//! Ingest supervisor: owns the single upstream WebSocket connection and
//! forwards each received payload to the processing stage.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{info, warn};

use crate::errors::SupervisorError;
use crate::messages::RawFrame;

const RECONNECT_BASE: Duration = Duration::from_secs(5);
const RECONNECT_CAP: Duration = Duration::from_secs(60);
const PING_INTERVAL: Duration = Duration::from_secs(5);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the firehose receive loop until `shutdown` fires. Every transport
/// failure is logged and retried with exponential backoff; the attempt
/// counter only resets once a connection has received at least one message,
/// so a flapping-but-working endpoint doesn't escalate delay forever.
pub async fn run(url: String, tx: mpsc::Sender<RawFrame>, mut shutdown: watch::Receiver<bool>) {
    let mut attempt: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        info!(url = %url, "connecting to firehose");
        let connect = connect_async(url.as_str());

        let ws = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            result = connect => result,
        };

        match ws {
            Ok((stream, _response)) => {
                info!("connected to firehose");
                let outcome = receive_loop(stream, &tx, &mut shutdown).await;
                if outcome.received_any {
                    attempt = 0;
                }
                if *shutdown.borrow() {
                    break;
                }
                warn!(reason = %outcome.reason, "firehose connection ended, reconnecting");
            }
            Err(err) => {
                warn!(error = %SupervisorError::from(err), "failed to connect to firehose");
            }
        }

        let delay = next_backoff(attempt);
        attempt += 1;
        info!(delay_secs = delay.as_secs(), "reconnecting after backoff");
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("supervisor shut down");
}

/// `min(BASE * 2^attempt, CAP)`, isolated as a pure function so the
/// `5, 10, 20, 40, 60, 60, ...` sequence from a cold, never-connecting
/// endpoint is testable without a socket.
fn next_backoff(attempt: u32) -> Duration {
    std::cmp::min(RECONNECT_BASE * 2u32.saturating_pow(attempt), RECONNECT_CAP)
}

struct LoopOutcome {
    received_any: bool,
    reason: String,
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Pump messages from one connection until it closes, errors, goes idle past
/// `PONG_TIMEOUT` since the last received frame, or shutdown fires. A ping is
/// sent every `PING_INTERVAL` as the watchdog heartbeat; the peer's pong (or
/// any other traffic) resets the idle clock.
async fn receive_loop(
    mut ws: WsStream,
    tx: &mpsc::Sender<RawFrame>,
    shutdown: &mut watch::Receiver<bool>,
) -> LoopOutcome {
    let mut received_any = false;
    let mut last_activity = Instant::now();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                return LoopOutcome { received_any, reason: "shutdown".to_owned() };
            }
            _ = ping_interval.tick() => {
                if last_activity.elapsed() > PONG_TIMEOUT {
                    return LoopOutcome { received_any, reason: "pong timeout".to_owned() };
                }
                if ws.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return LoopOutcome { received_any, reason: "ping send failed".to_owned() };
                }
            }
            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Binary(bytes))) => {
                        received_any = true;
                        last_activity = Instant::now();
                        if tx.send(bytes.into()).await.is_err() {
                            return LoopOutcome { received_any, reason: "processing queue closed".to_owned() };
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) => {
                        return LoopOutcome { received_any, reason: SupervisorError::ConnectionClosed.to_string() };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        return LoopOutcome { received_any, reason: SupervisorError::from(err).to_string() };
                    }
                    None => {
                        return LoopOutcome { received_any, reason: "stream ended".to_owned() };
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence_doubles_then_caps_at_60() {
        let delays: Vec<u64> = (0..7).map(|attempt| next_backoff(attempt).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60, 60]);
    }
}
