//! Session driver and tick tasks.
//!
//! Each session gets one driver task that consumes its transport events and
//! its flush requests, so receive processing, queue flushes and close never
//! overlap for one session. The tick task only requests flushes.

use crate::session::BedrockSession;
use crate::transport::{ConnectionEvent, ConnectionState, DisconnectReason};
use bedrock_wire::BATCH_MARKER;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info_span, trace, warn, Instrument};

/// Lifecycle notifications from a session driver
pub trait SessionListener: Send + 'static {
    /// Transport connection changed state
    fn on_state_changed(&mut self, session: &Arc<BedrockSession>, state: ConnectionState) {
        let _ = (session, state);
    }

    /// Session closed; called once, after the session is marked closed
    fn on_disconnect(&mut self, session: &Arc<BedrockSession>, reason: DisconnectReason) {
        let _ = (session, reason);
    }
}

/// Run `on_tick` every `period` until the task is aborted
pub fn spawn_ticker<F>(period: Duration, mut on_tick: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            on_tick();
        }
    })
}

/// Drive `session` from its transport events until it disconnects.
///
/// The task runs inside a `session` span carrying the `peer` address.
pub fn spawn_driver<L>(
    session: Arc<BedrockSession>,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    mut listener: L,
) -> JoinHandle<()>
where
    L: SessionListener,
{
    let span = info_span!("session", peer = %session.address());
    let driver = async move {
        let mut connected = false;

        let reason = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ConnectionEvent::StateChanged(state)) => {
                        trace!("Connection {} is now {:?}", session.address(), state);
                        connected = state == ConnectionState::Connected;
                        listener.on_state_changed(&session, state);
                    }
                    Some(ConnectionEvent::Encapsulated(payload)) => {
                        if connected {
                            handle_payload(&session, payload);
                        }
                    }
                    Some(ConnectionEvent::Disconnected(reason)) => break reason,
                    None => break DisconnectReason::ClosedByRemotePeer,
                },
                _ = session.tick.notified() => {
                    if session.is_closed() {
                        continue;
                    }
                    session.flush();
                }
            }
        };

        session.close(reason);
        listener.on_disconnect(&session, reason);
    };
    tokio::spawn(driver.instrument(span))
}

fn handle_payload(session: &BedrockSession, payload: Bytes) {
    if payload.len() < 2 || payload[0] != BATCH_MARKER {
        debug!(
            "Ignoring {} byte non-batch payload from {}",
            payload.len(),
            session.address()
        );
        return;
    }
    if let Err(e) = session.receive(&payload[1..]) {
        warn!("Dropping batch from {}: {}", session.address(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnection;
    use crate::session::SessionConfig;
    use crate::transport::TransportConnection;
    use bedrock_wire::packet::{PlayStatus, PlayStatusPacket};
    use bedrock_wire::{codec_for_protocol, wrapper_for_version};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    struct Closed(Option<oneshot::Sender<DisconnectReason>>);

    impl SessionListener for Closed {
        fn on_disconnect(&mut self, _session: &Arc<BedrockSession>, reason: DisconnectReason) {
            if let Some(tx) = self.0.take() {
                let _ = tx.send(reason);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_fires_periodically() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let ticker = spawn_ticker(Duration::from_millis(50), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(175)).await;
        ticker.abort();
        // Immediate first tick, then 50, 100 and 150 ms
        assert_eq!(ticks.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_driver_flushes_and_closes() {
        let a: SocketAddr = "127.0.0.1:19132".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let (left, left_conn, _right, _right_conn) = MemoryConnection::pair(a, b, 10);
        let codec = codec_for_protocol(422).unwrap().unwrap();
        let session = Arc::new(BedrockSession::server(
            left_conn.handle,
            wrapper_for_version(10),
            codec,
            &SessionConfig::default(),
        ));

        let (tx, rx) = oneshot::channel();
        let driver = spawn_driver(Arc::clone(&session), left_conn.events, Closed(Some(tx)));

        session.send(PlayStatusPacket::new(PlayStatus::LoginSuccess)).unwrap();
        session.request_flush();
        while left.sent_payloads().is_empty() {
            tokio::task::yield_now().await;
        }

        left.disconnect(DisconnectReason::TimedOut);
        assert_eq!(rx.await.unwrap(), DisconnectReason::TimedOut);
        driver.await.unwrap();
        assert!(session.is_closed());
    }
}
