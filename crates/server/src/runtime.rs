//! The dispatch loop.
//!
//! One task owns the [`Server`]. Transport tasks talk to it through a
//! single inbound channel and receive encoded messages on a single
//! outbound channel; the lifecycle timer runs inside the same loop, so
//! intents and ticks are totally ordered.
//!
//! The loop never waits on outbound capacity. A delivery that finds the
//! outbound channel full is logged and dropped.

use std::time::Duration;

use log::{debug, info, warn};
use lumberyard_sim::SessionId;
use lumberyard_wire::ClientMessage;
use prost::Message;
use prost::bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::{Outbound, Server};

/// Transport → server.
#[derive(Debug)]
pub enum Inbound {
    /// A transport accepted a connection and wants its session id.
    Connect { reply: oneshot::Sender<SessionId> },
    /// An encoded `ClientMessage` arrived on a connection.
    Message { session_id: SessionId, payload: Bytes },
    /// A connection closed.
    Disconnect { session_id: SessionId },
}

/// Server → transport: one encoded `ServerMessage` for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub session_id: SessionId,
    pub payload: Bytes,
}

/// Run until every inbound sender is dropped or the outbound receiver
/// goes away. Returns the server so the caller can finalize it.
pub async fn run(
    mut server: Server,
    mut inbound: mpsc::Receiver<Inbound>,
    outbound: mpsc::Sender<Delivery>,
) -> Server {
    let period = Duration::from_millis(server.config().lifecycle_interval_ms.max(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("dispatch loop started, lifecycle tick every {period:?}");

    let mut dropped = 0u64;
    loop {
        let batch = tokio::select! {
            msg = inbound.recv() => match msg {
                Some(msg) => handle(&mut server, msg),
                None => break,
            },
            _ = ticker.tick() => server.step(),
        };

        match deliver(&server, batch, &outbound) {
            Ok(n) => dropped += n,
            Err(_) => {
                warn!("outbound channel closed, stopping dispatch loop");
                break;
            }
        }
    }

    info!(
        "dispatch loop stopped at tick {} ({dropped} deliveries dropped)",
        server.current_tick()
    );
    server
}

fn handle(server: &mut Server, msg: Inbound) -> Vec<Outbound> {
    match msg {
        Inbound::Connect { reply } => {
            let session_id = server.on_connect();
            if reply.send(session_id).is_err() {
                debug!("connection {session_id} gone before its id was delivered");
                return server.on_disconnect(session_id);
            }
            Vec::new()
        }
        Inbound::Message {
            session_id,
            payload,
        } => match ClientMessage::decode(payload) {
            Ok(message) => {
                server.receive(session_id, &message);
                server.process_pending()
            }
            Err(e) => {
                warn!("undecodable payload from {session_id}: {e}");
                Vec::new()
            }
        },
        Inbound::Disconnect { session_id } => server.on_disconnect(session_id),
    }
}

/// Encode each message once and queue a copy for every recipient.
///
/// Returns how many deliveries were dropped because the outbound channel
/// was full. Fails only once the outbound receiver is gone.
fn deliver(
    server: &Server,
    batch: Vec<Outbound>,
    outbound: &mpsc::Sender<Delivery>,
) -> Result<u64, TrySendError<Delivery>> {
    let mut dropped = 0;
    for Outbound { to, message } in batch {
        let payload = Bytes::from(message.encode_to_vec());
        for session_id in server.recipients(&to) {
            let delivery = Delivery {
                session_id,
                payload: payload.clone(),
            };
            match outbound.try_send(delivery) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("outbound full, dropped {} for {session_id}", message.name());
                    dropped += 1;
                }
                Err(e @ TrySendError::Closed(_)) => return Err(e),
            }
        }
    }
    Ok(dropped)
}
