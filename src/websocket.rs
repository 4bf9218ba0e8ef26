//! # WebSocket Relay Handler
//!
//! One actor per participant connection. Clients connect to `/ws`, send
//! JSON [`ClientMessage`]s, and receive [`ServerMessage`]s; which call a
//! connection belongs to (and in which role) is established by its
//! `register` message, not by the transport.
//!
//! ## Actor Model:
//! Each connection is an independent Actix actor. Inbound frames are
//! dispatched to the registry and pipelines; long-running pipeline work is
//! spawned onto the runtime so the actor keeps draining its mailbox.
//! Outbound traffic from other tasks (broadcasts, caller deliveries)
//! arrives through the connection's channel, which the actor streams into
//! the socket. When the actor stops, detaching its connection id from the
//! registry is the only cleanup required.

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

use crate::pipeline::TranscriptOutcome;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{ConnectionHandle, IngestOutcome};
use crate::state::AppState;

/// Interval between transport-level pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Connections silent for longer than this are closed.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket actor for one participant connection.
pub struct RelayWebSocket {
    /// This connection's identity and sending half, as registered with
    /// call sessions
    handle: ConnectionHandle,

    /// Receiving half, drained into the socket once the actor starts
    outbound: Option<tokio::sync::mpsc::UnboundedReceiver<ServerMessage>>,

    state: AppState,

    last_heartbeat: Instant,
}

impl RelayWebSocket {
    pub fn new(state: AppState) -> Self {
        let (handle, outbound) = ConnectionHandle::new();
        Self {
            handle,
            outbound: Some(outbound),
            state,
            last_heartbeat: Instant::now(),
        }
    }

    fn send_json(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(err) => error!(error = %err, "Failed to serialize outbound message"),
        }
    }

    fn dispatch(&mut self, message: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match message {
            ClientMessage::Register { role, call_id } => {
                match self
                    .state
                    .registry
                    .register(&call_id, role, self.handle.clone())
                {
                    Ok(ack) => self.send_json(ctx, &ack),
                    Err(err) => {
                        self.state.record_validation_error();
                        self.send_json(ctx, &err.to_message());
                    }
                }
            }

            ClientMessage::AudioChunk { call_id, file, .. }
            | ClientMessage::AudioFile { call_id, file } => {
                let state = self.state.clone();
                let handle = self.handle.clone();
                tokio::spawn(async move {
                    match state.ingest.enqueue(&call_id, &file).await {
                        Ok(IngestOutcome::Processed(outcome)) => {
                            state.record_chunk_processed();
                            if matches!(
                                outcome,
                                TranscriptOutcome::SpamTranscript
                                    | TranscriptOutcome::SpamTranslation
                            ) {
                                state.record_spam_rejected();
                            }
                        }
                        Ok(IngestOutcome::DroppedTooSmall) => state.record_chunk_dropped(),
                        Ok(IngestOutcome::Failed) => state.record_upstream_error(),
                        Err(err) => {
                            state.record_validation_error();
                            handle.send(err.to_message());
                        }
                    }
                });
            }

            ClientMessage::AudioEnd { call_id } => {
                // No partial-audio buffering exists: chunks are admitted as
                // they arrive, so there is never anything to flush. Unknown
                // calls are ignored without a reply.
                if self.state.registry.get(&call_id).is_some() {
                    debug!(call_id = %call_id, "Audio stream ended");
                }
            }

            ClientMessage::SetLanguage { call_id, language } => {
                self.state
                    .registry
                    .set_language(&call_id, language.as_deref());
            }

            ClientMessage::OperatorReply { call_id, text } => {
                let state = self.state.clone();
                let handle = self.handle.clone();
                tokio::spawn(async move {
                    match state.reply.process(&call_id, &text).await {
                        Ok(delivery) => {
                            if delivery.delivered {
                                state.record_reply_delivered();
                            }
                        }
                        Err(err) => {
                            state.record_validation_error();
                            handle.send(err.to_message());
                        }
                    }
                });
            }
        }
    }
}

impl Actor for RelayWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(connection_id = %self.handle.id(), "WebSocket connection started");
        self.state.connection_opened();

        // Broadcasts and caller deliveries addressed to this connection.
        if let Some(outbound) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(outbound));
        }

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(connection_id = %act.handle.id(), "WebSocket heartbeat timeout, closing");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(connection_id = %self.handle.id(), "WebSocket connection stopped");
        self.state.registry.detach(self.handle.id());
        self.state.connection_closed();
    }
}

/// Outbound messages routed to this connection by the bus.
impl StreamHandler<ServerMessage> for RelayWebSocket {
    fn handle(&mut self, message: ServerMessage, ctx: &mut Self::Context) {
        self.send_json(ctx, &message);
    }
}

/// Inbound WebSocket frames.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RelayWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => self.dispatch(message, ctx),
                Err(err) => {
                    debug!(error = %err, "Rejected malformed client message");
                    self.state.record_validation_error();
                    let reply = ServerMessage::error(format!("Invalid message: {}", err));
                    self.send_json(ctx, &reply);
                }
            },
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary frames are not part of the relay protocol, ignoring");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(reason = ?reason, "WebSocket closed by peer");
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to a new [`RelayWebSocket`] actor.
pub async fn relay_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        peer = ?req.connection_info().peer_addr(),
        "New WebSocket connection request"
    );
    ws::start(RelayWebSocket::new(state.get_ref().clone()), &req, stream)
}
