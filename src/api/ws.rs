//! Dashboard push channel.
//!
//! Every connection is a hub subscriber: it gets an `init` snapshot, then the
//! live broadcast. Query commands are answered to the asking client only.

use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, web};
use actix_ws::{CloseCode, CloseReason, Message, MessageStream, Session};
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::engine::hub::HubMessage;
use crate::store::StoreError;

#[derive(Debug, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    GetActive {
        #[serde(default)]
        location_id: Option<u64>,
    },
    GetLogs {
        #[serde(default)]
        limit: Option<u32>,
        #[serde(default)]
        employee_id: Option<u64>,
    },
    GetStats,
    GetEmployees,
    GetLocations,
    GetEvents,
}

pub async fn dashboard_socket(
    req: HttpRequest,
    body: web::Payload,
    engine: web::Data<Engine>,
) -> actix_web::Result<HttpResponse> {
    let (response, session, stream) = actix_ws::handle(&req, body)?;
    actix_web::rt::spawn(serve(engine.into_inner(), session, stream));
    Ok(response)
}

async fn serve(engine: Arc<Engine>, mut session: Session, mut stream: MessageStream) {
    let subscription = engine
        .hub()
        .subscribe(async { HubMessage::Init(engine.snapshot().await) })
        .await;

    let reason = loop {
        tokio::select! {
            outgoing = subscription.recv() => match outgoing {
                Some(json) => {
                    if session.text(json.to_string()).await.is_err() {
                        break None;
                    }
                }
                // hub shut down
                None => break Some(CloseReason::from(CloseCode::Away)),
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = answer(&engine, &text).await;
                    if session.text(reply.encode().to_string()).await.is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Ping(bytes))) => {
                    if session.pong(&bytes).await.is_err() {
                        break None;
                    }
                }
                Some(Ok(Message::Close(reason))) => break reason,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(subscriber = %subscription.id(), error = %e, "Dashboard socket error");
                    break None;
                }
                None => break None,
            },
        }
    };

    subscription.close();
    let _ = session.close(reason).await;
    debug!(subscriber = %subscription.id(), "Dashboard socket closed");
}

/// Reply to one client message.
pub async fn answer(engine: &Engine, text: &str) -> HubMessage {
    let command = match serde_json::from_str::<ClientCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            debug!(error = %e, "Unrecognized dashboard message");
            return HubMessage::Error {
                message: format!("invalid command: {e}"),
            };
        }
    };
    info!(?command, "Dashboard command");

    let reply = match command {
        ClientCommand::GetActive { location_id } => engine
            .active_sessions(location_id)
            .await
            .map(HubMessage::ActiveEmployees),
        ClientCommand::GetLogs { limit, employee_id } => engine
            .attendance_history(limit, employee_id)
            .await
            .map(HubMessage::AttendanceLogs),
        ClientCommand::GetStats => engine.today_stats().await.map(HubMessage::Stats),
        ClientCommand::GetEmployees => engine.employees().await.map(HubMessage::Employees),
        ClientCommand::GetLocations => engine.locations().await.map(HubMessage::Locations),
        ClientCommand::GetEvents => Ok(HubMessage::Events(engine.recent_events())),
    };

    reply.unwrap_or_else(|e: StoreError| {
        warn!(error = %e, "Dashboard command failed");
        HubMessage::Error {
            message: "store unavailable, try again later".into(),
        }
    })
}
