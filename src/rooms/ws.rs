use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        ws::{Message as Frame, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use sqlx::SqlitePool;

use crate::{
    auth::CurrentUser,
    live::{Broadcaster, ClientEvent, Connection, LiveEvent},
    ChatError, ChatResult,
};

use super::{msg, store};

#[debug_handler(state = crate::AppState)]
pub async fn live_ws(
    State(db_pool): State<SqlitePool>,
    State(live): State<Arc<Broadcaster>>,
    CurrentUser(user_id): CurrentUser,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(async move |stream| serve(stream, db_pool, live, user_id).await)
}

async fn serve(stream: WebSocket, db_pool: SqlitePool, live: Arc<Broadcaster>, user_id: String) {
    let (mut conn, mut rx) = live.connect(user_id);
    let (mut sender, mut receiver) = stream.split();

    let mut forward_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Frame::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut forward_task => break,
            frame = receiver.next() => {
                let Some(Ok(frame)) = frame else {
                    break;
                };
                let event = match frame {
                    Frame::Text(text) => serde_json::from_str::<ClientEvent>(&text),
                    Frame::Binary(data) => serde_json::from_slice::<ClientEvent>(&data),
                    Frame::Close(_) => break,
                    _ => continue,
                };
                match event {
                    Ok(event) => dispatch(&db_pool, &live, &mut conn, event).await,
                    Err(e) => {
                        conn.notify(LiveEvent::Error {
                            kind: "validation_error".into(),
                            message: format!("unreadable frame: {e}"),
                        });
                    }
                }
            }
        }
    }

    live.disconnect(conn);
    forward_task.abort();
}

/// Applies one client frame, answering failures with an error frame on the same connection.
pub(crate) async fn dispatch(db_pool: &SqlitePool, live: &Broadcaster, conn: &mut Connection, event: ClientEvent) {
    let result = match event {
        ClientEvent::JoinRoom { room_id } => subscribe(db_pool, live, conn, room_id).await,
        ClientEvent::LeaveRoom { room_id } => {
            live.leave(conn, room_id);
            Ok(())
        }
        ClientEvent::SendMessage { room_id, kind, content } => {
            let query = msg::SendMessageQuery { kind, content };
            msg::send_msg(db_pool, live, conn.user_id(), room_id, query).await.map(drop)
        }
    };

    if let Err(e) = result {
        tracing::debug!(conn = conn.id(), kind = e.kind(), "live frame rejected: {e}");
        conn.notify(LiveEvent::Error {
            kind: e.kind().to_owned(),
            message: e.to_string(),
        });
    }
}

async fn subscribe(db_pool: &SqlitePool, live: &Broadcaster, conn: &mut Connection, room_id: uuid::Uuid) -> ChatResult<()> {
    let room = store::find_room(db_pool, room_id).await?;
    if !room.is_group && !room.has_participant(conn.user_id()) {
        return Err(ChatError::Forbidden("this private room is not yours".into()));
    }
    live.join(conn, room_id);
    conn.notify(LiveEvent::Joined { room_id });
    Ok(())
}
