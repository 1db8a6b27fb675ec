use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::messages::{ClientMessage, ServerMessage};
use crate::room::{RoomStore, UserProfile};

type Connections = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Message>>>>;

#[derive(Clone)]
pub struct Server {
    store: Arc<RoomStore>,
    connections: Connections,
}

impl Server {
    pub fn new() -> Self {
        Server {
            store: Arc::new(RoomStore::new()),
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn handle_connection(&self, ws: WebSocket) {
        let socket_id = Uuid::new_v4().to_string();
        info!("client connected: {socket_id}");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel();

        {
            let mut connections = self.connections.write().await;
            connections.insert(socket_id.clone(), tx);
        }

        let server = self.clone();
        let reader_socket_id = socket_id.clone();
        tokio::spawn(async move {
            while let Some(result) = ws_rx.next().await {
                match result {
                    Ok(msg) => {
                        if let Ok(text) = msg.to_str() {
                            match serde_json::from_str::<ClientMessage>(text) {
                                Ok(event) => server.dispatch(event, &reader_socket_id).await,
                                Err(e) => {
                                    debug!("ignoring malformed message from {reader_socket_id}: {e}");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!("websocket error on {reader_socket_id}: {e}");
                        break;
                    }
                }
            }

            server.handle_disconnect(&reader_socket_id).await;
        });

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = ws_tx.send(message).await {
                    warn!("failed to send websocket message: {e}");
                    break;
                }
            }
        });
    }

    async fn dispatch(&self, event: ClientMessage, socket_id: &str) {
        match event {
            ClientMessage::JoinRoom {
                room_id,
                user,
                password,
            } => self.handle_join(&room_id, user, password, socket_id).await,

            ClientMessage::CodeChange {
                room_id,
                code,
                file_id,
            } => {
                if let Some((update, members)) = self
                    .store
                    .content_change(&room_id, code, file_id.as_deref())
                    .await
                {
                    self.broadcast_except(&members, socket_id, &ServerMessage::CodeUpdate(update))
                        .await;
                }
            }

            ClientMessage::LanguageChange {
                room_id,
                language,
                file_id,
            } => {
                if let Some((update, members)) = self
                    .store
                    .language_change(&room_id, language, file_id.as_deref())
                    .await
                {
                    self.broadcast_except(
                        &members,
                        socket_id,
                        &ServerMessage::LanguageUpdate(update),
                    )
                    .await;
                }
            }

            ClientMessage::CreateFile {
                room_id,
                name,
                language,
            } => {
                if let Some((file, members)) =
                    self.store.create_file(&room_id, name, language).await
                {
                    self.broadcast(&members, &ServerMessage::FileCreated(file))
                        .await;
                }
            }

            ClientMessage::DeleteFile { room_id, file_id } => {
                if let Some((file_id, members)) = self.store.delete_file(&room_id, &file_id).await {
                    self.broadcast(&members, &ServerMessage::FileDeleted(file_id))
                        .await;
                }
            }

            ClientMessage::CursorChange { room_id, cursor } => {
                if let Some((user_id, cursor, members)) =
                    self.store.cursor_change(&room_id, socket_id, cursor).await
                {
                    self.broadcast_except(
                        &members,
                        socket_id,
                        &ServerMessage::CursorUpdate { user_id, cursor },
                    )
                    .await;
                }
            }

            ClientMessage::RequestVideoCall {
                room_id,
                user_id,
                user_name,
            } => {
                let members = self.store.member_sockets(&room_id).await;
                self.broadcast_except(
                    &members,
                    socket_id,
                    &ServerMessage::IncomingCall {
                        from_id: user_id,
                        from_name: user_name,
                    },
                )
                .await;
            }

            ClientMessage::AcceptCall { room_id, user_id }
            | ClientMessage::VideoReady { room_id, user_id } => {
                let members = self.store.member_sockets(&room_id).await;
                self.broadcast_except(
                    &members,
                    socket_id,
                    &ServerMessage::UserVideoReady { user_id },
                )
                .await;
            }

            ClientMessage::VideoSignal {
                room_id,
                to,
                signal,
            } => self.relay_signal(&room_id, &to, signal, socket_id).await,

            ClientMessage::VideoStopped { room_id, user_id } => {
                let members = self.store.member_sockets(&room_id).await;
                self.broadcast_except(
                    &members,
                    socket_id,
                    &ServerMessage::UserVideoStopped { user_id },
                )
                .await;
            }
        }
    }

    async fn handle_join(
        &self,
        room_id: &str,
        profile: UserProfile,
        password: Option<String>,
        socket_id: &str,
    ) {
        match self.store.join(room_id, profile, password, socket_id).await {
            Ok(outcome) => {
                info!("user {} joined room {room_id}", outcome.user.id);
                self.send_to(socket_id, &ServerMessage::RoomState(outcome.state))
                    .await;
                self.broadcast(&outcome.peers, &ServerMessage::UserJoined(outcome.user))
                    .await;
            }
            Err(e) => {
                self.send_to(
                    socket_id,
                    &ServerMessage::Error {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }
    }

    /// An absent target means the peer already left; the payload is dropped.
    async fn relay_signal(&self, room_id: &str, to: &str, signal: Value, socket_id: &str) {
        let Some(target) = self.store.socket_for_user(room_id, to).await else {
            debug!("dropping signal for absent user {to} in room {room_id}");
            return;
        };
        let from = self.store.user_for_socket(room_id, socket_id).await;
        self.send_to(&target, &ServerMessage::VideoSignal { from, signal })
            .await;
    }

    async fn handle_disconnect(&self, socket_id: &str) {
        info!("client disconnected: {socket_id}");
        for (user_id, remaining) in self.store.disconnect(socket_id).await {
            self.broadcast(&remaining, &ServerMessage::UserLeft(user_id))
                .await;
        }

        let mut connections = self.connections.write().await;
        connections.remove(socket_id);
    }

    async fn send_to(&self, socket_id: &str, message: &ServerMessage) {
        if let Ok(text) = serde_json::to_string(message) {
            let connections = self.connections.read().await;
            if let Some(sender) = connections.get(socket_id) {
                let _ = sender.send(Message::text(text));
            }
        }
    }

    async fn broadcast(&self, members: &[String], message: &ServerMessage) {
        self.broadcast_filtered(members, None, message).await;
    }

    async fn broadcast_except(&self, members: &[String], except: &str, message: &ServerMessage) {
        self.broadcast_filtered(members, Some(except), message)
            .await;
    }

    async fn broadcast_filtered(
        &self,
        members: &[String],
        except: Option<&str>,
        message: &ServerMessage,
    ) {
        let Ok(text) = serde_json::to_string(message) else {
            return;
        };
        let connections = self.connections.read().await;
        for socket_id in members {
            if Some(socket_id.as_str()) == except {
                continue;
            }
            if let Some(sender) = connections.get(socket_id) {
                let _ = sender.send(Message::text(text.clone()));
            }
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Server::new()
    }
}
