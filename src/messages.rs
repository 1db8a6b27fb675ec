use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::room::{CursorPosition, File, RoomState, User, UserProfile};

/// Inbound events, one variant per named message on the wire. The envelope
/// is `{"event": "...", "data": {...}}` with camelCase payload fields.
#[derive(Serialize, Deserialize, Clone)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "join-room", rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        user: UserProfile,
        #[serde(default)]
        password: Option<String>,
    },
    /// `file_id` absent means the legacy single-buffer mode.
    #[serde(rename = "code-change", rename_all = "camelCase")]
    CodeChange {
        room_id: String,
        code: String,
        #[serde(default)]
        file_id: Option<String>,
    },
    #[serde(rename = "language-change", rename_all = "camelCase")]
    LanguageChange {
        room_id: String,
        language: String,
        #[serde(default)]
        file_id: Option<String>,
    },
    #[serde(rename = "create-file", rename_all = "camelCase")]
    CreateFile {
        room_id: String,
        name: String,
        language: String,
    },
    #[serde(rename = "delete-file", rename_all = "camelCase")]
    DeleteFile { room_id: String, file_id: String },
    #[serde(rename = "cursor-change", rename_all = "camelCase")]
    CursorChange {
        room_id: String,
        cursor: CursorPosition,
    },
    #[serde(rename = "request-video-call", rename_all = "camelCase")]
    RequestVideoCall {
        room_id: String,
        user_id: String,
        user_name: String,
    },
    #[serde(rename = "accept-call", rename_all = "camelCase")]
    AcceptCall { room_id: String, user_id: String },
    #[serde(rename = "video-ready", rename_all = "camelCase")]
    VideoReady { room_id: String, user_id: String },
    /// Opaque negotiation payload, relayed to one member by user id.
    #[serde(rename = "video-signal", rename_all = "camelCase")]
    VideoSignal {
        room_id: String,
        to: String,
        signal: Value,
    },
    #[serde(rename = "video-stopped", rename_all = "camelCase")]
    VideoStopped { room_id: String, user_id: String },
}

/// `code-update` payload: a bare string for legacy clients, an object
/// carrying the file id in multi-file mode.
#[derive(Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum CodeUpdate {
    #[serde(rename_all = "camelCase")]
    File { code: String, file_id: String },
    Legacy(String),
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum LanguageUpdate {
    #[serde(rename_all = "camelCase")]
    File { language: String, file_id: String },
    Legacy(String),
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Private snapshot sent to a client right after it joins.
    #[serde(rename = "room-state")]
    RoomState(RoomState),
    #[serde(rename = "user-joined")]
    UserJoined(User),
    #[serde(rename = "user-left")]
    UserLeft(String),
    #[serde(rename = "code-update")]
    CodeUpdate(CodeUpdate),
    #[serde(rename = "language-update")]
    LanguageUpdate(LanguageUpdate),
    #[serde(rename = "file-created")]
    FileCreated(File),
    #[serde(rename = "file-deleted")]
    FileDeleted(String),
    #[serde(rename = "cursor-update", rename_all = "camelCase")]
    CursorUpdate {
        user_id: String,
        cursor: CursorPosition,
    },
    #[serde(rename = "incoming-call", rename_all = "camelCase")]
    IncomingCall { from_id: String, from_name: String },
    #[serde(rename = "user-video-ready", rename_all = "camelCase")]
    UserVideoReady { user_id: String },
    #[serde(rename = "user-video-stopped", rename_all = "camelCase")]
    UserVideoStopped { user_id: String },
    #[serde(rename = "video-signal")]
    VideoSignal { from: Option<String>, signal: Value },
    /// Private; only used for password rejection on join.
    #[serde(rename = "error")]
    Error { message: String },
}
