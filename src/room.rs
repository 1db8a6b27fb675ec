use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::messages::{CodeUpdate, LanguageUpdate};

pub const DEFAULT_FILE_NAME: &str = "index.js";
pub const DEFAULT_FILE_LANGUAGE: &str = "javascript";
pub const DEFAULT_FILE_CONTENT: &str = "// Start coding here...";

const USER_COLORS: [&str; 14] = [
    "#f87171", "#fb923c", "#fbbf24", "#a3e635", "#4ade80", "#2dd4bf", "#22d3ee",
    "#38bdf8", "#818cf8", "#a78bfa", "#c084fc", "#e879f9", "#f472b6", "#fb7185",
];

#[derive(Error, Debug)]
pub enum JoinError {
    #[error("Invalid room password")]
    WrongPassword,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub color: String,
    pub socket_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
}

impl User {
    fn new(profile: UserProfile, socket_id: &str) -> Self {
        let color = color_for(&profile.id).to_string();
        User {
            id: profile.id,
            name: profile.name,
            color,
            socket_id: socket_id.to_string(),
            cursor: None,
        }
    }
}

/// Same djb2-style fold the client uses, so both sides agree on a
/// user's color without exchanging it.
fn color_for(id: &str) -> &'static str {
    let mut hash: i32 = 0;
    for byte in id.bytes() {
        hash = i32::from(byte).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash));
    }
    USER_COLORS[hash.unsigned_abs() as usize % USER_COLORS.len()]
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct File {
    pub id: String,
    pub name: String,
    pub language: String,
    pub content: String,
}

impl File {
    fn new(name: String, language: String, content: String) -> Self {
        File {
            id: Uuid::new_v4().to_string(),
            name,
            language,
            content,
        }
    }
}

/// Snapshot sent to a joining client; `code`/`language` are the legacy
/// single-buffer pair for clients that predate multi-file rooms.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomState {
    pub code: String,
    pub language: String,
    pub users: Vec<User>,
    pub files: Vec<File>,
}

struct Room {
    code: String,
    language: String,
    users: Vec<User>,
    files: Vec<File>,
    password: Option<String>,
}

impl Room {
    fn new(password: Option<String>) -> Self {
        let file = File::new(
            DEFAULT_FILE_NAME.to_string(),
            DEFAULT_FILE_LANGUAGE.to_string(),
            DEFAULT_FILE_CONTENT.to_string(),
        );
        Room {
            code: file.content.clone(),
            language: file.language.clone(),
            users: Vec::new(),
            files: vec![file],
            password,
        }
    }

    fn socket_ids(&self) -> Vec<String> {
        self.users.iter().map(|u| u.socket_id.clone()).collect()
    }

    fn snapshot(&self) -> RoomState {
        RoomState {
            code: self.code.clone(),
            language: self.language.clone(),
            users: self.users.clone(),
            files: self.files.clone(),
        }
    }
}

pub struct JoinOutcome {
    pub state: RoomState,
    pub user: User,
    /// Socket ids of every member except the joiner.
    pub peers: Vec<String>,
}

/// In-process table of rooms, created lazily on first join and kept until
/// the process exits.
#[derive(Default)]
pub struct RoomStore {
    rooms: RwLock<HashMap<String, Room>>,
}

impl RoomStore {
    pub fn new() -> Self {
        RoomStore::default()
    }

    /// Join a room, creating it if the key is unknown. The creating join's
    /// password becomes the room password; later joins must match it exactly.
    pub async fn join(
        &self,
        room_id: &str,
        profile: UserProfile,
        password: Option<String>,
        socket_id: &str,
    ) -> Result<JoinOutcome, JoinError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(password.clone()));

        if let Some(expected) = &room.password {
            if password.as_deref() != Some(expected.as_str()) {
                return Err(JoinError::WrongPassword);
            }
        }

        // A re-join with the same user id replaces the stale entry.
        room.users.retain(|u| u.id != profile.id);
        let user = User::new(profile, socket_id);
        let peers = room.socket_ids();
        room.users.push(user.clone());

        Ok(JoinOutcome {
            state: room.snapshot(),
            user,
            peers,
        })
    }

    /// Overwrite a file's content, or the legacy buffer when no file id is
    /// given. Last writer wins.
    pub async fn content_change(
        &self,
        room_id: &str,
        code: String,
        file_id: Option<&str>,
    ) -> Option<(CodeUpdate, Vec<String>)> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id)?;
        match file_id {
            Some(file_id) => {
                let file = room.files.iter_mut().find(|f| f.id == file_id)?;
                file.content = code.clone();
                let update = CodeUpdate::File {
                    code,
                    file_id: file_id.to_string(),
                };
                Some((update, room.socket_ids()))
            }
            None => {
                room.code = code.clone();
                Some((CodeUpdate::Legacy(code), room.socket_ids()))
            }
        }
    }

    pub async fn language_change(
        &self,
        room_id: &str,
        language: String,
        file_id: Option<&str>,
    ) -> Option<(LanguageUpdate, Vec<String>)> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id)?;
        match file_id {
            Some(file_id) => {
                let file = room.files.iter_mut().find(|f| f.id == file_id)?;
                file.language = language.clone();
                let update = LanguageUpdate::File {
                    language,
                    file_id: file_id.to_string(),
                };
                Some((update, room.socket_ids()))
            }
            None => {
                room.language = language.clone();
                Some((LanguageUpdate::Legacy(language), room.socket_ids()))
            }
        }
    }

    pub async fn create_file(
        &self,
        room_id: &str,
        name: String,
        language: String,
    ) -> Option<(File, Vec<String>)> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id)?;
        let file = File::new(name, language, String::new());
        room.files.push(file.clone());
        Some((file, room.socket_ids()))
    }

    /// Deleting the last remaining file is refused so a live room never
    /// ends up with an empty file list.
    pub async fn delete_file(&self, room_id: &str, file_id: &str) -> Option<(String, Vec<String>)> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id)?;
        if room.files.len() <= 1 {
            return None;
        }
        let before = room.files.len();
        room.files.retain(|f| f.id != file_id);
        if room.files.len() == before {
            return None;
        }
        Some((file_id.to_string(), room.socket_ids()))
    }

    pub async fn cursor_change(
        &self,
        room_id: &str,
        socket_id: &str,
        cursor: CursorPosition,
    ) -> Option<(String, CursorPosition, Vec<String>)> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(room_id)?;
        let sockets = room.socket_ids();
        let user = room.users.iter_mut().find(|u| u.socket_id == socket_id)?;
        user.cursor = Some(cursor.clone());
        Some((user.id.clone(), cursor, sockets))
    }

    pub async fn member_sockets(&self, room_id: &str) -> Vec<String> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map(Room::socket_ids).unwrap_or_default()
    }

    /// Connection id of the member with the given user id, for unicast.
    pub async fn socket_for_user(&self, room_id: &str, user_id: &str) -> Option<String> {
        let rooms = self.rooms.read().await;
        let room = rooms.get(room_id)?;
        room.users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.socket_id.clone())
    }

    pub async fn user_for_socket(&self, room_id: &str, socket_id: &str) -> Option<String> {
        let rooms = self.rooms.read().await;
        let room = rooms.get(room_id)?;
        room.users
            .iter()
            .find(|u| u.socket_id == socket_id)
            .map(|u| u.id.clone())
    }

    /// Remove the closing connection's user from every room it belongs to.
    /// The scan is unconditional even though a connection joins at most
    /// one room.
    pub async fn disconnect(&self, socket_id: &str) -> Vec<(String, Vec<String>)> {
        let mut rooms = self.rooms.write().await;
        let mut departures = Vec::new();
        for room in rooms.values_mut() {
            if let Some(pos) = room.users.iter().position(|u| u.socket_id == socket_id) {
                let user = room.users.remove(pos);
                departures.push((user.id, room.socket_ids()));
            }
        }
        departures
    }

    #[cfg(test)]
    pub async fn snapshot(&self, room_id: &str) -> Option<RoomState> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).map(Room::snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            name: format!("user-{id}"),
        }
    }

    #[tokio::test]
    async fn join_seeds_new_room_with_default_file() {
        let store = RoomStore::new();
        let outcome = store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();

        assert_eq!(outcome.state.files.len(), 1);
        assert_eq!(outcome.state.files[0].name, DEFAULT_FILE_NAME);
        assert_eq!(outcome.state.files[0].language, DEFAULT_FILE_LANGUAGE);
        assert_eq!(outcome.state.code, DEFAULT_FILE_CONTENT);
        assert_eq!(outcome.state.users.len(), 1);
        assert!(outcome.peers.is_empty());
    }

    #[tokio::test]
    async fn wrong_password_rejects_join_without_mutating_membership() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), Some("s3cret".to_string()), "sock-1")
            .await
            .unwrap();

        let result = store
            .join("room-1", profile("u2"), Some("wrong".to_string()), "sock-2")
            .await;
        assert!(matches!(result, Err(JoinError::WrongPassword)));

        let missing = store.join("room-1", profile("u3"), None, "sock-3").await;
        assert!(missing.is_err());

        assert_eq!(store.member_sockets("room-1").await, vec!["sock-1"]);
    }

    #[tokio::test]
    async fn password_comparison_is_case_sensitive() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), Some("Secret".to_string()), "sock-1")
            .await
            .unwrap();

        let result = store
            .join("room-1", profile("u2"), Some("secret".to_string()), "sock-2")
            .await;
        assert!(result.is_err());

        let ok = store
            .join("room-1", profile("u2"), Some("Secret".to_string()), "sock-2")
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn rejoin_with_same_user_id_replaces_stale_entry() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), None, "sock-old")
            .await
            .unwrap();
        let outcome = store
            .join("room-1", profile("u1"), None, "sock-new")
            .await
            .unwrap();

        let matching: Vec<_> = outcome
            .state
            .users
            .iter()
            .filter(|u| u.id == "u1")
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].socket_id, "sock-new");
    }

    #[tokio::test]
    async fn user_color_is_deterministic() {
        let store = RoomStore::new();
        let first = store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();
        let second = store
            .join("room-2", profile("u1"), None, "sock-2")
            .await
            .unwrap();
        assert_eq!(first.user.color, second.user.color);
        assert!(first.user.color.starts_with('#'));
    }

    #[tokio::test]
    async fn content_change_to_unknown_file_is_a_noop() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();

        let result = store
            .content_change("room-1", "new".to_string(), Some("no-such-file"))
            .await;
        assert!(result.is_none());

        let state = store.snapshot("room-1").await.unwrap();
        assert_eq!(state.files[0].content, DEFAULT_FILE_CONTENT);
    }

    #[tokio::test]
    async fn content_change_to_unknown_room_is_a_noop() {
        let store = RoomStore::new();
        let result = store.content_change("ghost", "x".to_string(), None).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn legacy_content_change_updates_single_buffer() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();

        let (update, sockets) = store
            .content_change("room-1", "let x = 1".to_string(), None)
            .await
            .unwrap();
        assert!(matches!(update, CodeUpdate::Legacy(ref code) if code == "let x = 1"));
        assert_eq!(sockets, vec!["sock-1"]);

        let state = store.snapshot("room-1").await.unwrap();
        assert_eq!(state.code, "let x = 1");
    }

    #[tokio::test]
    async fn scoped_content_change_updates_the_addressed_file() {
        let store = RoomStore::new();
        let outcome = store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();
        let file_id = outcome.state.files[0].id.clone();

        let (update, _) = store
            .content_change("room-1", "print(1)".to_string(), Some(&file_id))
            .await
            .unwrap();
        match update {
            CodeUpdate::File { code, file_id: id } => {
                assert_eq!(code, "print(1)");
                assert_eq!(id, file_id);
            }
            CodeUpdate::Legacy(_) => panic!("expected a file-scoped update"),
        }

        let state = store.snapshot("room-1").await.unwrap();
        assert_eq!(state.files[0].content, "print(1)");
        // Legacy buffer is untouched by file-scoped edits.
        assert_eq!(state.code, DEFAULT_FILE_CONTENT);
    }

    #[tokio::test]
    async fn language_change_updates_file_tag() {
        let store = RoomStore::new();
        let outcome = store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();
        let file_id = outcome.state.files[0].id.clone();

        store
            .language_change("room-1", "python".to_string(), Some(&file_id))
            .await
            .unwrap();
        let state = store.snapshot("room-1").await.unwrap();
        assert_eq!(state.files[0].language, "python");
    }

    #[tokio::test]
    async fn create_file_appends_and_targets_all_members() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();
        store
            .join("room-1", profile("u2"), None, "sock-2")
            .await
            .unwrap();

        let (file, sockets) = store
            .create_file("room-1", "main.py".to_string(), "python".to_string())
            .await
            .unwrap();
        assert_eq!(file.name, "main.py");
        assert!(file.content.is_empty());
        assert_eq!(sockets.len(), 2);

        let state = store.snapshot("room-1").await.unwrap();
        assert_eq!(state.files.len(), 2);
    }

    #[tokio::test]
    async fn delete_file_removes_it_from_snapshots() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();
        let (file, _) = store
            .create_file("room-1", "main.py".to_string(), "python".to_string())
            .await
            .unwrap();

        let (deleted_id, _) = store.delete_file("room-1", &file.id).await.unwrap();
        assert_eq!(deleted_id, file.id);

        let state = store.snapshot("room-1").await.unwrap();
        assert!(state.files.iter().all(|f| f.id != file.id));
    }

    #[tokio::test]
    async fn deleting_the_last_file_is_refused() {
        let store = RoomStore::new();
        let outcome = store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();
        let only_file = outcome.state.files[0].id.clone();

        assert!(store.delete_file("room-1", &only_file).await.is_none());

        let state = store.snapshot("room-1").await.unwrap();
        assert_eq!(state.files.len(), 1);
    }

    #[tokio::test]
    async fn deleting_an_unknown_file_is_a_noop() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();
        store
            .create_file("room-1", "b.js".to_string(), "javascript".to_string())
            .await
            .unwrap();

        assert!(store.delete_file("room-1", "no-such-id").await.is_none());
        let state = store.snapshot("room-1").await.unwrap();
        assert_eq!(state.files.len(), 2);
    }

    #[tokio::test]
    async fn cursor_change_is_attributed_to_the_sender() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();

        let cursor = CursorPosition { line: 3, column: 7 };
        let (user_id, stored, _) = store
            .cursor_change("room-1", "sock-1", cursor.clone())
            .await
            .unwrap();
        assert_eq!(user_id, "u1");
        assert_eq!(stored, cursor);

        let state = store.snapshot("room-1").await.unwrap();
        assert_eq!(state.users[0].cursor, Some(cursor));
    }

    #[tokio::test]
    async fn cursor_change_from_unknown_connection_is_a_noop() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();
        let result = store
            .cursor_change("room-1", "sock-ghost", CursorPosition { line: 0, column: 0 })
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn unicast_lookup_for_absent_user_returns_none() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();
        assert!(store.socket_for_user("room-1", "u-gone").await.is_none());
        assert!(store.socket_for_user("no-room", "u1").await.is_none());
    }

    #[tokio::test]
    async fn disconnect_removes_user_and_reports_remaining_members() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();
        store
            .join("room-1", profile("u2"), None, "sock-2")
            .await
            .unwrap();

        let departures = store.disconnect("sock-1").await;
        assert_eq!(departures.len(), 1);
        let (user_id, remaining) = &departures[0];
        assert_eq!(user_id, "u1");
        assert_eq!(remaining, &vec!["sock-2".to_string()]);

        let state = store.snapshot("room-1").await.unwrap();
        assert_eq!(state.users.len(), 1);
    }

    #[tokio::test]
    async fn disconnect_of_unknown_connection_reports_nothing() {
        let store = RoomStore::new();
        store
            .join("room-1", profile("u1"), None, "sock-1")
            .await
            .unwrap();
        assert!(store.disconnect("sock-ghost").await.is_empty());
    }
}
