use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    /// Recipient key; not necessarily the numeric user primary key.
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNotification {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub room_id: String,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub created_at: i64,
}

impl ChatMessage {
    /// Whether `user_id` should see this message on a live connection.
    /// Room-wide messages go to everyone; direct ones only to both ends.
    pub fn visible_to(&self, user_id: &str) -> bool {
        match &self.receiver_id {
            None => true,
            Some(receiver) => receiver == user_id || self.sender_id == user_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub room_id: String,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub content: String,
    pub kind: MessageKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(receiver: Option<&str>) -> ChatMessage {
        ChatMessage {
            id: 1,
            room_id: "room-1".to_string(),
            sender_id: "1".to_string(),
            receiver_id: receiver.map(str::to_string),
            content: "hi".to_string(),
            kind: MessageKind::Text,
            created_at: 0,
        }
    }

    #[test]
    fn test_room_message_visible_to_all() {
        assert!(message(None).visible_to("99"));
    }

    #[test]
    fn test_direct_message_visibility() {
        let msg = message(Some("2"));
        assert!(msg.visible_to("1"));
        assert!(msg.visible_to("2"));
        assert!(!msg.visible_to("3"));
    }

    #[test]
    fn test_notification_wire_shape() {
        let n = Notification {
            id: 5,
            user_id: "42".to_string(),
            kind: "assignment".to_string(),
            message: "graded".to_string(),
            is_read: false,
            created_at: 1,
            updated_at: 1,
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["user_id"], "42");
        assert_eq!(json["type"], "assignment");
        assert!(json.get("kind").is_none());
    }
}
