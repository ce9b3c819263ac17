use chrono::{DateTime, Utc};
use relay_gemini::Exchange;
use uuid::Uuid;

/// A row in the `chats` table.
#[derive(Debug, Clone)]
pub struct Chat {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }
}

impl Default for Chat {
    fn default() -> Self {
        Self::new()
    }
}

/// A row in the `chat_messages` table: one prompt and the reply to it.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub user_text: String,
    pub model_text: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(chat_id: impl Into<String>, user_text: impl Into<String>, model_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            user_text: user_text.into(),
            model_text: model_text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn to_exchange(&self) -> Exchange {
        Exchange::new(self.user_text.as_str(), self.model_text.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_chats_get_distinct_ids() {
        let a = Chat::default();
        let b = Chat::default();
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn message_converts_to_exchange() {
        let m = ChatMessage::new("c1", "hi", "Hello!");
        assert_eq!(m.to_exchange(), Exchange::new("hi", "Hello!"));
    }
}
