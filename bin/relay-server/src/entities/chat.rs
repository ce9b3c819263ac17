use std::future::Future;

use crate::entities::{Chat, ChatMessage, SqliteStore, from_db_time, to_db_time};

pub trait ChatStore: Send + Sync + 'static {
    fn get_chat(&self, id: &str) -> impl Future<Output = Result<Option<Chat>, sqlx::Error>> + Send;

    /// Insert `chat` and its first message atomically.
    fn create_chat_with_message(
        &self,
        chat: Chat,
        msg: ChatMessage,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Append to an existing chat. Messages are immutable once written.
    fn append_message(&self, msg: ChatMessage) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Messages of a chat, oldest first.
    fn list_messages(
        &self,
        chat_id: &str,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, sqlx::Error>> + Send;

    /// Remove a chat and its messages; `false` if it did not exist.
    fn delete_chat(&self, id: &str) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}

impl ChatStore for SqliteStore {
    async fn get_chat(&self, id: &str) -> Result<Option<Chat>, sqlx::Error> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, created_at FROM chats WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, created_at)| Chat {
            id,
            created_at: from_db_time(&created_at),
        }))
    }

    async fn create_chat_with_message(&self, chat: Chat, msg: ChatMessage) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO chats (id, created_at) VALUES (?1, ?2)")
            .bind(&chat.id)
            .bind(to_db_time(&chat.created_at))
            .execute(&mut *tx)
            .await?;
        insert_message(&mut tx, &msg).await?;
        tx.commit().await
    }

    async fn append_message(&self, msg: ChatMessage) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_message(&mut tx, &msg).await?;
        tx.commit().await
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT id, chat_id, user_text, model_text, created_at \
             FROM chat_messages WHERE chat_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, chat_id, user_text, model_text, created_at)| ChatMessage {
                id,
                chat_id,
                user_text,
                model_text,
                created_at: from_db_time(&created_at),
            })
            .collect())
    }

    async fn delete_chat(&self, id: &str) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chat_messages WHERE chat_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM chats WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }
}

async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    msg: &ChatMessage,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO chat_messages (id, chat_id, user_text, model_text, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&msg.id)
    .bind(&msg.chat_id)
    .bind(&msg.user_text)
    .bind(&msg.model_text)
    .bind(to_db_time(&msg.created_at))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn chat_and_first_message_are_created_together() {
        let store = SqliteStore::in_memory().await.unwrap();
        let chat = Chat::new();
        let id = chat.id.clone();
        store
            .create_chat_with_message(chat, ChatMessage::new(&id, "hi", "hello"))
            .await
            .unwrap();

        assert!(store.get_chat(&id).await.unwrap().is_some());
        let messages = store.list_messages(&id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].model_text, "hello");
    }

    #[tokio::test]
    async fn message_for_unknown_chat_is_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store.append_message(ChatMessage::new("missing", "a", "b")).await;
        assert!(err.is_err());
        assert_eq!(store.count("chat_messages").await, 0);
    }

    #[tokio::test]
    async fn failed_first_message_leaves_no_chat() {
        let store = SqliteStore::in_memory().await.unwrap();
        let chat = Chat::new();
        let id = chat.id.clone();
        // Message points at a different chat, so the FK insert fails mid-transaction.
        let result = store
            .create_chat_with_message(chat, ChatMessage::new("other", "q", "a"))
            .await;
        assert!(result.is_err());
        assert!(store.get_chat(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn messages_come_back_in_creation_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        let chat = Chat::new();
        let id = chat.id.clone();
        let base = Utc::now();
        let mut first = ChatMessage::new(&id, "q1", "a1");
        first.created_at = base;
        store.create_chat_with_message(chat, first).await.unwrap();

        // Same timestamp: insertion order decides.
        let mut tie = ChatMessage::new(&id, "q2", "a2");
        tie.created_at = base;
        store.append_message(tie).await.unwrap();

        let mut later = ChatMessage::new(&id, "q3", "a3");
        later.created_at = base + Duration::seconds(1);
        store.append_message(later).await.unwrap();

        let users: Vec<_> = store
            .list_messages(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.user_text)
            .collect();
        assert_eq!(users, ["q1", "q2", "q3"]);
    }

    #[tokio::test]
    async fn delete_removes_chat_and_messages() {
        let store = SqliteStore::in_memory().await.unwrap();
        let chat = Chat::new();
        let id = chat.id.clone();
        store
            .create_chat_with_message(chat, ChatMessage::new(&id, "q", "a"))
            .await
            .unwrap();

        assert!(store.delete_chat(&id).await.unwrap());
        assert!(!store.delete_chat(&id).await.unwrap());
        assert_eq!(store.count("chats").await, 0);
        assert_eq!(store.count("chat_messages").await, 0);
    }
}
