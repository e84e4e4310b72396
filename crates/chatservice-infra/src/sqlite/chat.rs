//! SQLite chat repository implementation.
//!
//! Implements `ChatRepository` from `chatservice-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, and a transaction per
//! write so a chat row and its messages always change together.

use chatservice_core::chat::repository::ChatRepository;
use chatservice_types::chat::{Chat, ChatConfig, ChatMessage, ChatRecord, ChatStatus, MessageRole};
use chatservice_types::error::RepositoryError;
use chatservice_types::model::Model;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ChatRepository`.
pub struct SqliteChatRepository {
    pool: DatabasePool,
}

impl SqliteChatRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

/// Internal row type for the `chats` table.
struct ChatRow {
    id: String,
    user_id: String,
    status: String,
    version: i64,
    model_name: String,
    model_max_tokens: i64,
    temperature: f64,
    top_p: f64,
    n: i64,
    stop: String,
    max_tokens: i64,
    presence_penalty: f64,
    frequency_penalty: f64,
}

impl ChatRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            status: row.try_get("status")?,
            version: row.try_get("version")?,
            model_name: row.try_get("model_name")?,
            model_max_tokens: row.try_get("model_max_tokens")?,
            temperature: row.try_get("temperature")?,
            top_p: row.try_get("top_p")?,
            n: row.try_get("n")?,
            stop: row.try_get("stop")?,
            max_tokens: row.try_get("max_tokens")?,
            presence_penalty: row.try_get("presence_penalty")?,
            frequency_penalty: row.try_get("frequency_penalty")?,
        })
    }

    fn into_chat(
        self,
        active_messages: Vec<ChatMessage>,
        erased_messages: Vec<ChatMessage>,
    ) -> Result<Chat, RepositoryError> {
        let status: ChatStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let stop: Vec<String> = serde_json::from_str(&self.stop)
            .map_err(|e| RepositoryError::Query(format!("invalid stop list: {e}")))?;
        let model = Model::new(self.model_name, to_u32(self.model_max_tokens, "model_max_tokens")?)
            .map_err(corrupt)?;
        let n = u8::try_from(self.n)
            .map_err(|_| RepositoryError::Query(format!("invalid n: {}", self.n)))?;

        let config = ChatConfig {
            model,
            temperature: self.temperature as f32,
            top_p: self.top_p as f32,
            n,
            stop,
            max_tokens: to_u32(self.max_tokens, "max_tokens")?,
            presence_penalty: self.presence_penalty as f32,
            frequency_penalty: self.frequency_penalty as f32,
        };

        Chat::restore(ChatRecord {
            id: self.id,
            user_id: self.user_id,
            active_messages,
            erased_messages,
            status,
            config,
            version: u64::try_from(self.version)
                .map_err(|_| RepositoryError::Query(format!("invalid version: {}", self.version)))?,
        })
        .map_err(corrupt)
    }
}

/// Internal row type for the `chat_messages` table.
struct ChatMessageRow {
    id: String,
    role: String,
    content: String,
    token_count: i64,
    erased: bool,
    created_at: String,
}

impl ChatMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            token_count: row.try_get("token_count")?,
            erased: row.try_get("erased")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let created_at = parse_datetime(&self.created_at)?;

        ChatMessage::new(
            self.id,
            role,
            self.content,
            to_u32(self.token_count, "token_count")?,
            created_at,
        )
        .map_err(corrupt)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn to_u32(value: i64, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::Query(format!("invalid {column}: {value}")))
}

fn corrupt(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Query(format!("stored chat is invalid: {e}"))
}

/// Insert every message of `chat`, active window first, then eviction history.
async fn insert_messages(conn: &mut SqliteConnection, chat: &Chat) -> Result<(), RepositoryError> {
    let active = chat.active_messages().iter().map(|m| (m, false));
    let erased = chat.erased_messages().iter().map(|m| (m, true));

    let mut active_pos: i64 = 0;
    let mut erased_pos: i64 = 0;
    for (message, is_erased) in active.chain(erased) {
        let position = if is_erased {
            erased_pos += 1;
            erased_pos - 1
        } else {
            active_pos += 1;
            active_pos - 1
        };

        sqlx::query(
            r#"INSERT INTO chat_messages (id, chat_id, position, role, content, token_count, erased, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.id())
        .bind(chat.id())
        .bind(position)
        .bind(message.role().to_string())
        .bind(message.content())
        .bind(i64::from(message.token_count()))
        .bind(is_erased)
        .bind(format_datetime(&message.created_at()))
        .execute(&mut *conn)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// ChatRepository implementation
// ---------------------------------------------------------------------------

impl ChatRepository for SqliteChatRepository {
    async fn create_chat(&self, chat: &Chat) -> Result<(), RepositoryError> {
        let config = chat.config();
        let stop = serde_json::to_string(&config.stop)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let now = format_datetime(&Utc::now());

        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO chats (id, user_id, status, token_usage, version, model_name, model_max_tokens,
                                  temperature, top_p, n, stop, max_tokens, presence_penalty, frequency_penalty,
                                  created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(chat.id())
        .bind(chat.user_id())
        .bind(chat.status().to_string())
        .bind(i64::from(chat.token_usage()))
        .bind(chat.version() as i64)
        .bind(config.model.name())
        .bind(i64::from(config.model.max_tokens()))
        .bind(f64::from(config.temperature))
        .bind(f64::from(config.top_p))
        .bind(i64::from(config.n))
        .bind(stop)
        .bind(i64::from(config.max_tokens))
        .bind(f64::from(config.presence_penalty))
        .bind(f64::from(config.frequency_penalty))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.message().contains("UNIQUE") {
                    return RepositoryError::AlreadyExists(chat.id().to_string());
                }
            }
            RepositoryError::Query(e.to_string())
        })?;

        insert_messages(&mut tx, chat).await?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn find_chat_by_id(&self, chat_id: &str) -> Result<Chat, RepositoryError> {
        let row = sqlx::query("SELECT * FROM chats WHERE id = ?")
            .bind(chat_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .ok_or(RepositoryError::NotFound)?;
        let chat_row = ChatRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;

        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE chat_id = ? ORDER BY erased ASC, position ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut active = Vec::new();
        let mut erased = Vec::new();
        for row in &rows {
            let msg_row =
                ChatMessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            if msg_row.erased {
                erased.push(msg_row.into_message()?);
            } else {
                active.push(msg_row.into_message()?);
            }
        }

        chat_row.into_chat(active, erased)
    }

    async fn save_chat(&self, chat: &mut Chat) -> Result<(), RepositoryError> {
        let expected = chat.version();

        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            r#"UPDATE chats
               SET status = ?, token_usage = ?, version = version + 1, updated_at = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(chat.status().to_string())
        .bind(i64::from(chat.token_usage()))
        .bind(format_datetime(&Utc::now()))
        .bind(chat.id())
        .bind(expected as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            let stored: Option<(i64,)> = sqlx::query_as("SELECT version FROM chats WHERE id = ?")
                .bind(chat.id())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

            return Err(match stored {
                None => RepositoryError::NotFound,
                Some((version,)) => RepositoryError::Conflict(format!(
                    "chat {} is at version {version}, expected {expected}",
                    chat.id()
                )),
            });
        }

        sqlx::query("DELETE FROM chat_messages WHERE chat_id = ?")
            .bind(chat.id())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        insert_messages(&mut tx, chat).await?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        chat.set_version(expected + 1);
        tracing::debug!(chat_id = %chat.id(), version = expected + 1, "Chat saved");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        // Leak tempdir so it lives for the test
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn make_message(id: &str, role: MessageRole, tokens: u32) -> ChatMessage {
        let created_at = Utc.with_ymd_and_hms(2026, 4, 1, 9, 30, 0).unwrap();
        ChatMessage::new(id, role, format!("text of {id}"), tokens, created_at).unwrap()
    }

    fn make_chat(id: &str, max_tokens: u32) -> Chat {
        let config = ChatConfig {
            model: Model::new("gpt-4o-mini", max_tokens).unwrap(),
            temperature: 0.1,
            top_p: 0.9,
            n: 2,
            stop: vec!["###".to_string(), "END".to_string()],
            max_tokens: 300,
            presence_penalty: 0.5,
            frequency_penalty: -0.25,
        };
        Chat::new(
            id,
            "user-7",
            make_message(&format!("{id}-sys"), MessageRole::System, 10),
            config,
        )
        .unwrap()
    }

    fn ids<'a>(messages: impl IntoIterator<Item = &'a ChatMessage>) -> Vec<String> {
        messages.into_iter().map(|m| m.id().to_string()).collect()
    }

    #[tokio::test]
    async fn test_create_and_find_chat() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let chat = make_chat("c1", 100);

        repo.create_chat(&chat).await.unwrap();
        let found = repo.find_chat_by_id("c1").await.unwrap();

        assert_eq!(found.id(), "c1");
        assert_eq!(found.user_id(), "user-7");
        assert_eq!(found.status(), ChatStatus::Active);
        assert_eq!(found.version(), 0);
        assert_eq!(found.token_usage(), 10);
        assert_eq!(found.config(), chat.config());
        assert_eq!(ids(found.active_messages()), vec!["c1-sys"]);
        assert_eq!(found.active_messages()[0], chat.active_messages()[0]);
    }

    #[tokio::test]
    async fn test_find_missing_chat() {
        let repo = SqliteChatRepository::new(test_pool().await);
        assert!(matches!(
            repo.find_chat_by_id("nope").await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_create_duplicate_is_already_exists() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let chat = make_chat("dup", 100);
        repo.create_chat(&chat).await.unwrap();

        let err = repo.create_chat(&chat).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists(ref id) if id == "dup"));
    }

    #[tokio::test]
    async fn test_save_persists_window_and_eviction_order() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let mut chat = make_chat("c1", 40);
        repo.create_chat(&chat).await.unwrap();

        chat.add_message(make_message("u1", MessageRole::User, 15)).unwrap();
        chat.add_message(make_message("a1", MessageRole::Assistant, 15)).unwrap();
        chat.add_message(make_message("u2", MessageRole::User, 20)).unwrap();
        assert_eq!(ids(chat.erased_messages()), vec!["c1-sys", "u1"]);

        repo.save_chat(&mut chat).await.unwrap();
        assert_eq!(chat.version(), 1);

        let found = repo.find_chat_by_id("c1").await.unwrap();
        assert_eq!(found.version(), 1);
        assert_eq!(ids(found.active_messages()), vec!["a1", "u2"]);
        assert_eq!(ids(found.erased_messages()), vec!["c1-sys", "u1"]);
        assert_eq!(found.token_usage(), 35);
    }

    #[tokio::test]
    async fn test_save_persists_ended_status() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let mut chat = make_chat("c1", 100);
        repo.create_chat(&chat).await.unwrap();

        chat.end();
        repo.save_chat(&mut chat).await.unwrap();

        let found = repo.find_chat_by_id("c1").await.unwrap();
        assert!(found.is_ended());
    }

    #[tokio::test]
    async fn test_stale_save_is_conflict() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let chat = make_chat("c1", 100);
        repo.create_chat(&chat).await.unwrap();

        let mut first = repo.find_chat_by_id("c1").await.unwrap();
        let mut second = repo.find_chat_by_id("c1").await.unwrap();

        first.add_message(make_message("u1", MessageRole::User, 5)).unwrap();
        repo.save_chat(&mut first).await.unwrap();

        second.add_message(make_message("u2", MessageRole::User, 5)).unwrap();
        let err = repo.save_chat(&mut second).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(second.version(), 0);

        let found = repo.find_chat_by_id("c1").await.unwrap();
        assert_eq!(ids(found.active_messages()), vec!["c1-sys", "u1"]);
    }

    #[tokio::test]
    async fn test_save_unknown_chat_is_not_found() {
        let repo = SqliteChatRepository::new(test_pool().await);
        let mut chat = make_chat("ghost", 100);
        assert!(matches!(
            repo.save_chat(&mut chat).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_chat_cascades_messages() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());
        let mut chat = make_chat("c1", 100);
        repo.create_chat(&chat).await.unwrap();
        chat.add_message(make_message("u1", MessageRole::User, 5)).unwrap();
        repo.save_chat(&mut chat).await.unwrap();

        sqlx::query("DELETE FROM chats WHERE id = ?")
            .bind("c1")
            .execute(&pool.writer)
            .await
            .unwrap();

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM chat_messages WHERE chat_id = ?")
                .bind("c1")
                .fetch_one(&pool.reader)
                .await
                .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_query_error() {
        let pool = test_pool().await;
        let repo = SqliteChatRepository::new(pool.clone());
        repo.create_chat(&make_chat("c1", 100)).await.unwrap();

        sqlx::query("UPDATE chats SET stop = 'not json' WHERE id = ?")
            .bind("c1")
            .execute(&pool.writer)
            .await
            .unwrap();

        assert!(matches!(
            repo.find_chat_by_id("c1").await,
            Err(RepositoryError::Query(_))
        ));
    }
}
