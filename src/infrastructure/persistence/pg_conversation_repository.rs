use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use crate::application::ports::{ConversationRepository, RepositoryError};
use crate::domain::{
    ActivityTotals, AnonymousUserId, Conversation, ConversationId, ConversationSummary,
    DailyActivity, Message, MessageId, MessageRole, PageRequest, ThreadBinding, ThreadId,
    UserActivity,
};

use super::pg_pool::query_error;

const CONVERSATION_COLUMNS: &str =
    "id, anonymous_user_id, title, thread_id, created_at, updated_at";

pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    #[instrument(skip(self, title), fields(user_id = %user_id))]
    async fn create_conversation(
        &self,
        user_id: &AnonymousUserId,
        title: &str,
    ) -> Result<Conversation, RepositoryError> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO conversations (anonymous_user_id, title, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(title)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        conversation_from_row(&row)
    }

    #[instrument(skip(self), fields(conversation_id = %id))]
    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    #[instrument(skip(self), fields(conversation_id = %id, thread_id = %thread_id))]
    async fn bind_thread(
        &self,
        id: ConversationId,
        thread_id: &ThreadId,
    ) -> Result<ThreadBinding, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET thread_id = $1
            WHERE id = $2 AND thread_id IS NULL
            "#,
        )
        .bind(thread_id.as_str())
        .bind(id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 1 {
            return Ok(ThreadBinding::Bound);
        }

        let current: Option<Option<String>> =
            sqlx::query_scalar("SELECT thread_id FROM conversations WHERE id = $1")
                .bind(id.as_i64())
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;

        match current {
            None => Err(RepositoryError::NotFound(format!("conversation {}", id))),
            Some(Some(existing)) if existing == thread_id.as_str() => {
                Ok(ThreadBinding::AlreadyBound)
            }
            Some(existing) => Err(RepositoryError::ConstraintViolation(format!(
                "conversation {} is bound to thread {}",
                id,
                existing.unwrap_or_default()
            ))),
        }
    }

    #[instrument(skip(self, content), fields(conversation_id = %conversation_id, role = %role))]
    async fn append_message(
        &self,
        conversation_id: ConversationId,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, RepositoryError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let row = sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, role, content, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, conversation_id, role, content, created_at
            "#,
        )
        .bind(conversation_id.as_i64())
        .bind(role.as_str())
        .bind(content)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(query_error)?;

        sqlx::query("UPDATE conversations SET updated_at = $1 WHERE id = $2")
            .bind(now)
            .bind(conversation_id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        tx.commit().await.map_err(query_error)?;

        message_from_row(&row)
    }

    #[instrument(skip(self), fields(message_id = %id))]
    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, conversation_id, role, content, created_at FROM messages WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.as_ref().map(message_from_row).transpose()
    }

    #[instrument(skip(self), fields(conversation_id = %conversation_id))]
    async fn get_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter().map(message_from_row).collect()
    }

    #[instrument(skip(self, title), fields(conversation_id = %id))]
    async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE conversations SET title = $1 WHERE id = $2")
            .bind(title)
            .bind(id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("conversation {}", id)));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(conversation_id = %id))]
    async fn delete_conversation(&self, id: ConversationId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let analyses = sqlx::query(
            r#"
            DELETE FROM emotion_analysis
            WHERE conversation_id = $1
               OR message_id IN (SELECT id FROM messages WHERE conversation_id = $1)
            "#,
        )
        .bind(id.as_i64())
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        let messages = sqlx::query("DELETE FROM messages WHERE conversation_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        let conversations = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;

        if conversations.rows_affected() == 0 {
            tx.rollback().await.map_err(query_error)?;
            return Err(RepositoryError::NotFound(format!("conversation {}", id)));
        }

        tx.commit().await.map_err(query_error)?;

        tracing::debug!(
            analyses = analyses.rows_affected(),
            messages = messages.rows_affected(),
            "Conversation rows removed"
        );
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id, page = page.page))]
    async fn list_by_user(
        &self,
        user_id: &AnonymousUserId,
        page: PageRequest,
    ) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.title, c.thread_id, c.created_at, c.updated_at,
                   (SELECT m.content FROM messages m
                     WHERE m.conversation_id = c.id
                     ORDER BY m.created_at ASC, m.id ASC
                     LIMIT 1) AS first_message,
                   (SELECT COUNT(*) FROM messages m
                     WHERE m.conversation_id = c.id) AS message_count
            FROM conversations c
            WHERE c.anonymous_user_id = $1
            ORDER BY c.updated_at DESC, c.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                Ok(ConversationSummary {
                    id: ConversationId::from_i64(column(row, "id")?),
                    title: column(row, "title")?,
                    thread_id: column::<Option<String>>(row, "thread_id")?.map(ThreadId::new),
                    first_message: column(row, "first_message")?,
                    message_count: column(row, "message_count")?,
                    created_at: column(row, "created_at")?,
                    updated_at: column(row, "updated_at")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn count_by_user(&self, user_id: &AnonymousUserId) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE anonymous_user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(query_error)?;

        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self))]
    async fn activity_totals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<ActivityTotals, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(DISTINCT anonymous_user_id) FROM conversations
                  WHERE $1::timestamptz IS NULL OR created_at >= $1) AS users,
                (SELECT COUNT(*) FROM conversations
                  WHERE $1::timestamptz IS NULL OR created_at >= $1) AS conversations,
                (SELECT COUNT(*) FROM messages
                  WHERE $1::timestamptz IS NULL OR created_at >= $1) AS messages,
                (SELECT COUNT(*) FROM messages
                  WHERE role = 'user' AND ($1::timestamptz IS NULL OR created_at >= $1)) AS user_messages
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(ActivityTotals {
            users: column(&row, "users")?,
            conversations: column(&row, "conversations")?,
            messages: column(&row, "messages")?,
            user_messages: column(&row, "user_messages")?,
        })
    }

    #[instrument(skip(self))]
    async fn count_users(&self) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT anonymous_user_id) FROM conversations")
                .fetch_one(&self.pool)
                .await
                .map_err(query_error)?;

        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn user_activity(
        &self,
        user_id: &AnonymousUserId,
    ) -> Result<Option<UserActivity>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(DISTINCT c.id) AS total_conversations,
                   COUNT(m.id) AS total_messages,
                   COUNT(m.id) FILTER (WHERE m.role = 'user') AS user_messages,
                   COUNT(m.id) FILTER (WHERE m.role = 'assistant') AS assistant_messages,
                   MIN(c.created_at) AS first_seen,
                   MAX(c.updated_at) AS last_activity
            FROM conversations c
            LEFT JOIN messages m ON m.conversation_id = c.id
            WHERE c.anonymous_user_id = $1
            GROUP BY c.anonymous_user_id
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.map(|row| -> Result<UserActivity, RepositoryError> {
            Ok(UserActivity {
                anonymous_user_id: *user_id,
                total_conversations: column(&row, "total_conversations")?,
                total_messages: column(&row, "total_messages")?,
                user_messages: column(&row, "user_messages")?,
                assistant_messages: column(&row, "assistant_messages")?,
                first_seen: column(&row, "first_seen")?,
                last_activity: column(&row, "last_activity")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self))]
    async fn daily_activity(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyActivity>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            WITH c AS (
                SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) AS n
                FROM conversations
                WHERE created_at >= $1
                GROUP BY 1
            ),
            m AS (
                SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) AS n
                FROM messages
                WHERE role = 'user' AND created_at >= $1
                GROUP BY 1
            )
            SELECT COALESCE(c.day, m.day) AS day,
                   COALESCE(c.n, 0) AS conversations,
                   COALESCE(m.n, 0) AS user_messages
            FROM c FULL OUTER JOIN m ON c.day = m.day
            ORDER BY day ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                Ok(DailyActivity {
                    date: column::<NaiveDate>(row, "day")?,
                    conversations: column(row, "conversations")?,
                    user_messages: column(row, "user_messages")?,
                })
            })
            .collect()
    }
}

pub(crate) fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| RepositoryError::QueryFailed(format!("column {}: {}", name, e)))
}

fn conversation_from_row(row: &PgRow) -> Result<Conversation, RepositoryError> {
    Ok(Conversation {
        id: ConversationId::from_i64(column(row, "id")?),
        anonymous_user_id: AnonymousUserId::from_uuid(column::<Uuid>(row, "anonymous_user_id")?),
        title: column(row, "title")?,
        thread_id: column::<Option<String>>(row, "thread_id")?.map(ThreadId::new),
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

pub(crate) fn message_from_row(row: &PgRow) -> Result<Message, RepositoryError> {
    let role = column::<String>(row, "role")?
        .parse::<MessageRole>()
        .map_err(RepositoryError::QueryFailed)?;

    Ok(Message {
        id: MessageId::from_i64(column(row, "id")?),
        conversation_id: ConversationId::from_i64(column(row, "conversation_id")?),
        role,
        content: column(row, "content")?,
        created_at: column(row, "created_at")?,
    })
}
