use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::application::ports::{AnalysisRepository, RepositoryError};
use crate::domain::{
    AnalysisField, AnalysisFilter, AnalysisId, AnalysisSummary, AnonymousUserId, ConversationId,
    DailyCount, EmotionAnalysis, EmotionClassification, FlaggedConversation, FlaggedMessage,
    Message, MessageId, NewEmotionAnalysis, PageRequest, Urgency, UrgencyStats, UserOverview,
    ValueCount, round_one_decimal,
};

use super::pg_conversation_repository::{column, message_from_row};
use super::pg_pool::query_error;

const ANALYSIS_COLUMNS: &str = "id, message_id, conversation_id, sentiment, emotion, urgence, \
                                type_violence, raw_response, analyzed_at";

pub struct PgAnalysisRepository {
    pool: PgPool,
}

impl PgAnalysisRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn counts_by_value(
        &self,
        field: AnalysisField,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<(String, i64)>, RepositoryError> {
        let col = field.column();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {col}::text AS value, COUNT(*) AS count
            FROM emotion_analysis
            WHERE $1::timestamptz IS NULL OR analyzed_at >= $1
            GROUP BY {col}
            "#
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| Ok((column(row, "value")?, column(row, "count")?)))
            .collect()
    }
}

#[async_trait]
impl AnalysisRepository for PgAnalysisRepository {
    #[instrument(skip(self, analysis), fields(message_id = %analysis.message_id))]
    async fn insert_analysis(
        &self,
        analysis: &NewEmotionAnalysis,
    ) -> Result<EmotionAnalysis, RepositoryError> {
        let c = &analysis.classification;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO emotion_analysis
                (message_id, conversation_id, sentiment, emotion, urgence, type_violence,
                 raw_response, analyzed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ANALYSIS_COLUMNS}
            "#
        ))
        .bind(analysis.message_id.as_i64())
        .bind(analysis.conversation_id.as_i64())
        .bind(c.sentiment.as_str())
        .bind(c.emotion.as_str())
        .bind(i16::from(c.urgency.level()))
        .bind(c.violence_type.as_str())
        .bind(&analysis.raw_response)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        analysis_from_row(&row)
    }

    #[instrument(skip(self), fields(message_id = %message_id))]
    async fn find_by_message(
        &self,
        message_id: MessageId,
    ) -> Result<Option<EmotionAnalysis>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ANALYSIS_COLUMNS} FROM emotion_analysis WHERE message_id = $1"
        ))
        .bind(message_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_error)?;

        row.as_ref().map(analysis_from_row).transpose()
    }

    #[instrument(skip(self), fields(conversation_id = %conversation_id))]
    async fn list_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<EmotionAnalysis>, RepositoryError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ANALYSIS_COLUMNS} FROM emotion_analysis
            WHERE conversation_id = $1
            ORDER BY analyzed_at ASC, id ASC
            "#
        ))
        .bind(conversation_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter().map(analysis_from_row).collect()
    }

    #[instrument(skip(self), fields(field = field.column()))]
    async fn distribution(
        &self,
        field: AnalysisField,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ValueCount>, RepositoryError> {
        Ok(ValueCount::from_counts(
            self.counts_by_value(field, since).await?,
        ))
    }

    #[instrument(skip(self), fields(field = field.column()))]
    async fn top_values(
        &self,
        field: AnalysisField,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ValueCount>, RepositoryError> {
        let mut rows = ValueCount::from_counts(self.counts_by_value(field, since).await?);
        rows.truncate(limit);
        Ok(rows)
    }

    #[instrument(skip(self), fields(field = field.column()))]
    async fn daily_counts(
        &self,
        field: AnalysisField,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyCount>, RepositoryError> {
        let col = field.column();
        let rows = sqlx::query(&format!(
            r#"
            SELECT (analyzed_at AT TIME ZONE 'UTC')::date AS day,
                   {col}::text AS value,
                   COUNT(*) AS count
            FROM emotion_analysis
            WHERE analyzed_at >= $1
            GROUP BY 1, 2
            ORDER BY 1 ASC, 2 ASC
            "#
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                Ok(DailyCount {
                    date: column::<NaiveDate>(row, "day")?,
                    value: column(row, "value")?,
                    count: column(row, "count")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn summary(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<AnalysisSummary, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(AVG(urgence)::float8, 0) AS average_urgency,
                   COUNT(*) FILTER (WHERE urgence >= $2) AS high_urgency,
                   COUNT(*) FILTER (WHERE type_violence <> 'aucun') AS violence,
                   COUNT(DISTINCT conversation_id) FILTER (WHERE urgence >= $2) AS high_urgency_conversations
            FROM emotion_analysis
            WHERE $1::timestamptz IS NULL OR analyzed_at >= $1
            "#,
        )
        .bind(since)
        .bind(i16::from(Urgency::HIGH.level()))
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(AnalysisSummary {
            total_analyses: column(&row, "total")?,
            average_urgency: round_one_decimal(column(&row, "average_urgency")?),
            high_urgency_count: column(&row, "high_urgency")?,
            violence_count: column(&row, "violence")?,
            high_urgency_conversations: column(&row, "high_urgency_conversations")?,
        })
    }

    #[instrument(skip(self), fields(page = page.page))]
    async fn flagged_conversations(
        &self,
        filter: &AnalysisFilter,
        page: PageRequest,
    ) -> Result<Vec<FlaggedConversation>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.anonymous_user_id, c.title, c.updated_at,
                   (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count,
                   la.sentiment, la.emotion, la.urgence, la.type_violence
            FROM conversations c
            LEFT JOIN LATERAL (
                SELECT sentiment, emotion, urgence, type_violence
                FROM emotion_analysis ea
                WHERE ea.conversation_id = c.id
                ORDER BY ea.analyzed_at DESC, ea.id DESC
                LIMIT 1
            ) la ON TRUE
            WHERE ($1::text IS NULL OR la.sentiment = $1)
              AND ($2::smallint IS NULL OR la.urgence >= $2)
            ORDER BY c.updated_at DESC, c.id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.sentiment.map(|s| s.as_str()))
        .bind(filter.min_urgency.map(|u| i16::from(u.level())))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter().map(flagged_conversation_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn count_flagged_conversations(
        &self,
        filter: &AnalysisFilter,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM conversations c
            LEFT JOIN LATERAL (
                SELECT sentiment, urgence
                FROM emotion_analysis ea
                WHERE ea.conversation_id = c.id
                ORDER BY ea.analyzed_at DESC, ea.id DESC
                LIMIT 1
            ) la ON TRUE
            WHERE ($1::text IS NULL OR la.sentiment = $1)
              AND ($2::smallint IS NULL OR la.urgence >= $2)
            "#,
        )
        .bind(filter.sentiment.map(|s| s.as_str()))
        .bind(filter.min_urgency.map(|u| i16::from(u.level())))
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self))]
    async fn flagged_messages(
        &self,
        filter: &AnalysisFilter,
        limit: usize,
    ) -> Result<Vec<FlaggedMessage>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT m.id AS message_id, m.conversation_id, m.content, m.created_at,
                   ea.sentiment, ea.emotion, ea.urgence, ea.type_violence, ea.analyzed_at
            FROM emotion_analysis ea
            JOIN messages m ON m.id = ea.message_id
            WHERE ($1::text IS NULL OR ea.sentiment = $1)
              AND ($2::smallint IS NULL OR ea.urgence >= $2)
            ORDER BY ea.urgence DESC, ea.analyzed_at DESC, ea.id DESC
            LIMIT $3
            "#,
        )
        .bind(filter.sentiment.map(|s| s.as_str()))
        .bind(filter.min_urgency.map(|u| i16::from(u.level())))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                Ok(FlaggedMessage {
                    message_id: MessageId::from_i64(column(row, "message_id")?),
                    conversation_id: ConversationId::from_i64(column(row, "conversation_id")?),
                    content: column(row, "content")?,
                    created_at: column(row, "created_at")?,
                    analysis: classification_from_row(row)?,
                    analyzed_at: column(row, "analyzed_at")?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(page = page.page))]
    async fn list_users(&self, page: PageRequest) -> Result<Vec<UserOverview>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            WITH users AS (
                SELECT c.anonymous_user_id,
                       COUNT(DISTINCT c.id) AS total_conversations,
                       COUNT(m.id) AS total_messages,
                       MIN(c.created_at) AS first_seen,
                       MAX(c.updated_at) AS last_activity
                FROM conversations c
                LEFT JOIN messages m ON m.conversation_id = c.id
                GROUP BY c.anonymous_user_id
            )
            SELECT u.anonymous_user_id, u.total_conversations, u.total_messages,
                   u.first_seen, u.last_activity,
                   lc.id AS last_conversation_id, lc.title AS last_conversation_title,
                   (SELECT COUNT(DISTINCT ea.conversation_id)
                      FROM emotion_analysis ea
                      JOIN conversations c2 ON c2.id = ea.conversation_id
                     WHERE c2.anonymous_user_id = u.anonymous_user_id
                       AND ea.urgence >= $1) AS urgent_conversations,
                   la.sentiment, la.emotion, la.urgence, la.type_violence
            FROM users u
            CROSS JOIN LATERAL (
                SELECT id, title FROM conversations
                WHERE anonymous_user_id = u.anonymous_user_id
                ORDER BY updated_at DESC, id DESC
                LIMIT 1
            ) lc
            LEFT JOIN LATERAL (
                SELECT ea.sentiment, ea.emotion, ea.urgence, ea.type_violence
                FROM emotion_analysis ea
                JOIN conversations c3 ON c3.id = ea.conversation_id
                WHERE c3.anonymous_user_id = u.anonymous_user_id
                ORDER BY ea.analyzed_at DESC, ea.id DESC
                LIMIT 1
            ) la ON TRUE
            ORDER BY u.last_activity DESC, lc.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(i16::from(Urgency::HIGH.level()))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                Ok(UserOverview {
                    anonymous_user_id: AnonymousUserId::from_uuid(column::<Uuid>(
                        row,
                        "anonymous_user_id",
                    )?),
                    total_conversations: column(row, "total_conversations")?,
                    total_messages: column(row, "total_messages")?,
                    urgent_conversations: column(row, "urgent_conversations")?,
                    first_seen: column(row, "first_seen")?,
                    last_activity: column(row, "last_activity")?,
                    last_conversation_id: ConversationId::from_i64(column(
                        row,
                        "last_conversation_id",
                    )?),
                    last_conversation_title: column(row, "last_conversation_title")?,
                    latest_analysis: optional_classification(row)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn user_conversations(
        &self,
        user_id: &AnonymousUserId,
    ) -> Result<Vec<FlaggedConversation>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.anonymous_user_id, c.title, c.updated_at,
                   (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count,
                   la.sentiment, la.emotion, la.urgence, la.type_violence
            FROM conversations c
            LEFT JOIN LATERAL (
                SELECT sentiment, emotion, urgence, type_violence
                FROM emotion_analysis ea
                WHERE ea.conversation_id = c.id
                ORDER BY ea.analyzed_at DESC, ea.id DESC
                LIMIT 1
            ) la ON TRUE
            WHERE c.anonymous_user_id = $1
            ORDER BY c.updated_at DESC, c.id DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter().map(flagged_conversation_from_row).collect()
    }

    #[instrument(skip(self), fields(column = field.column(), user_id = %user_id))]
    async fn user_distribution(
        &self,
        field: AnalysisField,
        user_id: &AnonymousUserId,
    ) -> Result<Vec<ValueCount>, RepositoryError> {
        let col = field.column();
        let rows = sqlx::query(&format!(
            r#"
            SELECT ea.{col}::text AS value, COUNT(*) AS count
            FROM emotion_analysis ea
            JOIN conversations c ON c.id = ea.conversation_id
            WHERE c.anonymous_user_id = $1
            GROUP BY ea.{col}
            "#
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        let counts = rows
            .iter()
            .map(|row| Ok((column(row, "value")?, column(row, "count")?)))
            .collect::<Result<Vec<(String, i64)>, RepositoryError>>()?;
        Ok(ValueCount::from_counts(counts))
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn user_urgency_stats(
        &self,
        user_id: &AnonymousUserId,
    ) -> Result<UrgencyStats, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(AVG(ea.urgence)::float8, 0) AS average,
                   COALESCE(MAX(ea.urgence), 0)::int8 AS max,
                   COUNT(*) FILTER (WHERE ea.urgence >= $2) AS high_urgency
            FROM emotion_analysis ea
            JOIN conversations c ON c.id = ea.conversation_id
            WHERE c.anonymous_user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(i16::from(Urgency::HIGH.level()))
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(UrgencyStats {
            average: round_one_decimal(column(&row, "average")?),
            max: column(&row, "max")?,
            high_urgency_count: column(&row, "high_urgency")?,
        })
    }

    #[instrument(skip(self))]
    async fn unanalyzed_user_messages(
        &self,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.conversation_id, m.role, m.content, m.created_at
            FROM messages m
            LEFT JOIN emotion_analysis ea ON ea.message_id = m.id
            WHERE m.role = 'user' AND ea.id IS NULL
            ORDER BY m.created_at ASC, m.id ASC
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.iter().map(message_from_row).collect()
    }
}

fn classification_from_row(row: &PgRow) -> Result<EmotionClassification, RepositoryError> {
    let urgency = column::<i16>(row, "urgence")?;
    Ok(EmotionClassification {
        sentiment: parse_column(row, "sentiment")?,
        emotion: parse_column(row, "emotion")?,
        urgency: Urgency::new(i64::from(urgency)).ok_or_else(|| {
            RepositoryError::QueryFailed(format!("stored urgency out of range: {}", urgency))
        })?,
        violence_type: parse_column(row, "type_violence")?,
    })
}

/// Classification columns of a LEFT JOIN, `None` when no analysis matched.
fn optional_classification(row: &PgRow) -> Result<Option<EmotionClassification>, RepositoryError> {
    match column::<Option<String>>(row, "sentiment")? {
        Some(_) => Ok(Some(classification_from_row(row)?)),
        None => Ok(None),
    }
}

fn flagged_conversation_from_row(row: &PgRow) -> Result<FlaggedConversation, RepositoryError> {
    Ok(FlaggedConversation {
        id: ConversationId::from_i64(column(row, "id")?),
        anonymous_user_id: AnonymousUserId::from_uuid(column::<Uuid>(row, "anonymous_user_id")?),
        title: column(row, "title")?,
        message_count: column(row, "message_count")?,
        updated_at: column(row, "updated_at")?,
        latest_analysis: optional_classification(row)?,
    })
}

fn parse_column<T>(row: &PgRow, name: &str) -> Result<T, RepositoryError>
where
    T: std::str::FromStr<Err = String>,
{
    column::<String>(row, name)?
        .parse()
        .map_err(RepositoryError::QueryFailed)
}

fn analysis_from_row(row: &PgRow) -> Result<EmotionAnalysis, RepositoryError> {
    Ok(EmotionAnalysis {
        id: AnalysisId::from_i64(column(row, "id")?),
        message_id: MessageId::from_i64(column(row, "message_id")?),
        conversation_id: ConversationId::from_i64(column(row, "conversation_id")?),
        classification: classification_from_row(row)?,
        raw_response: column(row, "raw_response")?,
        analyzed_at: column(row, "analyzed_at")?,
    })
}
