use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::application::ports::{AnalysisRepository, ConversationRepository, RepositoryError};
use crate::domain::{
    ActivityTotals, AnalysisField, AnalysisFilter, AnalysisSummary, AnonymousUserId, Conversation,
    ConversationId, DailyActivity, DailyCount, EmotionAnalysis, FlaggedConversation,
    FlaggedMessage, Message, PageRequest, Pagination, ReportPeriod, Sentiment, Urgency,
    UrgencyStats, UserActivity, UserOverview, ValueCount, ViolenceType, days_back,
    round_one_decimal, start_of_day,
};

use super::ErrorKind;

const TREND_DAYS: u32 = 30;
const DASHBOARD_SENTIMENT_DAYS: u32 = 7;
const TOP_EMOTIONS: usize = 10;
const DASHBOARD_TOP_EMOTIONS: usize = 5;
const RECENT_CONVERSATIONS: u32 = 5;
const USER_TOP_EMOTIONS: usize = 5;
const DEFAULT_MESSAGE_LIMIT: usize = 20;
const MAX_MESSAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct EmotionReport {
    pub period: String,
    pub summary: AnalysisSummary,
    pub sentiments: Vec<ValueCount>,
    pub top_emotions: Vec<ValueCount>,
    pub urgency_levels: Vec<ValueCount>,
    pub violence_types: Vec<ValueCount>,
    pub sentiment_trend: Vec<DailyCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DashboardAverages {
    pub messages_per_conversation: f64,
    pub conversations_per_user: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub totals: ActivityTotals,
    pub today: ActivityTotals,
    pub sentiments_last_7_days: Vec<ValueCount>,
    pub top_emotions: Vec<ValueCount>,
    pub high_urgency_conversations: i64,
    pub violence_types: Vec<ValueCount>,
    pub daily_activity: Vec<DailyActivity>,
    pub averages: DashboardAverages,
    pub recent_conversations: Vec<FlaggedConversation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlaggedConversationPage {
    pub conversations: Vec<FlaggedConversation>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone)]
pub struct ReviewedMessage {
    pub message: Message,
    pub analysis: Option<EmotionAnalysis>,
}

#[derive(Debug, Clone)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<ReviewedMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub users: Vec<UserOverview>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserEmotions {
    pub sentiments: Vec<ValueCount>,
    pub top_emotions: Vec<ValueCount>,
    pub violence_types: Vec<ValueCount>,
    pub urgency: UrgencyStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserDetail {
    pub user: UserActivity,
    pub conversations: Vec<FlaggedConversation>,
    pub emotions: UserEmotions,
}

/// Read-only aggregates over conversations and analyses for the back office.
/// Missing data always yields zeroes and empty lists.
pub struct ReportingService {
    conversation_repository: Arc<dyn ConversationRepository>,
    analysis_repository: Arc<dyn AnalysisRepository>,
    default_page_size: u32,
    max_page_size: u32,
}

impl ReportingService {
    pub fn new(
        conversation_repository: Arc<dyn ConversationRepository>,
        analysis_repository: Arc<dyn AnalysisRepository>,
        default_page_size: u32,
        max_page_size: u32,
    ) -> Self {
        Self {
            conversation_repository,
            analysis_repository,
            default_page_size,
            max_page_size,
        }
    }

    #[tracing::instrument(skip(self), fields(period = %period.label()))]
    pub async fn emotion_report(&self, period: ReportPeriod) -> Result<EmotionReport, ReportingError> {
        let now = Utc::now();
        let since = period.since(now);
        let analyses = &self.analysis_repository;

        let summary = analyses.summary(since).await?;
        let sentiments = analyses
            .distribution(AnalysisField::Sentiment, since)
            .await?;
        let top_emotions = analyses
            .top_values(AnalysisField::Emotion, since, TOP_EMOTIONS)
            .await?;
        let urgency_levels = by_level(
            analyses
                .distribution(AnalysisField::Urgency, since)
                .await?,
        );
        let violence_types = reported_violence(
            analyses
                .distribution(AnalysisField::ViolenceType, since)
                .await?,
        );
        let sentiment_trend = analyses
            .daily_counts(AnalysisField::Sentiment, days_back(now, TREND_DAYS))
            .await?;

        Ok(EmotionReport {
            period: period.label(),
            summary,
            sentiments,
            top_emotions,
            urgency_levels,
            violence_types,
            sentiment_trend,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn dashboard(&self) -> Result<Dashboard, ReportingError> {
        let now = Utc::now();
        let week = Some(days_back(now, DASHBOARD_SENTIMENT_DAYS));

        let totals = self.conversation_repository.activity_totals(None).await?;
        let today = self
            .conversation_repository
            .activity_totals(Some(start_of_day(now)))
            .await?;
        let daily_activity = self
            .conversation_repository
            .daily_activity(days_back(now, TREND_DAYS))
            .await?;

        let sentiments_last_7_days = self
            .analysis_repository
            .distribution(AnalysisField::Sentiment, week)
            .await?;
        let top_emotions = self
            .analysis_repository
            .top_values(AnalysisField::Emotion, week, DASHBOARD_TOP_EMOTIONS)
            .await?;
        let summary = self.analysis_repository.summary(None).await?;
        let violence_types = reported_violence(
            self.analysis_repository
                .distribution(AnalysisField::ViolenceType, None)
                .await?,
        );
        let recent_conversations = self
            .analysis_repository
            .flagged_conversations(
                &AnalysisFilter::default(),
                PageRequest {
                    page: 1,
                    per_page: RECENT_CONVERSATIONS,
                },
            )
            .await?;

        Ok(Dashboard {
            averages: DashboardAverages {
                messages_per_conversation: ratio(totals.messages, totals.conversations),
                conversations_per_user: ratio(totals.conversations, totals.users),
            },
            totals,
            today,
            sentiments_last_7_days,
            top_emotions,
            high_urgency_conversations: summary.high_urgency_conversations,
            violence_types,
            daily_activity,
            recent_conversations,
        })
    }

    /// Conversations whose latest analysis matches `filter`.
    #[tracing::instrument(skip(self))]
    pub async fn flagged_conversations(
        &self,
        filter: AnalysisFilter,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<FlaggedConversationPage, ReportingError> {
        let page = PageRequest::clamped(page, per_page, self.default_page_size, self.max_page_size);
        let total = self
            .analysis_repository
            .count_flagged_conversations(&filter)
            .await?;
        let conversations = self
            .analysis_repository
            .flagged_conversations(&filter, page)
            .await?;

        Ok(FlaggedConversationPage {
            conversations,
            pagination: page.pagination(total),
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn flagged_messages(
        &self,
        filter: AnalysisFilter,
        limit: Option<usize>,
    ) -> Result<Vec<FlaggedMessage>, ReportingError> {
        let limit = limit
            .filter(|l| (1..=MAX_MESSAGE_LIMIT).contains(l))
            .unwrap_or(DEFAULT_MESSAGE_LIMIT);
        Ok(self
            .analysis_repository
            .flagged_messages(&filter, limit)
            .await?)
    }

    /// A conversation with each of its messages joined to its analysis, if any.
    #[tracing::instrument(skip(self), fields(conversation_id = %id))]
    pub async fn conversation_detail(
        &self,
        id: ConversationId,
    ) -> Result<ConversationDetail, ReportingError> {
        let conversation = self
            .conversation_repository
            .get_conversation(id)
            .await?
            .ok_or(ReportingError::NotFound(id))?;
        let messages = self.conversation_repository.get_messages(id).await?;
        let mut analyses = self.analysis_repository.list_for_conversation(id).await?;

        let messages = messages
            .into_iter()
            .map(|message| {
                let analysis = analyses
                    .iter()
                    .position(|a| a.message_id == message.id)
                    .map(|idx| analyses.swap_remove(idx));
                ReviewedMessage { message, analysis }
            })
            .collect();

        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn users(
        &self,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<UserPage, ReportingError> {
        let page = PageRequest::clamped(page, per_page, self.default_page_size, self.max_page_size);
        let total = self.conversation_repository.count_users().await?;
        let users = self.analysis_repository.list_users(page).await?;

        Ok(UserPage {
            users,
            pagination: page.pagination(total),
        })
    }

    /// Activity, conversations and emotional profile of one anonymous user.
    #[tracing::instrument(skip(self))]
    pub async fn user_detail(&self, user_id: &str) -> Result<UserDetail, ReportingError> {
        let user_id =
            AnonymousUserId::parse(user_id.trim()).map_err(ReportingError::Validation)?;
        let user = self
            .conversation_repository
            .user_activity(&user_id)
            .await?
            .ok_or(ReportingError::UserNotFound(user_id))?;

        let analyses = &self.analysis_repository;
        let conversations = analyses.user_conversations(&user_id).await?;
        let sentiments = analyses
            .user_distribution(AnalysisField::Sentiment, &user_id)
            .await?;
        let mut top_emotions = analyses
            .user_distribution(AnalysisField::Emotion, &user_id)
            .await?;
        top_emotions.truncate(USER_TOP_EMOTIONS);
        let violence_types = reported_violence(
            analyses
                .user_distribution(AnalysisField::ViolenceType, &user_id)
                .await?,
        );
        let urgency = analyses.user_urgency_stats(&user_id).await?;

        Ok(UserDetail {
            user,
            conversations,
            emotions: UserEmotions {
                sentiments,
                top_emotions,
                violence_types,
                urgency,
            },
        })
    }
}

/// Builds a filter from raw query values. Blank values are ignored.
pub fn analysis_filter(
    sentiment: Option<&str>,
    min_urgency: Option<&str>,
) -> Result<AnalysisFilter, ReportingError> {
    let sentiment = sentiment
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<Sentiment>)
        .transpose()
        .map_err(ReportingError::Validation)?;
    let min_urgency = min_urgency
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<Urgency>)
        .transpose()
        .map_err(ReportingError::Validation)?;
    Ok(AnalysisFilter {
        sentiment,
        min_urgency,
    })
}

fn by_level(mut rows: Vec<ValueCount>) -> Vec<ValueCount> {
    rows.sort_by_key(|row| row.value.parse::<u8>().unwrap_or(u8::MAX));
    rows
}

/// Drops the "no violence" bucket and recomputes shares among reported types.
fn reported_violence(rows: Vec<ValueCount>) -> Vec<ValueCount> {
    ValueCount::from_counts(
        rows.into_iter()
            .filter(|row| row.value != ViolenceType::Absent.as_str())
            .map(|row| (row.value, row.count))
            .collect(),
    )
}

fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round_one_decimal(numerator as f64 / denominator as f64)
}

#[derive(Debug, thiserror::Error)]
pub enum ReportingError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),
    #[error("user not found: {0}")]
    UserNotFound(AnonymousUserId),
    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),
}

impl ReportingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReportingError::Validation(_) => ErrorKind::Validation,
            ReportingError::NotFound(_) | ReportingError::UserNotFound(_) => ErrorKind::NotFound,
            ReportingError::Repository(_) => ErrorKind::Storage,
        }
    }
}
