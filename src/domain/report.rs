use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;

use super::{
    AnonymousUserId, ConversationId, EmotionClassification, MessageId, Sentiment, Urgency,
};

/// Classified column of an emotion analysis that can be aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisField {
    Sentiment,
    Emotion,
    Urgency,
    ViolenceType,
}

impl AnalysisField {
    pub fn column(&self) -> &'static str {
        match self {
            AnalysisField::Sentiment => "sentiment",
            AnalysisField::Emotion => "emotion",
            AnalysisField::Urgency => "urgence",
            AnalysisField::ViolenceType => "type_violence",
        }
    }

    pub fn value_of(&self, classification: &EmotionClassification) -> String {
        match self {
            AnalysisField::Sentiment => classification.sentiment.as_str().to_string(),
            AnalysisField::Emotion => classification.emotion.as_str().to_string(),
            AnalysisField::Urgency => classification.urgency.to_string(),
            AnalysisField::ViolenceType => classification.violence_type.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: i64,
    pub percentage: f64,
}

impl ValueCount {
    /// Attaches each count's share of the total, rounded to one decimal.
    /// Rows are ordered by descending count, ties by value.
    pub fn from_counts(counts: Vec<(String, i64)>) -> Vec<ValueCount> {
        let total: i64 = counts.iter().map(|(_, count)| count).sum();
        let mut rows: Vec<ValueCount> = counts
            .into_iter()
            .map(|(value, count)| ValueCount {
                value,
                count,
                percentage: percentage(count, total),
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        rows
    }
}

fn percentage(count: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_one_decimal(count as f64 * 100.0 / total as f64)
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub value: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub total_analyses: i64,
    pub average_urgency: f64,
    pub high_urgency_count: i64,
    pub violence_count: i64,
    pub high_urgency_conversations: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityTotals {
    pub users: i64,
    pub conversations: i64,
    pub messages: i64,
    pub user_messages: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub conversations: i64,
    pub user_messages: i64,
}

/// Selects analyses by exact sentiment and/or minimum urgency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisFilter {
    pub sentiment: Option<Sentiment>,
    pub min_urgency: Option<Urgency>,
}

impl AnalysisFilter {
    pub fn matches(&self, classification: &EmotionClassification) -> bool {
        self.sentiment.is_none_or(|s| classification.sentiment == s)
            && self.min_urgency.is_none_or(|u| classification.urgency >= u)
    }

    pub fn is_empty(&self) -> bool {
        self.sentiment.is_none() && self.min_urgency.is_none()
    }
}

/// Trailing reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPeriod {
    LastDays(u32),
    All,
}

impl ReportPeriod {
    pub fn parse(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(ReportPeriod::All);
        }
        match trimmed.parse::<u32>() {
            Ok(days) if days > 0 => Ok(ReportPeriod::LastDays(days)),
            _ => Err(format!("Invalid period: {}", input)),
        }
    }

    /// Start of the window: midnight UTC `days` days before `now`'s date.
    /// A window reaching past the earliest representable date covers everything.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ReportPeriod::All => None,
            ReportPeriod::LastDays(days) => {
                start_of_day(now).checked_sub_days(Days::new(u64::from(*days)))
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            ReportPeriod::All => "all".to_string(),
            ReportPeriod::LastDays(days) => format!("last {} days", days),
        }
    }
}

impl Default for ReportPeriod {
    fn default() -> Self {
        ReportPeriod::LastDays(7)
    }
}

pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc()
}

pub fn days_back(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let today = start_of_day(now);
    today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(today)
}

#[derive(Debug, Clone, Serialize)]
pub struct FlaggedConversation {
    pub id: ConversationId,
    pub anonymous_user_id: AnonymousUserId,
    pub title: String,
    pub message_count: i64,
    pub updated_at: DateTime<Utc>,
    pub latest_analysis: Option<EmotionClassification>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlaggedMessage {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub analysis: EmotionClassification,
    pub analyzed_at: DateTime<Utc>,
}

/// One anonymous user as seen by the back office.
#[derive(Debug, Clone, Serialize)]
pub struct UserOverview {
    pub anonymous_user_id: AnonymousUserId,
    pub total_conversations: i64,
    pub total_messages: i64,
    pub urgent_conversations: i64,
    pub first_seen: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_conversation_id: ConversationId,
    pub last_conversation_title: String,
    pub latest_analysis: Option<EmotionClassification>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserActivity {
    pub anonymous_user_id: AnonymousUserId,
    pub total_conversations: i64,
    pub total_messages: i64,
    pub user_messages: i64,
    pub assistant_messages: i64,
    pub first_seen: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Urgency over every analysis of one user. `max` is 0 when nothing was analysed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UrgencyStats {
    pub average: f64,
    pub max: i64,
    pub high_urgency_count: i64,
}
