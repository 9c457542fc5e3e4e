use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::application::ports::{AnalysisRepository, ConversationRepository, RepositoryError};
use crate::domain::{
    ActivityTotals, AnalysisField, AnalysisFilter, AnalysisId, AnalysisSummary, AnonymousUserId,
    Conversation, ConversationId, ConversationSummary, DailyActivity, DailyCount,
    EmotionAnalysis, EmotionClassification, FlaggedConversation, FlaggedMessage, Message,
    MessageId, MessageRole, NewEmotionAnalysis, PageRequest, ThreadBinding, ThreadId, Urgency,
    UrgencyStats, UserActivity, UserOverview, ValueCount, round_one_decimal,
};

#[derive(Default)]
struct State {
    last_conversation_id: i64,
    last_message_id: i64,
    last_analysis_id: i64,
    conversations: BTreeMap<ConversationId, Conversation>,
    messages: BTreeMap<MessageId, Message>,
    analyses: BTreeMap<AnalysisId, EmotionAnalysis>,
}

impl State {
    fn messages_of(&self, id: ConversationId) -> impl Iterator<Item = &Message> {
        self.messages.values().filter(move |m| m.conversation_id == id)
    }

    fn analyses_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> impl Iterator<Item = &EmotionAnalysis> {
        self.analyses
            .values()
            .filter(move |a| since.is_none_or(|s| a.analyzed_at >= s))
    }

    fn latest_analysis(&self, id: ConversationId) -> Option<&EmotionAnalysis> {
        self.analyses
            .values()
            .filter(|a| a.conversation_id == id)
            .max_by_key(|a| (a.analyzed_at, a.id))
    }

    fn analyses_of_user<'a>(
        &'a self,
        user_id: &'a AnonymousUserId,
    ) -> impl Iterator<Item = &'a EmotionAnalysis> {
        self.analyses.values().filter(move |a| {
            self.conversations
                .get(&a.conversation_id)
                .is_some_and(|c| c.is_owned_by(user_id))
        })
    }

    fn counts(
        &self,
        field: AnalysisField,
        since: Option<DateTime<Utc>>,
    ) -> Vec<(String, i64)> {
        count_values(field, self.analyses_since(since))
    }

    fn flagged_row(&self, conversation: &Conversation) -> FlaggedConversation {
        FlaggedConversation {
            id: conversation.id,
            anonymous_user_id: conversation.anonymous_user_id,
            title: conversation.title.clone(),
            message_count: self.messages_of(conversation.id).count() as i64,
            updated_at: conversation.updated_at,
            latest_analysis: self
                .latest_analysis(conversation.id)
                .map(|a| a.classification),
        }
    }

    /// Conversations whose latest analysis matches, most recently active first.
    fn flagged(&self, filter: &AnalysisFilter) -> Vec<FlaggedConversation> {
        let mut rows: Vec<FlaggedConversation> = self
            .conversations
            .values()
            .map(|c| self.flagged_row(c))
            .filter(|row| match &row.latest_analysis {
                Some(classification) => filter.matches(classification),
                None => filter.is_empty(),
            })
            .collect();
        sort_by_activity(&mut rows);
        rows
    }

    fn user_overviews(&self) -> Vec<UserOverview> {
        let mut by_user: HashMap<AnonymousUserId, Vec<&Conversation>> = HashMap::new();
        for conversation in self.conversations.values() {
            by_user
                .entry(conversation.anonymous_user_id)
                .or_default()
                .push(conversation);
        }

        let mut rows: Vec<UserOverview> = by_user
            .into_iter()
            .filter_map(|(user_id, conversations)| {
                let last = conversations.iter().max_by_key(|c| (c.updated_at, c.id))?;
                let first_seen = conversations.iter().map(|c| c.created_at).min()?;
                let analyses: Vec<&EmotionAnalysis> = self.analyses_of_user(&user_id).collect();
                let urgent: HashSet<ConversationId> = analyses
                    .iter()
                    .filter(|a| a.classification.urgency >= Urgency::HIGH)
                    .map(|a| a.conversation_id)
                    .collect();

                Some(UserOverview {
                    anonymous_user_id: user_id,
                    total_conversations: conversations.len() as i64,
                    total_messages: conversations
                        .iter()
                        .map(|c| self.messages_of(c.id).count() as i64)
                        .sum(),
                    urgent_conversations: urgent.len() as i64,
                    first_seen,
                    last_activity: last.updated_at,
                    last_conversation_id: last.id,
                    last_conversation_title: last.title.clone(),
                    latest_analysis: analyses
                        .iter()
                        .max_by_key(|a| (a.analyzed_at, a.id))
                        .map(|a| a.classification),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then(b.last_conversation_id.cmp(&a.last_conversation_id))
        });
        rows
    }
}

fn count_values<'a>(
    field: AnalysisField,
    analyses: impl Iterator<Item = &'a EmotionAnalysis>,
) -> Vec<(String, i64)> {
    let mut counts: HashMap<String, i64> = HashMap::new();
    for analysis in analyses {
        *counts
            .entry(field.value_of(&analysis.classification))
            .or_default() += 1;
    }
    counts.into_iter().collect()
}

fn sort_by_activity(rows: &mut [FlaggedConversation]) {
    rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
}

/// Process-local store backing both repository ports. Used when no database
/// is configured and in tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: ConversationId) -> RepositoryError {
    RepositoryError::NotFound(format!("conversation {}", id))
}

fn page_of<T>(rows: Vec<T>, page: PageRequest) -> Vec<T> {
    rows.into_iter()
        .skip(page.offset().max(0) as usize)
        .take(page.limit().max(0) as usize)
        .collect()
}

fn activity_day(
    days: &mut BTreeMap<NaiveDate, DailyActivity>,
    date: NaiveDate,
) -> &mut DailyActivity {
    days.entry(date).or_insert(DailyActivity {
        date,
        conversations: 0,
        user_messages: 0,
    })
}

#[async_trait]
impl ConversationRepository for InMemoryStore {
    async fn create_conversation(
        &self,
        user_id: &AnonymousUserId,
        title: &str,
    ) -> Result<Conversation, RepositoryError> {
        let mut state = self.state.write().await;
        state.last_conversation_id += 1;
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::from_i64(state.last_conversation_id),
            anonymous_user_id: *user_id,
            title: title.to_string(),
            thread_id: None,
            created_at: now,
            updated_at: now,
        };
        state
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn bind_thread(
        &self,
        id: ConversationId,
        thread_id: &ThreadId,
    ) -> Result<ThreadBinding, RepositoryError> {
        let mut state = self.state.write().await;
        let conversation = state.conversations.get_mut(&id).ok_or_else(|| not_found(id))?;
        if let Some(existing) = &conversation.thread_id {
            if existing == thread_id {
                return Ok(ThreadBinding::AlreadyBound);
            }
            return Err(RepositoryError::ConstraintViolation(format!(
                "conversation {} is bound to thread {}",
                id, existing
            )));
        }
        conversation.thread_id = Some(thread_id.clone());
        Ok(ThreadBinding::Bound)
    }

    async fn append_message(
        &self,
        conversation_id: ConversationId,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, RepositoryError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let conversation = state
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| not_found(conversation_id))?;
        conversation.updated_at = now;

        state.last_message_id += 1;
        let message = Message {
            id: MessageId::from_i64(state.last_message_id),
            conversation_id,
            role,
            content: content.to_string(),
            created_at: now,
        };
        state.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self.state.read().await.messages.get(&id).cloned())
    }

    async fn get_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.messages_of(conversation_id).cloned().collect())
    }

    async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let conversation = state.conversations.get_mut(&id).ok_or_else(|| not_found(id))?;
        conversation.title = title.to_string();
        Ok(())
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.conversations.remove(&id).is_none() {
            return Err(not_found(id));
        }
        let removed: HashSet<MessageId> = state.messages_of(id).map(|m| m.id).collect();
        state.messages.retain(|_, m| m.conversation_id != id);
        state
            .analyses
            .retain(|_, a| a.conversation_id != id && !removed.contains(&a.message_id));
        Ok(())
    }

    async fn list_by_user(
        &self,
        user_id: &AnonymousUserId,
        page: PageRequest,
    ) -> Result<Vec<ConversationSummary>, RepositoryError> {
        let state = self.state.read().await;
        let mut rows: Vec<ConversationSummary> = state
            .conversations
            .values()
            .filter(|c| c.is_owned_by(user_id))
            .map(|c| {
                let messages: Vec<&Message> = state.messages_of(c.id).collect();
                ConversationSummary {
                    id: c.id,
                    title: c.title.clone(),
                    thread_id: c.thread_id.clone(),
                    message_count: messages.len() as i64,
                    first_message: messages.first().map(|m| m.content.clone()),
                    created_at: c.created_at,
                    updated_at: c.updated_at,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        Ok(page_of(rows, page))
    }

    async fn count_by_user(&self, user_id: &AnonymousUserId) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .conversations
            .values()
            .filter(|c| c.is_owned_by(user_id))
            .count() as u64)
    }

    async fn activity_totals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<ActivityTotals, RepositoryError> {
        let state = self.state.read().await;
        let in_window = |at: DateTime<Utc>| since.is_none_or(|s| at >= s);

        let conversations: Vec<&Conversation> = state
            .conversations
            .values()
            .filter(|c| in_window(c.created_at))
            .collect();
        let users: HashSet<AnonymousUserId> =
            conversations.iter().map(|c| c.anonymous_user_id).collect();
        let messages: Vec<&Message> = state
            .messages
            .values()
            .filter(|m| in_window(m.created_at))
            .collect();

        Ok(ActivityTotals {
            users: users.len() as i64,
            conversations: conversations.len() as i64,
            messages: messages.len() as i64,
            user_messages: messages
                .iter()
                .filter(|m| m.role == MessageRole::User)
                .count() as i64,
        })
    }

    async fn count_users(&self) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        let users: HashSet<AnonymousUserId> = state
            .conversations
            .values()
            .map(|c| c.anonymous_user_id)
            .collect();
        Ok(users.len() as u64)
    }

    async fn user_activity(
        &self,
        user_id: &AnonymousUserId,
    ) -> Result<Option<UserActivity>, RepositoryError> {
        let state = self.state.read().await;
        let conversations: Vec<&Conversation> = state
            .conversations
            .values()
            .filter(|c| c.is_owned_by(user_id))
            .collect();
        let (Some(first_seen), Some(last_activity)) = (
            conversations.iter().map(|c| c.created_at).min(),
            conversations.iter().map(|c| c.updated_at).max(),
        ) else {
            return Ok(None);
        };

        let messages: Vec<&Message> = conversations
            .iter()
            .flat_map(|c| state.messages_of(c.id))
            .collect();
        let with_role =
            |role: MessageRole| messages.iter().filter(|m| m.role == role).count() as i64;

        Ok(Some(UserActivity {
            anonymous_user_id: *user_id,
            total_conversations: conversations.len() as i64,
            total_messages: messages.len() as i64,
            user_messages: with_role(MessageRole::User),
            assistant_messages: with_role(MessageRole::Assistant),
            first_seen,
            last_activity,
        }))
    }

    async fn daily_activity(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyActivity>, RepositoryError> {
        let state = self.state.read().await;
        let mut days: BTreeMap<NaiveDate, DailyActivity> = BTreeMap::new();

        for conversation in state.conversations.values() {
            if conversation.created_at >= since {
                activity_day(&mut days, conversation.created_at.date_naive()).conversations += 1;
            }
        }
        for message in state.messages.values() {
            if message.role == MessageRole::User && message.created_at >= since {
                activity_day(&mut days, message.created_at.date_naive()).user_messages += 1;
            }
        }
        Ok(days.into_values().collect())
    }
}

#[async_trait]
impl AnalysisRepository for InMemoryStore {
    async fn insert_analysis(
        &self,
        analysis: &NewEmotionAnalysis,
    ) -> Result<EmotionAnalysis, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.messages.contains_key(&analysis.message_id) {
            return Err(RepositoryError::NotFound(format!(
                "message {}",
                analysis.message_id
            )));
        }
        if state
            .analyses
            .values()
            .any(|a| a.message_id == analysis.message_id)
        {
            return Err(RepositoryError::ConstraintViolation(format!(
                "message {} already has an analysis",
                analysis.message_id
            )));
        }

        state.last_analysis_id += 1;
        let stored = EmotionAnalysis {
            id: AnalysisId::from_i64(state.last_analysis_id),
            message_id: analysis.message_id,
            conversation_id: analysis.conversation_id,
            classification: analysis.classification,
            raw_response: analysis.raw_response.clone(),
            analyzed_at: Utc::now(),
        };
        state.analyses.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_by_message(
        &self,
        message_id: MessageId,
    ) -> Result<Option<EmotionAnalysis>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .analyses
            .values()
            .find(|a| a.message_id == message_id)
            .cloned())
    }

    async fn list_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<EmotionAnalysis>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .analyses
            .values()
            .filter(|a| a.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn distribution(
        &self,
        field: AnalysisField,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ValueCount>, RepositoryError> {
        let state = self.state.read().await;
        Ok(ValueCount::from_counts(state.counts(field, since)))
    }

    async fn top_values(
        &self,
        field: AnalysisField,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<ValueCount>, RepositoryError> {
        let state = self.state.read().await;
        let mut rows = ValueCount::from_counts(state.counts(field, since));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn daily_counts(
        &self,
        field: AnalysisField,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyCount>, RepositoryError> {
        let state = self.state.read().await;
        let mut counts: BTreeMap<(NaiveDate, String), i64> = BTreeMap::new();
        for analysis in state.analyses_since(Some(since)) {
            let key = (
                analysis.analyzed_at.date_naive(),
                field.value_of(&analysis.classification),
            );
            *counts.entry(key).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|((date, value), count)| DailyCount { date, value, count })
            .collect())
    }

    async fn summary(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<AnalysisSummary, RepositoryError> {
        let state = self.state.read().await;
        let analyses: Vec<&EmotionClassification> = state
            .analyses_since(since)
            .map(|a| &a.classification)
            .collect();
        let high_urgency_conversations: HashSet<ConversationId> = state
            .analyses_since(since)
            .filter(|a| a.classification.urgency >= Urgency::HIGH)
            .map(|a| a.conversation_id)
            .collect();

        let total = analyses.len() as i64;
        let urgency_sum: i64 = analyses.iter().map(|c| i64::from(c.urgency.level())).sum();
        let average_urgency = if total == 0 {
            0.0
        } else {
            round_one_decimal(urgency_sum as f64 / total as f64)
        };

        Ok(AnalysisSummary {
            total_analyses: total,
            average_urgency,
            high_urgency_count: analyses
                .iter()
                .filter(|c| c.urgency >= Urgency::HIGH)
                .count() as i64,
            violence_count: analyses
                .iter()
                .filter(|c| c.violence_type.is_reported())
                .count() as i64,
            high_urgency_conversations: high_urgency_conversations.len() as i64,
        })
    }

    async fn flagged_conversations(
        &self,
        filter: &AnalysisFilter,
        page: PageRequest,
    ) -> Result<Vec<FlaggedConversation>, RepositoryError> {
        let state = self.state.read().await;
        Ok(page_of(state.flagged(filter), page))
    }

    async fn count_flagged_conversations(
        &self,
        filter: &AnalysisFilter,
    ) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.flagged(filter).len() as u64)
    }

    async fn flagged_messages(
        &self,
        filter: &AnalysisFilter,
        limit: usize,
    ) -> Result<Vec<FlaggedMessage>, RepositoryError> {
        let state = self.state.read().await;
        let mut rows: Vec<(AnalysisId, FlaggedMessage)> = state
            .analyses
            .values()
            .filter(|a| filter.matches(&a.classification))
            .filter_map(|a| {
                let message = state.messages.get(&a.message_id)?;
                Some((
                    a.id,
                    FlaggedMessage {
                        message_id: message.id,
                        conversation_id: message.conversation_id,
                        content: message.content.clone(),
                        created_at: message.created_at,
                        analysis: a.classification,
                        analyzed_at: a.analyzed_at,
                    },
                ))
            })
            .collect();
        rows.sort_by(|(a_id, a), (b_id, b)| {
            b.analysis
                .urgency
                .cmp(&a.analysis.urgency)
                .then(b.analyzed_at.cmp(&a.analyzed_at))
                .then(b_id.cmp(a_id))
        });
        Ok(rows.into_iter().take(limit).map(|(_, row)| row).collect())
    }

    async fn list_users(&self, page: PageRequest) -> Result<Vec<UserOverview>, RepositoryError> {
        let state = self.state.read().await;
        Ok(page_of(state.user_overviews(), page))
    }

    async fn user_conversations(
        &self,
        user_id: &AnonymousUserId,
    ) -> Result<Vec<FlaggedConversation>, RepositoryError> {
        let state = self.state.read().await;
        let mut rows: Vec<FlaggedConversation> = state
            .conversations
            .values()
            .filter(|c| c.is_owned_by(user_id))
            .map(|c| state.flagged_row(c))
            .collect();
        sort_by_activity(&mut rows);
        Ok(rows)
    }

    async fn user_distribution(
        &self,
        field: AnalysisField,
        user_id: &AnonymousUserId,
    ) -> Result<Vec<ValueCount>, RepositoryError> {
        let state = self.state.read().await;
        Ok(ValueCount::from_counts(count_values(
            field,
            state.analyses_of_user(user_id),
        )))
    }

    async fn user_urgency_stats(
        &self,
        user_id: &AnonymousUserId,
    ) -> Result<UrgencyStats, RepositoryError> {
        let state = self.state.read().await;
        let levels: Vec<i64> = state
            .analyses_of_user(user_id)
            .map(|a| i64::from(a.classification.urgency.level()))
            .collect();
        if levels.is_empty() {
            return Ok(UrgencyStats::default());
        }

        let high = i64::from(Urgency::HIGH.level());
        Ok(UrgencyStats {
            average: round_one_decimal(levels.iter().sum::<i64>() as f64 / levels.len() as f64),
            max: levels.iter().copied().max().unwrap_or_default(),
            high_urgency_count: levels.iter().filter(|&&level| level >= high).count() as i64,
        })
    }

    async fn unanalyzed_user_messages(
        &self,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let state = self.state.read().await;
        let analysed: HashSet<MessageId> = state.analyses.values().map(|a| a.message_id).collect();
        Ok(state
            .messages
            .values()
            .filter(|m| m.role == MessageRole::User && !analysed.contains(&m.id))
            .take(limit)
            .cloned()
            .collect())
    }
}
