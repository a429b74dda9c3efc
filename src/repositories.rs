use crate::{
    config::TableNames,
    domain::ProblemRepository,
    errors::RepoError,
    models::{OutputFormat, PaymentRecord, PersonalityMode, QaRecord, SubscriptionStatus, UserProfile},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    operation::update_item::{UpdateItemError, UpdateItemOutput},
    types::AttributeValue,
    Client as DynamoDbClient,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{self, info};

type Item = HashMap<String, AttributeValue>;

#[derive(Debug, Clone)]
pub struct DynamoDbProblemRepository {
    client: DynamoDbClient,
    tables: TableNames,
}

impl DynamoDbProblemRepository {
    pub fn new(client: DynamoDbClient, tables: TableNames) -> Self {
        info!(users = %tables.users, questions = %tables.questions, payments = %tables.payments, "Initializing DynamoDbProblemRepository");
        Self { client, tables }
    }
}

#[async_trait]
impl ProblemRepository for DynamoDbProblemRepository {
    async fn create_profile(&self, profile: &UserProfile) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.tables.users)
            .set_item(Some(profile_to_item(profile)))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put profile (id: {})", self.tables.users, profile.id))
            .map_err(RepoError::BackendError)?;
        tracing::debug!(user_id = %profile.id, "DynamoDB: profile created");
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, RepoError> {
        let resp = self.client
            .get_item()
            .table_name(&self.tables.users)
            .key("id", AttributeValue::S(user_id.to_string()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get profile (id: {})", self.tables.users, user_id))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => match item_to_profile(&item) {
                Some(profile) => Ok(Some(profile)),
                None => {
                    tracing::error!(%user_id, table_name = %self.tables.users, "DynamoDB: Retrieved item but failed to parse into UserProfile");
                    Err(RepoError::DataCorruption(format!(
                        "profile {} in table '{}' could not be parsed",
                        user_id, self.tables.users
                    )))
                }
            },
            None => Ok(None),
        }
    }

    async fn save_qa(&self, record: &QaRecord) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.tables.questions)
            .item("user_id", AttributeValue::S(record.user_id.clone()))
            .item("timestamp", AttributeValue::S(timestamp_key(record.timestamp)))
            .item("question", AttributeValue::S(record.question.clone()))
            .item("answer", AttributeValue::S(record.answer.clone()))
            .item("format", AttributeValue::S(record.format.as_str().to_string()))
            .item("personality", AttributeValue::S(record.personality.as_str().to_string()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to save question for user {}", self.tables.questions, record.user_id))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    async fn list_recent_qa(&self, user_id: &str, limit: usize) -> Result<Vec<QaRecord>, RepoError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let resp = self.client
            .query()
            .table_name(&self.tables.questions)
            .key_condition_expression("user_id = :uid")
            .expression_attribute_values(":uid", AttributeValue::S(user_id.to_string()))
            // Newest first on the timestamp range key
            .scan_index_forward(false)
            .limit(i32::try_from(limit).unwrap_or(i32::MAX))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to query questions for user {}", self.tables.questions, user_id))
            .map_err(RepoError::BackendError)?;

        let mut records = Vec::new();
        for item in resp.items.unwrap_or_default() {
            match item_to_qa(&item) {
                Some(record) => records.push(record),
                None => {
                    tracing::error!(%user_id, table_name = %self.tables.questions, "DynamoDB: Failed to parse question item");
                    return Err(RepoError::DataCorruption(format!(
                        "question item for user {} in table '{}' could not be parsed",
                        user_id, self.tables.questions
                    )));
                }
            }
        }
        tracing::debug!(%user_id, count = records.len(), "DynamoDB: listed recent questions");
        Ok(records)
    }

    async fn update_login(&self, user_id: &str, at: DateTime<Utc>, streak: u32) -> Result<(), RepoError> {
        let result = self.client
            .update_item()
            .table_name(&self.tables.users)
            .key("id", AttributeValue::S(user_id.to_string()))
            .condition_expression("attribute_exists(id)")
            .update_expression("SET last_login = :ll, streak_count = :sc")
            .expression_attribute_values(":ll", AttributeValue::S(timestamp_key(at)))
            .expression_attribute_values(":sc", AttributeValue::N(streak.to_string()))
            .send()
            .await;
        map_update_result(result, user_id, &self.tables.users, "update streak")
    }

    async fn activate_subscription(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let result = self.client
            .update_item()
            .table_name(&self.tables.users)
            .key("id", AttributeValue::S(user_id.to_string()))
            .condition_expression("attribute_exists(id)")
            .update_expression("SET subscription_status = :st, subscription_start = :ss, subscription_end = :se")
            .expression_attribute_values(":st", AttributeValue::S(SubscriptionStatus::Active.as_str().to_string()))
            .expression_attribute_values(":ss", AttributeValue::S(timestamp_key(start)))
            .expression_attribute_values(":se", AttributeValue::S(timestamp_key(end)))
            .send()
            .await;
        map_update_result(result, user_id, &self.tables.users, "activate subscription")
    }

    async fn save_payment(&self, payment: &PaymentRecord) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.tables.payments)
            .item("payment_id", AttributeValue::S(payment.payment_id.clone()))
            .item("user_id", AttributeValue::S(payment.user_id.clone()))
            .item("amount", AttributeValue::N(payment.amount.to_string()))
            .item("status", AttributeValue::S(payment.status.clone()))
            .item("created_at", AttributeValue::S(timestamp_key(payment.created_at)))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to save payment {}", self.tables.payments, payment.payment_id))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }
}

// A failed `attribute_exists(id)` condition means the user row is missing.
fn map_update_result(
    result: Result<UpdateItemOutput, SdkError<UpdateItemError>>,
    user_id: &str,
    table: &str,
    action: &str,
) -> Result<(), RepoError> {
    match result {
        Ok(_) => Ok(()),
        Err(SdkError::ServiceError(service_err)) if service_err.err().is_conditional_check_failed_exception() => {
            Err(RepoError::NotFound(user_id.to_string()))
        }
        Err(e) => Err(RepoError::BackendError(
            anyhow::Error::new(e).context(format!("DynamoDB (table: {}): Failed to {} for user {}", table, action, user_id)),
        )),
    }
}

/// Fixed-width RFC 3339 so range keys sort chronologically.
fn timestamp_key(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn get_s<'a>(item: &'a Item, key: &str) -> Option<&'a str> {
    item.get(key)?.as_s().ok().map(String::as_str)
}

fn get_time(item: &Item, key: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(get_s(item, key)?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn profile_to_item(profile: &UserProfile) -> Item {
    let mut item = Item::new();
    item.insert("id".into(), AttributeValue::S(profile.id.clone()));
    item.insert("email".into(), AttributeValue::S(profile.email.clone()));
    item.insert(
        "subscription_status".into(),
        AttributeValue::S(profile.subscription_status.as_str().to_string()),
    );
    item.insert("trial_start".into(), AttributeValue::S(timestamp_key(profile.trial_start)));
    item.insert("trial_end".into(), AttributeValue::S(timestamp_key(profile.trial_end)));
    if let Some(start) = profile.subscription_start {
        item.insert("subscription_start".into(), AttributeValue::S(timestamp_key(start)));
    }
    if let Some(end) = profile.subscription_end {
        item.insert("subscription_end".into(), AttributeValue::S(timestamp_key(end)));
    }
    item.insert("streak_count".into(), AttributeValue::N(profile.streak_count.to_string()));
    item.insert("last_login".into(), AttributeValue::S(timestamp_key(profile.last_login)));
    item
}

fn item_to_profile(item: &Item) -> Option<UserProfile> {
    let streak_count = match item.get("streak_count") {
        Some(v) => v.as_n().ok()?.parse().ok()?,
        None => 0,
    };
    Some(UserProfile {
        id: get_s(item, "id")?.to_string(),
        email: get_s(item, "email")?.to_string(),
        subscription_status: SubscriptionStatus::parse(get_s(item, "subscription_status")?)?,
        trial_start: get_time(item, "trial_start")?,
        trial_end: get_time(item, "trial_end")?,
        subscription_start: get_time(item, "subscription_start"),
        subscription_end: get_time(item, "subscription_end"),
        streak_count,
        last_login: get_time(item, "last_login")?,
    })
}

fn item_to_qa(item: &Item) -> Option<QaRecord> {
    Some(QaRecord {
        user_id: get_s(item, "user_id")?.to_string(),
        question: get_s(item, "question")?.to_string(),
        answer: get_s(item, "answer")?.to_string(),
        format: OutputFormat::parse_lenient(get_s(item, "format")),
        personality: PersonalityMode::parse_lenient(get_s(item, "personality")),
        timestamp: get_time(item, "timestamp")?,
    })
}

/// Process-local repository for `PERSISTENCE_BACKEND=memory` and tests.
#[derive(Debug, Default)]
pub struct InMemoryProblemRepository {
    profiles: Mutex<HashMap<String, UserProfile>>,
    questions: Mutex<Vec<QaRecord>>,
    payments: Mutex<Vec<PaymentRecord>>,
}

impl InMemoryProblemRepository {
    pub fn payments(&self) -> Vec<PaymentRecord> {
        lock(&self.payments).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A panic while holding the lock leaves plain data behind; keep serving it.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ProblemRepository for InMemoryProblemRepository {
    async fn create_profile(&self, profile: &UserProfile) -> Result<(), RepoError> {
        lock(&self.profiles).insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, RepoError> {
        Ok(lock(&self.profiles).get(user_id).cloned())
    }

    async fn save_qa(&self, record: &QaRecord) -> Result<(), RepoError> {
        lock(&self.questions).push(record.clone());
        Ok(())
    }

    async fn list_recent_qa(&self, user_id: &str, limit: usize) -> Result<Vec<QaRecord>, RepoError> {
        let mut records: Vec<QaRecord> = lock(&self.questions)
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order among equal timestamps; reverse for newest first.
        records.sort_by_key(|r| r.timestamp);
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }

    async fn update_login(&self, user_id: &str, at: DateTime<Utc>, streak: u32) -> Result<(), RepoError> {
        let mut profiles = lock(&self.profiles);
        let profile = profiles
            .get_mut(user_id)
            .ok_or_else(|| RepoError::NotFound(user_id.to_string()))?;
        profile.last_login = at;
        profile.streak_count = streak;
        Ok(())
    }

    async fn activate_subscription(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let mut profiles = lock(&self.profiles);
        let profile = profiles
            .get_mut(user_id)
            .ok_or_else(|| RepoError::NotFound(user_id.to_string()))?;
        profile.subscription_status = SubscriptionStatus::Active;
        profile.subscription_start = Some(start);
        profile.subscription_end = Some(end);
        Ok(())
    }

    async fn save_payment(&self, payment: &PaymentRecord) -> Result<(), RepoError> {
        lock(&self.payments).push(payment.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::new_profile;
    use chrono::{Duration, TimeZone};

    fn qa(user: &str, question: &str, at: DateTime<Utc>) -> QaRecord {
        QaRecord {
            user_id: user.into(),
            question: question.into(),
            answer: "answer".into(),
            format: OutputFormat::Plain,
            personality: PersonalityMode::Funny,
            timestamp: at,
        }
    }

    #[tokio::test]
    async fn recent_questions_are_newest_first_and_limited() {
        let repo = InMemoryProblemRepository::default();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..7 {
            repo.save_qa(&qa("u1", &format!("q{i}"), t0 + Duration::minutes(i))).await.unwrap();
        }
        repo.save_qa(&qa("u2", "other", t0 + Duration::hours(1))).await.unwrap();

        let recent = repo.list_recent_qa("u1", 5).await.unwrap();
        let questions: Vec<_> = recent.iter().map(|r| r.question.as_str()).collect();
        assert_eq!(questions, ["q6", "q5", "q4", "q3", "q2"]);
    }

    #[tokio::test]
    async fn updates_on_missing_profile_are_not_found() {
        let repo = InMemoryProblemRepository::default();
        let now = Utc::now();
        assert!(matches!(repo.update_login("nope", now, 1).await, Err(RepoError::NotFound(_))));
        assert!(matches!(
            repo.activate_subscription("nope", now, now).await,
            Err(RepoError::NotFound(_))
        ));
    }

    #[test]
    fn profile_item_round_trips_through_attribute_map() {
        let now = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        let mut profile = new_profile("u1", "user@example.com", now);
        profile.streak_count = 9;
        let parsed = item_to_profile(&profile_to_item(&profile)).unwrap();
        assert_eq!(parsed, profile);
    }

    #[test]
    fn malformed_question_item_is_rejected() {
        let mut item = Item::new();
        item.insert("user_id".into(), AttributeValue::S("u1".into()));
        item.insert("timestamp".into(), AttributeValue::S("not a time".into()));
        assert!(item_to_qa(&item).is_none());
    }

    #[test]
    fn timestamp_keys_sort_chronologically() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let b = a + Duration::milliseconds(1500);
        assert!(timestamp_key(a) < timestamp_key(b));
        assert_eq!(timestamp_key(a), "2024-01-01T09:00:00.000Z");
    }
}
