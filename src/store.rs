use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{
    DeliveryFrequency, Newsletter, NewsletterId, NewsletterStatus, Summary, SummaryId, User, UserId,
};
use crate::pipeline::dedup::normalize_url;

/// Persistence for users, summaries and newsletters.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: User) -> Result<User>;
    async fn get_user(&self, id: UserId) -> Result<User>;
    async fn update_user(&self, user: User) -> Result<User>;
    async fn list_users(&self) -> Result<Vec<User>>;
    /// Users with the given frequency and at least one topic.
    async fn users_by_frequency(&self, frequency: DeliveryFrequency) -> Result<Vec<User>>;

    /// Rejects a second summary for the same URL and user.
    async fn insert_summary(&self, summary: Summary) -> Result<Summary>;
    async fn get_summary(&self, id: SummaryId) -> Result<Summary>;
    async fn summaries_by_ids(&self, ids: &[SummaryId]) -> Result<Vec<Summary>>;
    /// Summaries the user owns or has saved.
    async fn summaries_for_user(&self, user_id: UserId) -> Result<Vec<Summary>>;
    /// Any stored summary of the URL, regardless of owner.
    async fn find_summary_by_url(&self, url: &str) -> Result<Option<Summary>>;
    /// Adds a summary to the user's saved list; returns false if it was already there.
    async fn link_saved_summary(&self, user_id: UserId, summary_id: SummaryId) -> Result<bool>;
    /// Returns false if the summary was not saved.
    async fn unlink_saved_summary(&self, user_id: UserId, summary_id: SummaryId) -> Result<bool>;
    /// Removes the summary and every saved reference to it.
    async fn delete_summary(&self, id: SummaryId) -> Result<()>;
    async fn rate_summary(&self, id: SummaryId, helpful: bool) -> Result<Summary>;

    async fn insert_newsletter(&self, newsletter: Newsletter) -> Result<Newsletter>;
    async fn get_newsletter(&self, id: NewsletterId) -> Result<Newsletter>;
    async fn update_newsletter(&self, newsletter: Newsletter) -> Result<Newsletter>;
    /// Atomically moves a newsletter into `Sending`; only one caller can win.
    async fn claim_for_delivery(&self, id: NewsletterId) -> Result<Newsletter>;
    async fn delete_newsletter(&self, id: NewsletterId) -> Result<()>;
    /// Newest first.
    async fn list_newsletters(&self) -> Result<Vec<Newsletter>>;
    async fn due_newsletters(&self, now: DateTime<Utc>) -> Result<Vec<Newsletter>>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    summaries: HashMap<SummaryId, Summary>,
    newsletters: HashMap<NewsletterId, Newsletter>,
}

/// In-process store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AppError::Validation(format!("User {} already exists", user.email)));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<User> {
        let tables = self.tables.read().await;
        tables.users.get(&id).cloned().ok_or_else(|| AppError::NotFound("User".into()))
    }

    async fn update_user(&self, user: User) -> Result<User> {
        let mut tables = self.tables.write().await;
        match tables.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(user)
            }
            None => Err(AppError::NotFound("User".into())),
        }
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    async fn users_by_frequency(&self, frequency: DeliveryFrequency) -> Result<Vec<User>> {
        Ok(self
            .list_users()
            .await?
            .into_iter()
            .filter(|u| u.preferences.delivery_frequency == frequency && u.has_topics())
            .collect())
    }

    async fn insert_summary(&self, summary: Summary) -> Result<Summary> {
        let mut tables = self.tables.write().await;
        let key = normalize_url(&summary.source_url);
        let duplicate = tables
            .summaries
            .values()
            .any(|s| s.user_id == summary.user_id && normalize_url(&s.source_url) == key);
        if duplicate {
            return Err(AppError::Validation(format!(
                "Summary for {} already exists for this user",
                summary.source_url
            )));
        }
        tables.summaries.insert(summary.id, summary.clone());
        Ok(summary)
    }

    async fn get_summary(&self, id: SummaryId) -> Result<Summary> {
        let tables = self.tables.read().await;
        tables.summaries.get(&id).cloned().ok_or_else(|| AppError::NotFound("Summary".into()))
    }

    async fn summaries_by_ids(&self, ids: &[SummaryId]) -> Result<Vec<Summary>> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.summaries.get(id).cloned()).collect())
    }

    async fn summaries_for_user(&self, user_id: UserId) -> Result<Vec<Summary>> {
        let tables = self.tables.read().await;
        let saved = tables
            .users
            .get(&user_id)
            .map(|u| u.saved_summaries.clone())
            .unwrap_or_default();
        let mut summaries: Vec<Summary> = tables
            .summaries
            .values()
            .filter(|s| s.user_id == user_id || saved.contains(&s.id))
            .cloned()
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn find_summary_by_url(&self, url: &str) -> Result<Option<Summary>> {
        let tables = self.tables.read().await;
        let key = normalize_url(url);
        Ok(tables
            .summaries
            .values()
            .filter(|s| normalize_url(&s.source_url) == key)
            .min_by_key(|s| s.created_at)
            .cloned())
    }

    async fn link_saved_summary(&self, user_id: UserId, summary_id: SummaryId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if !tables.summaries.contains_key(&summary_id) {
            return Err(AppError::NotFound("Summary".into()));
        }
        let user = tables.users.get_mut(&user_id).ok_or_else(|| AppError::NotFound("User".into()))?;
        if user.saved_summaries.contains(&summary_id) {
            return Ok(false);
        }
        user.saved_summaries.push(summary_id);
        Ok(true)
    }

    async fn unlink_saved_summary(&self, user_id: UserId, summary_id: SummaryId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&user_id).ok_or_else(|| AppError::NotFound("User".into()))?;
        let before = user.saved_summaries.len();
        user.saved_summaries.retain(|id| *id != summary_id);
        Ok(user.saved_summaries.len() != before)
    }

    async fn delete_summary(&self, id: SummaryId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.summaries.remove(&id).is_none() {
            return Err(AppError::NotFound("Summary".into()));
        }
        for user in tables.users.values_mut() {
            user.saved_summaries.retain(|saved| *saved != id);
        }
        Ok(())
    }

    async fn rate_summary(&self, id: SummaryId, helpful: bool) -> Result<Summary> {
        let mut tables = self.tables.write().await;
        let summary = tables.summaries.get_mut(&id).ok_or_else(|| AppError::NotFound("Summary".into()))?;
        if helpful {
            summary.ratings.helpful += 1;
        } else {
            summary.ratings.not_helpful += 1;
        }
        Ok(summary.clone())
    }

    async fn insert_newsletter(&self, newsletter: Newsletter) -> Result<Newsletter> {
        let mut tables = self.tables.write().await;
        tables.newsletters.insert(newsletter.id, newsletter.clone());
        Ok(newsletter)
    }

    async fn get_newsletter(&self, id: NewsletterId) -> Result<Newsletter> {
        let tables = self.tables.read().await;
        tables.newsletters.get(&id).cloned().ok_or_else(|| AppError::NotFound("Newsletter".into()))
    }

    async fn update_newsletter(&self, newsletter: Newsletter) -> Result<Newsletter> {
        let mut tables = self.tables.write().await;
        match tables.newsletters.get_mut(&newsletter.id) {
            Some(existing) => {
                *existing = newsletter.clone();
                Ok(newsletter)
            }
            None => Err(AppError::NotFound("Newsletter".into())),
        }
    }

    async fn claim_for_delivery(&self, id: NewsletterId) -> Result<Newsletter> {
        let mut tables = self.tables.write().await;
        let newsletter = tables
            .newsletters
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Newsletter".into()))?;
        newsletter.transition(NewsletterStatus::Sending)?;
        Ok(newsletter.clone())
    }

    async fn delete_newsletter(&self, id: NewsletterId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .newsletters
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound("Newsletter".into()))
    }

    async fn list_newsletters(&self) -> Result<Vec<Newsletter>> {
        let tables = self.tables.read().await;
        let mut newsletters: Vec<Newsletter> = tables.newsletters.values().cloned().collect();
        newsletters.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(newsletters)
    }

    async fn due_newsletters(&self, now: DateTime<Utc>) -> Result<Vec<Newsletter>> {
        let tables = self.tables.read().await;
        let mut due: Vec<Newsletter> = tables
            .newsletters
            .values()
            .filter(|n| n.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|n| n.scheduled_date);
        Ok(due)
    }
}
