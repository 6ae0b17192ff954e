use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::llm::{self, LanguageModel};
use crate::mailer::{newsletter_email, Mailer};
use crate::models::{
    DeliveryFrequency, Newsletter, NewsletterId, NewsletterStatus, Summary, SummaryId, User, UserId,
};
use crate::pipeline::{ContentFetcher, FetchReport};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SendReport {
    pub success: bool,
    pub sent_count: usize,
    pub failed_count: usize,
}

/// What happened when a user's content run was turned into a newsletter.
#[derive(Debug, Clone, Serialize)]
pub struct UserRun {
    pub fetch: FetchReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newsletter: Option<Newsletter>,
}

pub fn newsletter_title(frequency: DeliveryFrequency, date: DateTime<Utc>) -> String {
    format!("Your {} Update - {}", frequency.label(), date.format("%Y-%m-%d"))
}

pub fn combine_summaries(summaries: &[Summary]) -> String {
    summaries
        .iter()
        .map(|s| s.summary.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct NewsletterService {
    store: Arc<dyn Store>,
    llm: Arc<dyn LanguageModel>,
    mailer: Arc<dyn Mailer>,
    fetcher: Arc<ContentFetcher>,
    from: String,
    app_url: String,
}

impl NewsletterService {
    pub fn new(
        store: Arc<dyn Store>,
        llm: Arc<dyn LanguageModel>,
        mailer: Arc<dyn Mailer>,
        fetcher: Arc<ContentFetcher>,
        from: impl Into<String>,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            llm,
            mailer,
            fetcher,
            from: from.into(),
            app_url: app_url.into(),
        }
    }

    async fn compose(&self, title: String, topics: Vec<String>, summaries: &[Summary]) -> Result<Newsletter> {
        let combined = combine_summaries(summaries);
        let content = llm::generate_newsletter(self.llm.as_ref(), &combined, &topics).await?;
        let ids = summaries.iter().map(|s| s.id).collect();
        Ok(Newsletter::draft(title, content, topics, ids))
    }

    pub async fn create_draft(&self, title: &str, topics: Vec<String>, summary_ids: &[SummaryId]) -> Result<Newsletter> {
        if title.trim().is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }
        let summaries = self.store.summaries_by_ids(summary_ids).await?;
        if summaries.is_empty() {
            return Err(AppError::Validation("No valid summaries found".to_string()));
        }

        let newsletter = self.compose(title.trim().to_string(), topics, &summaries).await?;
        let newsletter = self.store.insert_newsletter(newsletter).await?;
        tracing::info!("Created draft newsletter {}", newsletter.id);
        Ok(newsletter)
    }

    pub async fn schedule(&self, id: NewsletterId, when: DateTime<Utc>) -> Result<Newsletter> {
        if when <= Utc::now() {
            return Err(AppError::Validation("Scheduled date must be in the future".to_string()));
        }
        let mut newsletter = self.store.get_newsletter(id).await?;
        newsletter.transition(NewsletterStatus::Scheduled)?;
        newsletter.scheduled_date = Some(when);
        let newsletter = self.store.update_newsletter(newsletter).await?;
        tracing::info!("Newsletter {} scheduled for {}", id, when);
        Ok(newsletter)
    }

    pub async fn send_to_user(&self, newsletter: &Newsletter, user: &User) -> bool {
        let email = newsletter_email(newsletter, user, &self.from, &self.app_url);
        match self.mailer.send(email).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error sending newsletter {} to user {}: {}", newsletter.id, user.id, e);
                false
            }
        }
    }

    /// Sends to every user sharing a topic with the newsletter and records the outcome.
    ///
    /// The newsletter is claimed before any mail goes out, so concurrent callers
    /// (an API send racing the dispatcher) deliver it at most once.
    pub async fn send(&self, id: NewsletterId) -> Result<SendReport> {
        let newsletter = self.store.get_newsletter(id).await?;
        match newsletter.status {
            NewsletterStatus::Sent => {
                return Err(AppError::InvalidState(format!("newsletter {} was already sent", id)));
            }
            NewsletterStatus::Sending => {
                return Err(AppError::InvalidState(format!("newsletter {} is already being delivered", id)));
            }
            _ => {}
        }

        let recipients: Vec<User> = self
            .store
            .list_users()
            .await?
            .into_iter()
            .filter(|u| u.shares_topic_with(&newsletter.topics))
            .collect();

        if recipients.is_empty() {
            tracing::warn!("No users found for newsletter: {}", id);
            return Ok(SendReport { success: false, sent_count: 0, failed_count: 0 });
        }

        let mut newsletter = self.store.claim_for_delivery(id).await?;

        let mut delivered = Vec::new();
        let mut failed_count = 0;
        for user in &recipients {
            if self.send_to_user(&newsletter, user).await {
                delivered.push(user.id);
            } else {
                failed_count += 1;
            }
        }

        let sent_count = delivered.len();
        self.finish_delivery(&mut newsletter, delivered).await?;
        tracing::info!("Newsletter {} sent to {} users ({} failed)", id, sent_count, failed_count);

        Ok(SendReport {
            success: sent_count > 0,
            sent_count,
            failed_count,
        })
    }

    async fn finish_delivery(&self, newsletter: &mut Newsletter, delivered: Vec<UserId>) -> Result<()> {
        if delivered.is_empty() {
            newsletter.transition(NewsletterStatus::Failed)?;
        } else {
            newsletter.transition(NewsletterStatus::Sent)?;
            newsletter.sent_at = Some(Utc::now());
            newsletter.sent_to = delivered;
        }
        self.store.update_newsletter(newsletter.clone()).await?;
        Ok(())
    }

    /// Sends every scheduled newsletter whose time has come.
    pub async fn dispatch_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.store.due_newsletters(now).await?;
        tracing::info!("Found {} newsletters to send", due.len());

        let mut sent = 0;
        for newsletter in due {
            match self.send(newsletter.id).await {
                Ok(report) if report.success => sent += 1,
                Ok(_) => {
                    tracing::warn!("Failed to send newsletter {}", newsletter.id);
                    self.mark_failed(newsletter.id).await;
                }
                Err(e) => {
                    tracing::error!("Error processing newsletter {}: {}", newsletter.id, e);
                    self.mark_failed(newsletter.id).await;
                }
            }
        }
        Ok(sent)
    }

    async fn mark_failed(&self, id: NewsletterId) {
        let result = async {
            let mut newsletter = self.store.get_newsletter(id).await?;
            if newsletter.status == NewsletterStatus::Scheduled {
                newsletter.transition(NewsletterStatus::Failed)?;
                self.store.update_newsletter(newsletter).await?;
            }
            Ok::<_, AppError>(())
        }
        .await;
        if let Err(e) = result {
            tracing::error!("Could not mark newsletter {} as failed: {}", id, e);
        }
    }

    /// Fetches new content for one user and mails them a newsletter built from it.
    pub async fn process_user(&self, user_id: UserId, frequency: DeliveryFrequency) -> Result<UserRun> {
        let user = self.store.get_user(user_id).await?;
        tracing::info!("Processing content for user {} ({})", user.id, user.email);

        let fetch = self.fetcher.fetch_for_user(user.id).await?;
        if !fetch.success || fetch.summaries.is_empty() {
            tracing::warn!("No new content found for user {}: {}", user.id, fetch.message);
            return Ok(UserRun { fetch, newsletter: None });
        }

        let title = newsletter_title(frequency, Utc::now());
        let mut newsletter = self
            .compose(title, user.preferences.topics.clone(), &fetch.summaries)
            .await?;
        // Stored already claimed: the dispatcher only picks up Scheduled newsletters.
        newsletter.transition(NewsletterStatus::Sending)?;
        newsletter.scheduled_date = Some(Utc::now());
        let mut newsletter = self.store.insert_newsletter(newsletter).await?;
        tracing::info!("Created newsletter {} for user {}", newsletter.id, user.id);

        let delivered = if self.send_to_user(&newsletter, &user).await {
            tracing::info!("Successfully sent newsletter to user {}", user.id);
            vec![user.id]
        } else {
            tracing::error!("Failed to send newsletter to user {}", user.id);
            Vec::new()
        };
        self.finish_delivery(&mut newsletter, delivered).await?;

        Ok(UserRun { fetch, newsletter: Some(newsletter) })
    }

    /// Runs every user on `frequency`; one user's failure does not stop the rest.
    pub async fn process_frequency_group(&self, frequency: DeliveryFrequency) -> Result<usize> {
        tracing::info!("Processing {} content updates and newsletters...", frequency);
        let users = self.store.users_by_frequency(frequency).await?;
        tracing::info!("Found {} users with {} frequency", users.len(), frequency);

        let mut delivered = 0;
        for user in users {
            match self.process_user(user.id, frequency).await {
                Ok(run) => {
                    if run.newsletter.is_some_and(|n| n.status == NewsletterStatus::Sent) {
                        delivered += 1;
                    }
                }
                Err(e) => tracing::error!("Error processing user {}: {}", user.id, e),
            }
        }

        tracing::info!("Completed {} content updates and newsletters", frequency);
        Ok(delivered)
    }

    pub async fn trigger_for_user(&self, user_id: UserId) -> Result<UserRun> {
        let user = self.store.get_user(user_id).await?;
        if !user.has_topics() {
            return Err(AppError::Validation(
                "Please configure your topics of interest first".to_string(),
            ));
        }
        self.process_user(user.id, user.preferences.delivery_frequency).await
    }
}
