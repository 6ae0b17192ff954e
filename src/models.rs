use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

pub type UserId = Uuid;
pub type SummaryId = Uuid;
pub type NewsletterId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryFrequency {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl DeliveryFrequency {
    pub const ALL: [DeliveryFrequency; 3] = [Self::Daily, Self::Weekly, Self::Monthly];

    /// How far back discovery looks for fresh content.
    pub fn window(&self) -> chrono::Duration {
        match self {
            Self::Daily => chrono::Duration::days(1),
            Self::Weekly => chrono::Duration::days(7),
            Self::Monthly => chrono::Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
        }
    }
}

impl fmt::Display for DeliveryFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryFrequency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(AppError::Validation(format!("Unknown delivery frequency: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl SummaryLength {
    pub fn max_tokens(&self) -> u32 {
        match self {
            Self::Short => 150,
            Self::Medium => 300,
            Self::Long => 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Article,
    Youtube,
    Podcast,
    Document,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Youtube => "youtube",
            Self::Podcast => "podcast",
            Self::Document => "document",
        }
    }
}

impl FromStr for SourceType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "article" => Ok(Self::Article),
            "youtube" => Ok(Self::Youtube),
            "podcast" => Ok(Self::Podcast),
            "document" => Ok(Self::Document),
            other => Err(AppError::Validation(format!("Unknown source type: {}", other))),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub delivery_frequency: DeliveryFrequency,
    #[serde(default)]
    pub summary_length: SummaryLength,
    #[serde(default = "default_max_items")]
    pub max_items_per_newsletter: usize,
}

fn default_max_items() -> usize {
    5
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            delivery_frequency: DeliveryFrequency::default(),
            summary_length: SummaryLength::default(),
            max_items_per_newsletter: default_max_items(),
        }
    }
}

impl Preferences {
    /// Item budget for each topic, rounded up so the newsletter is never short.
    pub fn items_per_topic(&self) -> usize {
        if self.topics.is_empty() {
            return 0;
        }
        self.max_items_per_newsletter.max(1).div_ceil(self.topics.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub saved_summaries: Vec<SummaryId>,
    pub preferences: Preferences,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, preferences: Preferences) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            saved_summaries: Vec::new(),
            preferences,
            created_at: Utc::now(),
        }
    }

    pub fn has_topics(&self) -> bool {
        !self.preferences.topics.is_empty()
    }

    pub fn shares_topic_with(&self, topics: &[String]) -> bool {
        self.preferences
            .topics
            .iter()
            .any(|t| topics.iter().any(|o| o.eq_ignore_ascii_case(t)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratings {
    pub helpful: u32,
    pub not_helpful: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: SummaryId,
    pub user_id: UserId,
    pub title: String,
    pub original_content: String,
    pub summary: String,
    pub source_url: String,
    pub source_type: SourceType,
    pub topics: Vec<String>,
    pub ratings: Ratings,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewsletterStatus {
    Draft,
    Scheduled,
    /// Claimed by one sender; mail is going out.
    Sending,
    Sent,
    Failed,
}

impl NewsletterStatus {
    pub fn can_transition_to(&self, next: NewsletterStatus) -> bool {
        use NewsletterStatus::*;
        matches!(
            (self, next),
            (Draft, Scheduled)
                | (Draft, Sending)
                | (Scheduled, Scheduled)
                | (Scheduled, Sending)
                | (Scheduled, Failed)
                | (Failed, Scheduled)
                | (Failed, Sending)
                | (Sending, Sent)
                | (Sending, Failed)
        )
    }
}

impl fmt::Display for NewsletterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Newsletter {
    pub id: NewsletterId,
    pub title: String,
    pub content: String,
    pub topics: Vec<String>,
    pub summaries: Vec<SummaryId>,
    pub sent_to: Vec<UserId>,
    pub sent_at: Option<DateTime<Utc>>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub status: NewsletterStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Newsletter {
    pub fn draft(title: String, content: String, topics: Vec<String>, summaries: Vec<SummaryId>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            content,
            topics,
            summaries,
            sent_to: Vec::new(),
            sent_at: None,
            scheduled_date: None,
            status: NewsletterStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: NewsletterStatus) -> crate::error::Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidState(format!(
                "newsletter {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == NewsletterStatus::Scheduled
            && self.scheduled_date.is_some_and(|d| d <= now)
    }
}

/// A candidate item discovered by a search source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub published_at: DateTime<Utc>,
    pub source_type: SourceType,
}
