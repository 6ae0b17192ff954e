use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{Preferences, SummaryId, UserId};

#[derive(Deserialize)]
pub struct UserRequest {
    pub user_id: UserId,
}

#[derive(Deserialize)]
pub struct SummarizeRequest {
    pub user_id: UserId,
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub preferences: Option<Preferences>,
}

impl CreateUserRequest {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("A valid email is required".to_string()));
        }
        Ok(())
    }
}

/// Trims topics and drops blanks and case-insensitive duplicates.
pub fn clean_preferences(mut preferences: Preferences) -> Result<Preferences> {
    let mut topics: Vec<String> = Vec::new();
    for topic in preferences.topics.iter().map(|t| t.trim()) {
        if !topic.is_empty() && !topics.iter().any(|t| t.eq_ignore_ascii_case(topic)) {
            topics.push(topic.to_string());
        }
    }
    preferences.topics = topics;

    if preferences.max_items_per_newsletter == 0 {
        return Err(AppError::Validation(
            "max_items_per_newsletter must be at least 1".to_string(),
        ));
    }
    Ok(preferences)
}

#[derive(Deserialize)]
pub struct CreateNewsletterRequest {
    pub title: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub summary_ids: Vec<SummaryId>,
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_date: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct RateRequest {
    pub helpful: bool,
}
