use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::extract::{ApiJson, ApiPath};
use crate::api::models::{
    clean_preferences, CreateNewsletterRequest, CreateUserRequest, RateRequest, ScheduleRequest, SummarizeRequest,
    UserRequest,
};
use crate::api::response;
use crate::error::{AppError, Result};
use crate::models::{NewsletterId, Preferences, SourceType, SummaryId, User, UserId};
use crate::{youtube, AppState};

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/content/fetch", post(fetch_content))
        .route("/api/content/newsletter", post(trigger_newsletter))
        .route("/api/users", post(create_user))
        .route("/api/users/:id", get(get_user))
        .route("/api/users/:id/preferences", put(update_preferences))
        .route("/api/users/:id/summaries", get(saved_summaries))
        .route(
            "/api/users/:id/summaries/:summary_id",
            post(save_summary).delete(unsave_summary),
        )
        .route("/api/newsletters", get(list_newsletters).post(create_newsletter))
        .route("/api/newsletters/:id", get(get_newsletter).delete(delete_newsletter))
        .route("/api/newsletters/:id/schedule", post(schedule_newsletter))
        .route("/api/newsletters/:id/send", post(send_newsletter))
        .route(
            "/api/summaries/:id",
            get(get_summary).delete(delete_summary).post(create_summary),
        )
        .route("/api/summaries/:id/rate", post(rate_summary))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn require_topics(state: &AppState, user_id: UserId) -> Result<User> {
    let user = state.store.get_user(user_id).await?;
    if !user.has_topics() {
        return Err(AppError::Validation("No topics found for user".to_string()));
    }
    Ok(user)
}

async fn fetch_content(State(state): State<AppState>, ApiJson(req): ApiJson<UserRequest>) -> Result<impl IntoResponse> {
    let user = require_topics(&state, req.user_id).await?;
    tracing::info!("Fetching content for user {}", user.id);

    let report = state.fetcher.fetch_for_user(user.id).await?;
    let message = report.message.clone();
    if report.success {
        Ok(response::success(message, report))
    } else {
        Ok(response::unsuccessful(message, report))
    }
}

async fn trigger_newsletter(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<UserRequest>,
) -> Result<impl IntoResponse> {
    let user = require_topics(&state, req.user_id).await?;
    tracing::info!("Triggering newsletter for user {}", user.id);

    let run = state.newsletters.trigger_for_user(user.id).await?;
    let generated = run
        .newsletter
        .as_ref()
        .map(|n| format!("Newsletter {} generated ({})", n.id, n.status));
    Ok(match generated {
        Some(message) => response::success(message, run),
        None => response::unsuccessful("No new content found for newsletter", run),
    })
}

async fn create_user(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse> {
    req.validate()?;
    let preferences = clean_preferences(req.preferences.unwrap_or_default())?;
    let user = state
        .store
        .insert_user(User::new(req.name.trim(), req.email.trim(), preferences))
        .await?;

    tracing::info!("Created user {}", user.id);
    Ok(response::created("User created", user))
}

async fn get_user(State(state): State<AppState>, ApiPath(id): ApiPath<UserId>) -> Result<impl IntoResponse> {
    let user = state.store.get_user(id).await?;
    Ok(response::success("User found", user))
}

async fn saved_summaries(State(state): State<AppState>, ApiPath(id): ApiPath<UserId>) -> Result<impl IntoResponse> {
    state.store.get_user(id).await?;
    let summaries = state.store.summaries_for_user(id).await?;
    Ok(response::success(format!("{} summaries", summaries.len()), summaries))
}

async fn save_summary(
    State(state): State<AppState>,
    ApiPath((id, summary_id)): ApiPath<(UserId, SummaryId)>,
) -> Result<impl IntoResponse> {
    let added = state.store.link_saved_summary(id, summary_id).await?;
    Ok(response::message(if added { "Summary saved" } else { "Summary already saved" }))
}

async fn unsave_summary(
    State(state): State<AppState>,
    ApiPath((id, summary_id)): ApiPath<(UserId, SummaryId)>,
) -> Result<impl IntoResponse> {
    if !state.store.unlink_saved_summary(id, summary_id).await? {
        return Err(AppError::NotFound("Saved summary".to_string()));
    }
    Ok(response::message("Summary removed from saved"))
}

async fn update_preferences(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(preferences): ApiJson<Preferences>,
) -> Result<impl IntoResponse> {
    let mut user = state.store.get_user(id).await?;
    user.preferences = clean_preferences(preferences)?;
    let user = state.store.update_user(user).await?;
    Ok(response::success("Preferences updated", user))
}

async fn list_newsletters(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let newsletters = state.store.list_newsletters().await?;
    Ok(response::success(format!("{} newsletters", newsletters.len()), newsletters))
}

async fn get_newsletter(State(state): State<AppState>, ApiPath(id): ApiPath<NewsletterId>) -> Result<impl IntoResponse> {
    let newsletter = state.store.get_newsletter(id).await?;
    Ok(response::success("Newsletter found", newsletter))
}

async fn create_newsletter(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateNewsletterRequest>,
) -> Result<impl IntoResponse> {
    let newsletter = state
        .newsletters
        .create_draft(&req.title, req.topics, &req.summary_ids)
        .await?;
    Ok(response::created("Newsletter created", newsletter))
}

async fn schedule_newsletter(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<NewsletterId>,
    ApiJson(req): ApiJson<ScheduleRequest>,
) -> Result<impl IntoResponse> {
    let newsletter = state.newsletters.schedule(id, req.scheduled_date).await?;
    Ok(response::success("Newsletter scheduled", newsletter))
}

async fn send_newsletter(State(state): State<AppState>, ApiPath(id): ApiPath<NewsletterId>) -> Result<impl IntoResponse> {
    let report = state.newsletters.send(id).await?;
    Ok(if report.success {
        response::success(format!("Newsletter sent to {} users", report.sent_count), report)
    } else if report.failed_count == 0 {
        response::unsuccessful("No users found for this newsletter", report)
    } else {
        response::unsuccessful("Newsletter could not be delivered", report)
    })
}

async fn delete_newsletter(State(state): State<AppState>, ApiPath(id): ApiPath<NewsletterId>) -> Result<impl IntoResponse> {
    state.store.delete_newsletter(id).await?;
    Ok(response::message("Newsletter deleted"))
}

async fn get_summary(State(state): State<AppState>, ApiPath(id): ApiPath<SummaryId>) -> Result<impl IntoResponse> {
    let summary = state.store.get_summary(id).await?;
    Ok(response::success("Summary found", summary))
}

/// `POST /api/summaries/{article|youtube|podcast|document}` with a URL to summarize.
async fn create_summary(
    State(state): State<AppState>,
    ApiPath(kind): ApiPath<String>,
    ApiJson(req): ApiJson<SummarizeRequest>,
) -> Result<impl IntoResponse> {
    let source_type: SourceType = kind.parse()?;
    let mut title = req.title;
    if title.is_none() && source_type == SourceType::Youtube {
        title = match youtube::video_info(&req.url).await {
            Ok(info) => Some(info.title),
            Err(e) => {
                tracing::warn!("Could not look up video title for {}: {}", req.url, e);
                None
            }
        };
    }
    let summary = state
        .fetcher
        .summarize_url(req.user_id, &req.url, source_type, title)
        .await?;
    Ok(response::created("Summary created", summary))
}

async fn delete_summary(State(state): State<AppState>, ApiPath(id): ApiPath<SummaryId>) -> Result<impl IntoResponse> {
    state.store.delete_summary(id).await?;
    Ok(response::message("Summary deleted"))
}

async fn rate_summary(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<SummaryId>,
    ApiJson(req): ApiJson<RateRequest>,
) -> Result<impl IntoResponse> {
    let summary = state.store.rate_summary(id, req.helpful).await?;
    Ok(response::success("Rating recorded", summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::testing::ScriptedModel;
    use crate::mailer::testing::RecordingMailer;
    use crate::models::{DeliveryFrequency, Ratings, SourceType, Summary};
    use crate::newsletter::NewsletterService;
    use crate::pipeline::testing::{item, FakeExtractor, FakeSource, LONG_TEXT};
    use crate::pipeline::ContentFetcher;
    use crate::search::SearchSource;
    use crate::store::{MemoryStore, Store};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app() -> (Router, MemoryStore) {
        let config = Config::from_lookup(|key| match key {
            "OPENAI_API_KEY" => Some("test-key".to_string()),
            _ => None,
        })
        .unwrap();

        let store = MemoryStore::new();
        let llm = Arc::new(
            ScriptedModel::new()
                .on("search engine queries", "[]")
                .on("select relevant", "[0]")
                .on("concise summaries", "Summary text.")
                .on("identifies the key topics", "[\"rust\"]")
                .on("editor writing", "# This week\n\nNews."),
        );
        let source: Arc<dyn SearchSource> = Arc::new(FakeSource::new(
            "articles",
            vec![item("https://a.io/1", SourceType::Article, 1)],
        ));
        let extractor = Arc::new(FakeExtractor::default().with_page("https://a.io/1", LONG_TEXT));
        let fetcher = Arc::new(ContentFetcher::new(
            Arc::new(store.clone()),
            llm.clone(),
            vec![source],
            extractor,
        ));
        let newsletters = Arc::new(NewsletterService::new(
            Arc::new(store.clone()),
            llm,
            Arc::new(RecordingMailer::default()),
            fetcher.clone(),
            "noreply@concisely.app",
            "https://concisely.app",
        ));

        let state = AppState {
            config: Arc::new(config),
            store: Arc::new(store.clone()),
            fetcher,
            newsletters,
        };
        (create_router(state), store)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn register_user(app: &Router, email: &str, topics: &[&str]) -> String {
        let (status, body) = call(
            app,
            "POST",
            "/api/users",
            Some(json!({
                "name": "Ada",
                "email": email,
                "preferences": { "topics": topics, "delivery_frequency": "daily" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_user_validation_and_duplicates() {
        let (app, _) = app();
        let (status, body) = call(&app, "POST", "/api/users", Some(json!({"name": "Ada", "email": "nope"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        register_user(&app, "ada@x.io", &["rust"]).await;
        let (status, body) = call(&app, "POST", "/api/users", Some(json!({"name": "Ada", "email": "ADA@x.io"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "User ADA@x.io already exists");
    }

    #[tokio::test]
    async fn test_malformed_input_uses_error_envelope() {
        let (app, _) = app();

        let (status, body) = call(&app, "POST", "/api/content/fetch", Some(json!({"user_id": "nope"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().unwrap().contains("user_id"), "{}", body);

        let (status, body) = call(&app, "GET", "/api/newsletters/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());

        let (status, body) = call(&app, "POST", "/api/users/not-a-uuid/summaries/also-bad", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let request = Request::builder()
            .method("POST")
            .uri("/api/users")
            .header("content-type", "application/json")
            .body(Body::from("{\"name\": "))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_update_preferences_cleans_topics() {
        let (app, _) = app();
        let id = register_user(&app, "ada@x.io", &["rust"]).await;
        let (status, body) = call(
            &app,
            "PUT",
            &format!("/api/users/{}/preferences", id),
            Some(json!({"topics": [" AI ", "ai", "", "Rust"], "delivery_frequency": "monthly"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["preferences"]["topics"], json!(["AI", "Rust"]));
        assert_eq!(body["data"]["preferences"]["delivery_frequency"], "monthly");

        let missing = format!("/api/users/{}/preferences", Uuid::new_v4());
        let (status, _) = call(&app, "PUT", &missing, Some(json!({"topics": ["x"]}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fetch_requires_topics() {
        let (app, _) = app();
        let id = register_user(&app, "ada@x.io", &[]).await;
        let (status, body) = call(&app, "POST", "/api/content/fetch", Some(json!({"user_id": id}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No topics found for user");
    }

    #[tokio::test]
    async fn test_fetch_content_returns_report() {
        let (app, _) = app();
        let id = register_user(&app, "ada@x.io", &["rust"]).await;
        let (status, body) = call(&app, "POST", "/api/content/fetch", Some(json!({"user_id": id}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Successfully processed 1 items");
        assert_eq!(body["data"]["summaries"][0]["summary"], "Summary text.");

        let (status, body) = call(&app, "POST", "/api/content/fetch", Some(json!({"user_id": id}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_trigger_newsletter() {
        let (app, store) = app();
        let id = register_user(&app, "ada@x.io", &["rust"]).await;
        let (status, body) = call(&app, "POST", "/api/content/newsletter", Some(json!({"user_id": id}))).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["newsletter"]["status"], "sent");
        assert_eq!(store.list_newsletters().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_newsletter_lifecycle() {
        let (app, store) = app();
        let user_id: Uuid = register_user(&app, "ada@x.io", &["rust"]).await.parse().unwrap();
        let summary = store
            .insert_summary(Summary {
                id: Uuid::new_v4(),
                user_id,
                title: "t".into(),
                original_content: String::new(),
                summary: "s".into(),
                source_url: "https://a.io/x".into(),
                source_type: SourceType::Article,
                topics: vec![],
                ratings: Ratings::default(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let (status, body) = call(
            &app,
            "POST",
            "/api/newsletters",
            Some(json!({"title": "Issue 1", "topics": ["rust"], "summary_ids": [summary.id]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["data"]["status"], "draft");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "POST",
            &format!("/api/newsletters/{}/schedule", id),
            Some(json!({"scheduled_date": "2001-01-01T00:00:00Z"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, "POST", &format!("/api/newsletters/{}/send", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["sent_count"], 1);

        let (status, _) = call(&app, "POST", &format!("/api/newsletters/{}/send", id), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = call(&app, "GET", "/api/newsletters", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _) = call(&app, "DELETE", &format!("/api/newsletters/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&app, "GET", &format!("/api/newsletters/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_rate_summary() {
        let (app, store) = app();
        let user = store
            .insert_user(User::new("Ada", "ada@x.io", Preferences::default()))
            .await
            .unwrap();
        let summary = store
            .insert_summary(Summary {
                id: Uuid::new_v4(),
                user_id: user.id,
                title: "t".into(),
                original_content: String::new(),
                summary: "s".into(),
                source_url: "https://a.io/x".into(),
                source_type: SourceType::Article,
                topics: vec![],
                ratings: Ratings::default(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let uri = format!("/api/summaries/{}/rate", summary.id);
        call(&app, "POST", &uri, Some(json!({"helpful": true}))).await;
        let (status, body) = call(&app, "POST", &uri, Some(json!({"helpful": false}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ratings"], json!({"helpful": 1, "not_helpful": 1}));

        let (status, _) = call(&app, "GET", &format!("/api/summaries/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_and_save_summaries() {
        let (app, _) = app();
        let owner = register_user(&app, "ada@x.io", &["rust"]).await;
        let reader = register_user(&app, "bob@x.io", &["rust"]).await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/summaries/article",
            Some(json!({"user_id": owner, "url": "https://a.io/1", "title": "First"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["data"]["source_type"], "article");
        let summary_id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "POST",
            "/api/summaries/recipe",
            Some(json!({"user_id": owner, "url": "https://a.io/1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let save = format!("/api/users/{}/summaries/{}", reader, summary_id);
        let (status, body) = call(&app, "POST", &save, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Summary saved");

        let (_, body) = call(&app, "GET", &format!("/api/users/{}/summaries", reader), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _) = call(&app, "DELETE", &save, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "DELETE", &save, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "DELETE", &format!("/api/summaries/{}", summary_id), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "GET", &format!("/api/summaries/{}", summary_id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, "GET", &format!("/api/users/{}", owner), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "ada@x.io");
    }

    #[test]
    fn test_frequency_roundtrips_through_json() {
        let prefs: Preferences = serde_json::from_value(json!({"topics": ["a"], "delivery_frequency": "daily"})).unwrap();
        assert_eq!(prefs.delivery_frequency, DeliveryFrequency::Daily);
        assert_eq!(prefs.max_items_per_newsletter, 5);
    }
}
