use async_trait::async_trait;
use pulldown_cmark::{html, Options, Parser};
use serde::Serialize;

use crate::error::Result;
use crate::models::{Newsletter, User};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<()>;
}

/// Logs every message instead of delivering it. Nothing is retained.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl LogMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, "Email queued ({} bytes)", email.html.len());
        Ok(())
    }
}

pub fn markdown_to_html(markdown: &str) -> String {
    // Models often return literal "\n" sequences
    let markdown = markdown.replace("\\n", "\n");
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(&markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Builds the message for one recipient of a newsletter.
pub fn newsletter_email(newsletter: &Newsletter, user: &User, from: &str, app_url: &str) -> OutgoingEmail {
    let app_url = app_url.trim_end_matches('/');
    let html = format!(
        "<h1>{title}</h1>\n<p><em>Topics: {topics}</em></p>\n{body}\n<hr>\n\
         <p>You received this newsletter because you subscribed to these topics.</p>\n\
         <p><a href=\"{app}/unsubscribe/{id}\">Unsubscribe</a> | <a href=\"{app}/preferences/{id}\">Update preferences</a></p>\n",
        title = escape(&newsletter.title),
        topics = escape(&newsletter.topics.join(", ")),
        body = markdown_to_html(&newsletter.content),
        app = app_url,
        id = user.id,
    );

    OutgoingEmail {
        from: from.to_string(),
        to: user.email.clone(),
        subject: newsletter.title.clone(),
        html,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Preferences;

    #[test]
    fn test_markdown_to_html() {
        let html = markdown_to_html("## Rust\\n\\n- **fast**\n- safe");
        assert!(html.contains("<h2>Rust</h2>"));
        assert!(html.contains("<strong>fast</strong>"));
        assert!(html.contains("<li>safe</li>"));
    }

    #[test]
    fn test_newsletter_email_links() {
        let user = User::new("Ada", "ada@example.com", Preferences::default());
        let newsletter = Newsletter::draft(
            "Your Weekly Update - 2026-10-19".into(),
            "Hello <world>".into(),
            vec!["ai".into(), "rust".into()],
            vec![],
        );
        let email = newsletter_email(&newsletter, &user, "noreply@concisely.app", "https://concisely.app/");

        assert_eq!(email.to, "ada@example.com");
        assert_eq!(email.subject, "Your Weekly Update - 2026-10-19");
        assert!(email.html.contains("Topics: ai, rust"));
        assert!(email.html.contains(&format!("https://concisely.app/unsubscribe/{}", user.id)));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_without_retaining() {
        let mailer = LogMailer::new();
        for i in 0..3 {
            let sent = mailer
                .send(OutgoingEmail {
                    from: "a@x.io".into(),
                    to: format!("user{}@x.io", i),
                    subject: "hi".into(),
                    html: "<p>hi</p>".into(),
                })
                .await;
            assert!(sent.is_ok());
        }
        assert_eq!(std::mem::size_of::<LogMailer>(), 0);
    }
}
