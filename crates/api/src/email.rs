//! Transactional email delivery via the Resend HTTP API
//!
//! Delivery is best-effort: failures are logged and never propagated into
//! request handling. When RESEND_API_KEY is unset the service is disabled
//! and sends become debug-logged no-ops.

use reqwest::Client;
use serde_json::json;

const RESEND_API_URL: &str = "https://api.resend.com";

#[derive(Clone)]
pub struct EmailService {
    client: Client,
    api_key: Option<String>,
    from_address: String,
    base_url: String,
}

impl EmailService {
    pub fn from_env() -> Self {
        let api_key = std::env::var("RESEND_API_KEY").ok().filter(|k| !k.is_empty());
        let from_address = std::env::var("EMAIL_FROM")
            .unwrap_or_else(|_| "CodeScribe <noreply@codescribe.ai>".to_string());

        Self {
            client: Client::new(),
            api_key,
            from_address,
            base_url: RESEND_API_URL.to_string(),
        }
    }

    /// Test constructor with an explicit endpoint
    #[cfg(test)]
    fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: Some(api_key.to_string()),
            from_address: "CodeScribe <noreply@codescribe.ai>".to_string(),
            base_url: base_url.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn send_verification_email(&self, to: &str, verify_url: &str) {
        let html = format!(
            "<p>Welcome to CodeScribe AI!</p>\
             <p>Please confirm your email address by clicking \
             <a href=\"{}\">this link</a>. The link expires in 24 hours.</p>",
            verify_url
        );
        self.send(to, "Verify your CodeScribe email", &html).await;
    }

    pub async fn send_password_reset_email(&self, to: &str, reset_url: &str) {
        let html = format!(
            "<p>A password reset was requested for your CodeScribe account.</p>\
             <p><a href=\"{}\">Reset your password</a> (the link expires in 2 hours).</p>\
             <p>If you did not request this, you can ignore this email.</p>",
            reset_url
        );
        self.send(to, "Reset your CodeScribe password", &html).await;
    }

    pub async fn send_trial_started_email(&self, to: &str, tier: &str, ends_at: &str) {
        let html = format!(
            "<p>Your CodeScribe <strong>{}</strong> trial has started.</p>\
             <p>It runs until {}. Enjoy!</p>",
            tier, ends_at
        );
        self.send(to, "Your CodeScribe trial has started", &html)
            .await;
    }

    async fn send(&self, to: &str, subject: &str, html: &str) {
        let Some(api_key) = &self.api_key else {
            tracing::debug!(to = %to, subject = %subject, "Email service disabled, skipping send");
            return;
        };

        let payload = json!({
            "from": self.from_address,
            "to": [to],
            "subject": subject,
            "html": html,
        });

        let result = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(to = %to, subject = %subject, "Email sent");
            }
            Ok(response) => {
                tracing::error!(
                    to = %to,
                    subject = %subject,
                    status = %response.status(),
                    "Email provider rejected send"
                );
            }
            Err(e) => {
                tracing::error!(to = %to, subject = %subject, error = %e, "Email send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_posts_to_provider() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/emails")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(r#"{"id":"email_123"}"#)
            .create_async()
            .await;

        let service = EmailService::with_base_url("test-key", &server.url());
        service
            .send_password_reset_email("user@example.com", "https://app.test/reset?token=abc")
            .await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_disabled_service_skips_network() {
        let service = EmailService {
            client: Client::new(),
            api_key: None,
            from_address: "CodeScribe <noreply@codescribe.ai>".to_string(),
            // Nothing listens here; a send attempt would error loudly
            base_url: "http://127.0.0.1:1".to_string(),
        };

        // Must silently no-op rather than attempt delivery
        service
            .send_verification_email("user@example.com", "https://app.test/verify?token=abc")
            .await;
    }
}
