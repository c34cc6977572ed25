//! SendGrid mailer. Email is optional: when any of the key, sender, or
//! recipient is unconfigured the engine simply skips sending.

use reqwest::Client;

use crate::config::Config;
use crate::error::EngineError;

const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";
const TIMEOUT_SECS: u64 = 5;

pub struct Mailer {
    client: Client,
    base_url: String,
    api_key: String,
    from: String,
    recipient: String,
}

impl Mailer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            from: from.into(),
            recipient: recipient.into(),
        })
    }

    /// `None` unless the key, sender, and recipient are all configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.sendgrid_api_key.as_ref()?;
        let from = config.from_email.as_ref()?;
        let recipient = config.notification_email_recipient.as_ref()?;
        Self::new(DEFAULT_BASE_URL, api_key, from, recipient).ok()
    }

    pub async fn send(&self, subject: &str, body: &str) -> Result<(), EngineError> {
        let payload = serde_json::json!({
            "personalizations": [{ "to": [{ "email": self.recipient }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }],
        });

        let resp = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::Upstream(format!("email dispatch failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(EngineError::Upstream(format!(
                "email dispatch returned status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Notification email is best-effort everywhere it is used.
    pub async fn send_best_effort(&self, subject: &str, body: &str) {
        if let Err(e) = self.send(subject, body).await {
            tracing::warn!(subject, error = %e, "notification email failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderType;

    fn config_without_email() -> Config {
        Config {
            database_path: "engine.db".into(),
            market_api_key: "k".into(),
            market_api_base_url: None,
            provider_type: ProviderType::Simulated,
            mt_bridge_url: None,
            mt_bridge_api_key: None,
            sendgrid_api_key: None,
            from_email: None,
            notification_email_recipient: None,
            port: 8080,
        }
    }

    #[test]
    fn unconfigured_email_is_skipped() {
        assert!(Mailer::from_config(&config_without_email()).is_none());

        let mut partial = config_without_email();
        partial.sendgrid_api_key = Some("sg".into());
        partial.from_email = Some("bot@example.com".into());
        assert!(Mailer::from_config(&partial).is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn send_posts_the_expected_payload() {
        let app = axum::Router::new().route(
            "/v3/mail/send",
            axum::routing::post(|axum::Json(body): axum::Json<serde_json::Value>| async move {
                assert_eq!(body["from"]["email"], "bot@example.com");
                assert_eq!(
                    body["personalizations"][0]["to"][0]["email"],
                    "ops@example.com"
                );
                assert_eq!(body["subject"], "Bot trade executed");
                axum::http::StatusCode::ACCEPTED
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mailer = Mailer::new(
            format!("http://{addr}"),
            "sg-key",
            "bot@example.com",
            "ops@example.com",
        )
        .unwrap();
        mailer
            .send("Bot trade executed", "BUY 0.05 XAUUSD @ 2031.45")
            .await
            .unwrap();
    }
}
