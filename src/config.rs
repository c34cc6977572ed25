use crate::error::EngineError;

/// Which execution provider backs trade actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Simulated,
    Metatrader,
}

/// Environment configuration.
///
/// | Env var | Required | Purpose |
/// |---------|----------|---------|
/// | `DATABASE_PATH` | yes | SQLite store file |
/// | `MARKET_API_KEY` | yes | market-data API key |
/// | `MARKET_API_BASE_URL` | no | market-data endpoint override |
/// | `TRADE_PROVIDER_TYPE` | no | `SIMULATED` (default) or `METATRADER` |
/// | `MT_BRIDGE_URL` | with METATRADER | bridge base URL |
/// | `MT_BRIDGE_API_KEY` | with METATRADER | bridge shared secret |
/// | `SENDGRID_API_KEY` | no | email dispatch; skipped when unset |
/// | `FROM_EMAIL` | no | email sender |
/// | `NOTIFICATION_EMAIL_RECIPIENT` | no | email recipient |
/// | `PORT` | no | listen port, default 8080 |
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub market_api_key: String,
    pub market_api_base_url: Option<String>,
    pub provider_type: ProviderType,
    pub mt_bridge_url: Option<String>,
    pub mt_bridge_api_key: Option<String>,
    pub sendgrid_api_key: Option<String>,
    pub from_email: Option<String>,
    pub notification_email_recipient: Option<String>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, EngineError> {
        let provider_type = match optional("TRADE_PROVIDER_TYPE").as_deref() {
            None | Some("SIMULATED") => ProviderType::Simulated,
            Some("METATRADER") => ProviderType::Metatrader,
            Some(other) => {
                return Err(EngineError::Config(format!(
                    "TRADE_PROVIDER_TYPE must be SIMULATED or METATRADER, got {other}"
                )))
            }
        };

        let port = match optional("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| EngineError::Config(format!("PORT is not a number: {raw}")))?,
            None => 8080,
        };

        Ok(Self {
            database_path: required("DATABASE_PATH")?,
            market_api_key: required("MARKET_API_KEY")?,
            market_api_base_url: optional("MARKET_API_BASE_URL"),
            provider_type,
            mt_bridge_url: optional("MT_BRIDGE_URL"),
            mt_bridge_api_key: optional("MT_BRIDGE_API_KEY"),
            sendgrid_api_key: optional("SENDGRID_API_KEY"),
            from_email: optional("FROM_EMAIL"),
            notification_email_recipient: optional("NOTIFICATION_EMAIL_RECIPIENT"),
            port,
        })
    }

    /// True when every value the bridge provider needs is present.
    pub fn bridge_configured(&self) -> bool {
        self.mt_bridge_url.is_some() && self.mt_bridge_api_key.is_some()
    }

    /// True when every value email dispatch needs is present.
    pub fn email_configured(&self) -> bool {
        self.sendgrid_api_key.is_some()
            && self.from_email.is_some()
            && self.notification_email_recipient.is_some()
    }
}

fn required(name: &str) -> Result<String, EngineError> {
    match std::env::var(name) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(EngineError::Config(format!("{name} is not set"))),
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            database_path: "engine.db".into(),
            market_api_key: "key".into(),
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
    fn bridge_needs_both_url_and_key() {
        let mut cfg = base();
        assert!(!cfg.bridge_configured());
        cfg.mt_bridge_url = Some("http://bridge:9000".into());
        assert!(!cfg.bridge_configured());
        cfg.mt_bridge_api_key = Some("secret".into());
        assert!(cfg.bridge_configured());
    }

    #[test]
    fn email_needs_all_three_values() {
        let mut cfg = base();
        cfg.sendgrid_api_key = Some("sg".into());
        cfg.from_email = Some("bot@example.com".into());
        assert!(!cfg.email_configured());
        cfg.notification_email_recipient = Some("ops@example.com".into());
        assert!(cfg.email_configured());
    }
}
