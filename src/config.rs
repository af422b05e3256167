//! Configuration for the chat widget

use crate::error::ErrorKind;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8002";

/// Identity sent on the wire when nobody is logged in
pub const ANONYMOUS_USER_ID: &str = "default";

pub const DEFAULT_GREETING: &str =
    "Bonjour, je suis votre assistant médical. Comment puis-je vous aider aujourd'hui ?";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid MEDCHAT_BASE_URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Replies shown to the patient when a turn fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessages {
    pub validation: String,
    pub server: String,
    pub network: String,
    pub unknown: String,
}

impl Default for ErrorMessages {
    fn default() -> Self {
        Self {
            validation: "Format de données invalide. Veuillez réessayer.".to_string(),
            server: "Une erreur est survenue. Veuillez réessayer.".to_string(),
            network: "Impossible de joindre le serveur. Vérifiez votre connexion.".to_string(),
            unknown: "Désolé, je rencontre des difficultés techniques. Veuillez réessayer."
                .to_string(),
        }
    }
}

impl ErrorMessages {
    pub fn for_kind(&self, kind: ErrorKind) -> &str {
        match kind {
            ErrorKind::Validation => &self.validation,
            ErrorKind::Server => &self.server,
            ErrorKind::Network => &self.network,
            ErrorKind::Unknown => &self.unknown,
        }
    }
}

/// Widget configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Chat backend origin, without the `/api/chat` path
    pub base_url: String,
    /// Logged-in patient, if any
    pub user_id: Option<String>,
    /// Seeded assistant turn
    pub greeting: String,
    pub error_messages: ErrorMessages,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_id: None,
            greeting: DEFAULT_GREETING.to_string(),
            error_messages: ErrorMessages::default(),
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            std::env::var("MEDCHAT_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let user_id = std::env::var("MEDCHAT_USER_ID")
            .ok()
            .filter(|id| !id.trim().is_empty());
        let greeting =
            std::env::var("MEDCHAT_GREETING").unwrap_or_else(|_| DEFAULT_GREETING.to_string());

        let config = Self {
            base_url,
            user_id,
            greeting,
            error_messages: ErrorMessages::default(),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        Ok(())
    }

    /// Identity to put on the wire
    pub fn wire_user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(ANONYMOUS_USER_ID)
    }
}
