//! Process configuration loaded from environment variables.
//!
//! Everything a user edits at runtime (templates, folders, toggles, the
//! stored credential) lives in the persisted [`Settings`](crate::models::Settings)
//! instead; this struct only carries what the process needs to start.

use std::env;
use std::path::PathBuf;

const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_FIT_API_URL: &str = "https://www.googleapis.com/fitness/v1";
const DEFAULT_CALLBACK_PORT: u16 = 42813;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Google OAuth client ID (public)
    pub google_client_id: String,
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// Root directory of the note vault documents are written into
    pub vault_path: PathBuf,
    /// Location of the persisted settings file
    pub settings_path: PathBuf,
    /// Loopback port for the OAuth redirect listener
    pub callback_port: u16,
    /// Google authorization endpoint
    pub auth_url: String,
    /// Google token endpoint
    pub token_url: String,
    /// Google Fit REST base URL
    pub fit_api_url: String,
    /// Google Cloud project number used to name our raw data sources
    pub fit_project_number: String,
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            google_client_id: "123456789-test.apps.googleusercontent.com".to_string(),
            google_client_secret: "test_secret".to_string(),
            vault_path: PathBuf::from("."),
            settings_path: PathBuf::from(".measurement-journal/settings.json"),
            callback_port: DEFAULT_CALLBACK_PORT,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            fit_api_url: DEFAULT_FIT_API_URL.to_string(),
            fit_project_number: "123456789".to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honoured for local use.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let google_client_id = env::var("GOOGLE_CLIENT_ID")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_ID"))?;
        let google_client_secret = env::var("GOOGLE_CLIENT_SECRET")
            .map(|v| v.trim().to_string())
            .map_err(|_| ConfigError::Missing("GOOGLE_CLIENT_SECRET"))?;

        let vault_path = PathBuf::from(env::var("VAULT_PATH").unwrap_or_else(|_| ".".to_string()));
        let settings_path = env::var("SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| vault_path.join(".measurement-journal").join("settings.json"));

        let callback_port = match env::var("OAUTH_CALLBACK_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::Invalid("OAUTH_CALLBACK_PORT", raw))?,
            Err(_) => DEFAULT_CALLBACK_PORT,
        };

        let fit_project_number = env::var("GOOGLE_FIT_PROJECT_NUMBER")
            .unwrap_or_else(|_| project_number_from_client_id(&google_client_id));

        Ok(Self {
            google_client_id,
            google_client_secret,
            vault_path,
            settings_path,
            callback_port,
            auth_url: env::var("GOOGLE_AUTH_URL").unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string()),
            token_url: env::var("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string()),
            fit_api_url: env::var("GOOGLE_FIT_API_URL")
                .unwrap_or_else(|_| DEFAULT_FIT_API_URL.to_string()),
            fit_project_number,
        })
    }

    /// Redirect URI registered with Google for the loopback flow.
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.callback_port)
    }
}

/// Google client IDs look like `<project number>-<hash>.apps.googleusercontent.com`.
fn project_number_from_client_id(client_id: &str) -> String {
    client_id
        .split('-')
        .next()
        .filter(|prefix| !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or("0")
        .to_string()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("GOOGLE_CLIENT_ID", "987654-abc.apps.googleusercontent.com");
        env::set_var("GOOGLE_CLIENT_SECRET", "test_secret");
        env::remove_var("GOOGLE_FIT_PROJECT_NUMBER");
        env::remove_var("OAUTH_CALLBACK_PORT");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.google_client_id, "987654-abc.apps.googleusercontent.com");
        assert_eq!(config.google_client_secret, "test_secret");
        assert_eq!(config.callback_port, DEFAULT_CALLBACK_PORT);
        assert_eq!(config.fit_project_number, "987654");
        assert_eq!(config.redirect_uri(), "http://127.0.0.1:42813/callback");
    }

    #[test]
    fn test_project_number_fallback() {
        assert_eq!(project_number_from_client_id("not-a-number"), "0");
        assert_eq!(project_number_from_client_id("42-x"), "42");
    }
}
