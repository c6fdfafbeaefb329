use crate::answer::{AnswerService, DEFAULT_MODEL, RetryPolicy};
use crate::completion::OpenAiClient;
use anyhow::{Context, bail};
use clap::{Args, Parser};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Used when `FLASK_SECRET` is unset. Only fit for local development.
pub const INSECURE_DEFAULT_SECRET: &str = "dev-secret-change-me";

/// Settings shared by the web server and the command-line tool
#[derive(Args, Debug, Clone)]
pub struct ServiceConfig {
    /// Student records CSV file
    #[arg(long, env = "STUDENTS_CSV", default_value = "students.csv")]
    pub data: PathBuf,

    /// Chat model used to answer questions
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
    pub base_url: String,

    /// Attempts per question, the first one included
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// Ceiling of the first backoff, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub base_delay_ms: u64,

    /// Longest backoff between attempts, in seconds
    #[arg(long, default_value_t = 60)]
    pub max_delay_secs: u64,

    /// Timeout of a single API request, in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServiceConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_secs(self.max_delay_secs),
            max_attempts: self.max_attempts,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the answer service backed by the configured API
    pub fn answer_service(&self, api_key: &str) -> anyhow::Result<AnswerService> {
        let client = OpenAiClient::new(&self.base_url, api_key, self.timeout())
            .context("failed to build HTTP client")?;
        Ok(AnswerService::new(
            Arc::new(client),
            &self.model,
            self.retry_policy(),
        ))
    }
}

/// Command-line options of the web server
#[derive(Parser, Debug, Clone)]
#[command(name = "website")]
#[command(about = "Ask questions about the student records table in the browser", long_about = None)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:5000")]
    pub bind: SocketAddr,

    #[command(flatten)]
    pub service: ServiceConfig,
}

/// Values that only ever come from the environment
#[derive(Clone)]
pub struct Secrets {
    pub api_key: String,
    pub cookie_secret: String,
    /// True when `FLASK_SECRET` was not set
    pub insecure_cookie_secret: bool,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("api_key", &"<redacted>")
            .field("cookie_secret", &"<redacted>")
            .field("insecure_cookie_secret", &self.insecure_cookie_secret)
            .finish()
    }
}

impl Secrets {
    /// Read `OPENAI_API_KEY` and `FLASK_SECRET` from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read secrets through an arbitrary lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let Some(api_key) = read("OPENAI_API_KEY") else {
            bail!("OPENAI_API_KEY must be set to call the chat-completion API");
        };

        let (cookie_secret, insecure_cookie_secret) = match read("FLASK_SECRET") {
            Some(secret) => (secret, false),
            None => (INSECURE_DEFAULT_SECRET.to_string(), true),
        };

        Ok(Secrets {
            api_key,
            cookie_secret,
            insecure_cookie_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::try_parse_from(["website"]).unwrap();

        assert_eq!(config.bind, "127.0.0.1:5000".parse().unwrap());
        assert_eq!(config.service.max_attempts, 3);
        assert_eq!(config.service.retry_policy(), RetryPolicy::default());
        assert_eq!(config.service.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_server_overrides() {
        let config = ServerConfig::try_parse_from([
            "website",
            "--bind",
            "0.0.0.0:8080",
            "--data",
            "data/records.csv",
            "--model",
            "gpt-4o-mini",
            "--max-attempts",
            "5",
            "--base-delay-ms",
            "250",
            "--verbose",
        ])
        .unwrap();

        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.service.data, PathBuf::from("data/records.csv"));
        assert_eq!(config.service.model, "gpt-4o-mini");
        assert!(config.service.verbose);

        let policy = config.service.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(ServerConfig::try_parse_from(["website", "--max-attempts", "0"]).is_err());
    }

    #[test]
    fn test_invalid_bind_rejected() {
        assert!(ServerConfig::try_parse_from(["website", "--bind", "not-an-address"]).is_err());
    }

    #[test]
    fn test_secrets_require_api_key() {
        let err = Secrets::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        assert!(Secrets::from_lookup(lookup(&[("OPENAI_API_KEY", "  ")])).is_err());
    }

    #[test]
    fn test_secrets_default_cookie_secret() {
        let secrets = Secrets::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();

        assert_eq!(secrets.api_key, "sk-test");
        assert_eq!(secrets.cookie_secret, INSECURE_DEFAULT_SECRET);
        assert!(secrets.insecure_cookie_secret);
    }

    #[test]
    fn test_secrets_configured_cookie_secret() {
        let secrets = Secrets::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("FLASK_SECRET", "a long random value"),
        ]))
        .unwrap();

        assert_eq!(secrets.cookie_secret, "a long random value");
        assert!(!secrets.insecure_cookie_secret);
    }

    #[test]
    fn test_secrets_debug_redacts_values() {
        let secrets = Secrets::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        let printed = format!("{secrets:?}");

        assert!(!printed.contains("sk-test"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_answer_service_uses_config() {
        let config = ServerConfig::try_parse_from(["website", "--model", "gpt-4o-mini"]).unwrap();
        let service = config.service.answer_service("sk-test").unwrap();

        assert_eq!(service.model(), "gpt-4o-mini");
        assert_eq!(service.policy().max_attempts, 3);
    }
}
