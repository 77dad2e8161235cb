//! Client configuration: one parameter object for every client variant.
//!
//! DESIGN
//! ======
//! The full-page chat, the embeddable widget and the widget with human
//! support differ only in capabilities and a few policies. They share one
//! `ChatClientConfig`; presets pick the capability set and `from_env` lets a
//! host override individual knobs without code changes.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_PAGE_URL: &str = "http://127.0.0.1:8000/index.html";
pub const DEFAULT_SELECTOR_URL: &str = "select.html";
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TITLE: &str = "AI Assistant";

/// Errors raised while building a config from the environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown CHATDESK_VARIANT: {0} (expected page, widget or widget-support)")]
    UnknownVariant(String),
    #[error("invalid value for {key}: {value}")]
    InvalidNumber { key: String, value: String },
    #[error("invalid URL for {key}: {value}")]
    InvalidUrl { key: String, value: String },
}

/// Which of the three client shapes this instance behaves as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientVariant {
    /// Full-page chat with a selector page to fall back to.
    FullPage,
    /// Embedded widget bound to one chatbot.
    Widget,
    /// Embedded widget that can hand off to a live agent.
    WidgetWithSupport,
}

impl ClientVariant {
    /// Parse the `page | widget | widget-support` spelling used by env and CLI.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownVariant`] for any other spelling.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "page" | "full-page" => Ok(Self::FullPage),
            "widget" => Ok(Self::Widget),
            "widget-support" => Ok(Self::WidgetWithSupport),
            other => Err(ConfigError::UnknownVariant(other.to_owned())),
        }
    }
}

/// Optional behaviours switched on per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    pub human_support: bool,
    pub feedback: bool,
    pub suggested_questions: bool,
    pub share_links: bool,
}

/// What happens when a session id from the URL cannot be restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePolicy {
    /// Show the reason, disable input and wait for "start new session".
    FailClosed,
    /// Quietly create a fresh session instead.
    StartFresh,
}

/// Backoff schedule for the support channel after an unexpected close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), before jitter.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1_u32 << shift)
            .min(self.max_backoff)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            initial_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(10_000),
        }
    }
}

/// Complete configuration of one chat client instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatClientConfig {
    pub variant: ClientVariant,
    /// Backend API base, e.g. `https://host/api` (no trailing slash).
    pub api_base: String,
    /// Page URL that share links point at.
    pub page_url: String,
    /// Where a full-page client sends visitors without a usable chatbot.
    pub selector_url: String,
    /// Chatbot this instance is bound to, like a widget's `data-id`.
    pub chatbot_id: Option<i64>,
    pub capabilities: Capabilities,
    pub restore_policy: RestorePolicy,
    pub history_limit: u32,
    pub keepalive: Duration,
    pub reconnect: ReconnectPolicy,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Header title; the chatbot name is used when absent.
    pub title: Option<String>,
    /// Welcome text; derived from the chatbot when absent.
    pub welcome_message: Option<String>,
}

impl ChatClientConfig {
    /// Configuration for `variant` with every other knob at its default.
    #[must_use]
    pub fn for_variant(variant: ClientVariant) -> Self {
        let (capabilities, restore_policy) = match variant {
            ClientVariant::FullPage => (
                Capabilities { human_support: false, feedback: true, suggested_questions: true, share_links: true },
                RestorePolicy::FailClosed,
            ),
            ClientVariant::Widget => (
                Capabilities { human_support: false, feedback: false, suggested_questions: false, share_links: true },
                RestorePolicy::StartFresh,
            ),
            ClientVariant::WidgetWithSupport => (
                Capabilities { human_support: true, feedback: false, suggested_questions: false, share_links: true },
                RestorePolicy::StartFresh,
            ),
        };
        Self {
            variant,
            api_base: DEFAULT_API_BASE.to_owned(),
            page_url: DEFAULT_PAGE_URL.to_owned(),
            selector_url: DEFAULT_SELECTOR_URL.to_owned(),
            chatbot_id: None,
            capabilities,
            restore_policy,
            history_limit: DEFAULT_HISTORY_LIMIT,
            keepalive: Duration::from_secs(DEFAULT_KEEPALIVE_SECS),
            reconnect: ReconnectPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            title: None,
            welcome_message: None,
        }
    }

    #[must_use]
    pub fn full_page() -> Self {
        Self::for_variant(ClientVariant::FullPage)
    }

    #[must_use]
    pub fn widget() -> Self {
        Self::for_variant(ClientVariant::Widget)
    }

    #[must_use]
    pub fn widget_with_support() -> Self {
        Self::for_variant(ClientVariant::WidgetWithSupport)
    }

    /// Switch to `variant`'s capabilities and policies, keeping every other
    /// knob.
    #[must_use]
    pub fn with_variant(self, variant: ClientVariant) -> Self {
        let preset = Self::for_variant(variant);
        Self {
            variant,
            capabilities: preset.capabilities,
            restore_policy: preset.restore_policy,
            ..self
        }
    }

    /// Whether an unusable chatbot navigates to the selector page.
    ///
    /// Only the full page has a selector to go back to; widgets report an
    /// error in place.
    #[must_use]
    pub fn redirects_to_selector(&self) -> bool {
        self.variant == ClientVariant::FullPage
    }

    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `CHATDESK_VARIANT`: `page` (default), `widget` or `widget-support`
    /// - `CHATDESK_API_BASE`: default `http://127.0.0.1:8000/api`
    /// - `CHATDESK_PAGE_URL`: page URL used for share links
    /// - `CHATDESK_CHATBOT_ID`: chatbot the instance is bound to
    /// - `CHATDESK_HISTORY_LIMIT`: default 50
    /// - `CHATDESK_KEEPALIVE_SECS`: default 30
    /// - `CHATDESK_RECONNECT_ATTEMPTS`: default 5
    /// - `CHATDESK_REQUEST_TIMEOUT_SECS`: default 30
    /// - `CHATDESK_CONNECT_TIMEOUT_SECS`: default 10
    /// - `CHATDESK_TITLE`: header title override
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let variant = match std::env::var("CHATDESK_VARIANT").ok().as_deref() {
            None | Some("") => ClientVariant::FullPage,
            Some(raw) => ClientVariant::parse(raw)?,
        };
        let mut cfg = Self::for_variant(variant);

        if let Some(base) = env_non_empty("CHATDESK_API_BASE") {
            cfg.api_base = parse_http_url("CHATDESK_API_BASE", &base)?;
        }
        if let Some(page) = env_non_empty("CHATDESK_PAGE_URL") {
            cfg.page_url = parse_http_url("CHATDESK_PAGE_URL", &page)?;
        }
        if env_non_empty("CHATDESK_CHATBOT_ID").is_some() {
            cfg.chatbot_id = Some(env_parse("CHATDESK_CHATBOT_ID", 0_i64)?);
        }
        cfg.history_limit = env_parse("CHATDESK_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?;
        cfg.keepalive = Duration::from_secs(env_parse("CHATDESK_KEEPALIVE_SECS", DEFAULT_KEEPALIVE_SECS)?);
        cfg.reconnect.max_attempts = env_parse("CHATDESK_RECONNECT_ATTEMPTS", DEFAULT_RECONNECT_ATTEMPTS)?;
        cfg.request_timeout =
            Duration::from_secs(env_parse("CHATDESK_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?);
        cfg.connect_timeout =
            Duration::from_secs(env_parse("CHATDESK_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?);
        cfg.title = env_non_empty("CHATDESK_TITLE");

        Ok(cfg)
    }
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self::full_page()
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env_non_empty(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key: key.to_owned(), value: raw }),
    }
}

fn parse_http_url(key: &str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    match reqwest::Url::parse(trimmed) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(trimmed.to_owned()),
        _ => Err(ConfigError::InvalidUrl { key: key.to_owned(), value: raw.to_owned() }),
    }
}
