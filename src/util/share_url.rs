//! Launch parameters and shareable session URLs.
//!
//! A chat page is addressed as `<page>?chatbot=<id>&session=<id>`. Reading
//! those parameters decides which chatbot and session a client boots into;
//! writing them back produces a link that reopens the same conversation.

#[cfg(test)]
#[path = "share_url_test.rs"]
mod share_url_test;

use reqwest::Url;

use crate::error::ClientError;

pub const CHATBOT_PARAM: &str = "chatbot";
pub const SESSION_PARAM: &str = "session";

/// Query parameters a client was launched with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchParams {
    /// Raw `chatbot` value; may fail to parse as an id.
    pub chatbot: Option<String>,
    pub session: Option<String>,
}

impl LaunchParams {
    /// Read `chatbot` and `session` from `url`. Empty values count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] when `url` is not absolute.
    pub fn from_url(url: &str) -> Result<Self, ClientError> {
        let parsed = Url::parse(url).map_err(|e| ClientError::InvalidUrl(format!("{url}: {e}")))?;
        let mut params = Self::default();
        for (key, value) in parsed.query_pairs() {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                CHATBOT_PARAM => params.chatbot = Some(value.to_owned()),
                SESSION_PARAM => params.session = Some(value.to_owned()),
                _ => {}
            }
        }
        Ok(params)
    }

    #[must_use]
    pub fn with_chatbot(mut self, chatbot_id: i64) -> Self {
        self.chatbot = Some(chatbot_id.to_string());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session = Some(session_id.into());
        self
    }

    /// The `chatbot` parameter as an id; `None` when absent or non-numeric.
    #[must_use]
    pub fn chatbot_id(&self) -> Option<i64> {
        self.chatbot.as_deref().and_then(|raw| raw.parse().ok())
    }
}

/// URL that reopens `session_id` of `chatbot_id` on `page`.
///
/// Any other query parameters on `page` are kept; existing `chatbot` and
/// `session` values are replaced.
///
/// # Errors
///
/// Returns [`ClientError::InvalidUrl`] when `page` is not absolute.
pub fn share_url(page: &str, chatbot_id: i64, session_id: &str) -> Result<String, ClientError> {
    build(page, chatbot_id, Some(session_id))
}

/// URL that opens `chatbot_id` on `page` without a session.
///
/// # Errors
///
/// Returns [`ClientError::InvalidUrl`] when `page` is not absolute.
pub fn fresh_session_url(page: &str, chatbot_id: i64) -> Result<String, ClientError> {
    build(page, chatbot_id, None)
}

fn build(page: &str, chatbot_id: i64, session_id: Option<&str>) -> Result<String, ClientError> {
    let mut url = Url::parse(page).map_err(|e| ClientError::InvalidUrl(format!("{page}: {e}")))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != CHATBOT_PARAM && k != SESSION_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in &kept {
            query.append_pair(k, v);
        }
        query.append_pair(CHATBOT_PARAM, &chatbot_id.to_string());
        if let Some(session) = session_id {
            query.append_pair(SESSION_PARAM, session);
        }
    }
    Ok(url.into())
}
