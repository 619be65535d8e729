//! Semantic search endpoints served by the backend (`/{app}/query/`,
//! `/read_images/answer/`).

use serde::Deserialize;
use serde_json::{Map, Value};
use strum::{Display, EnumString};
use tracing::debug;

use super::http::{backend_error_message, backend_headers, build_client, trim_trailing_slash};
use crate::config::ClientConfig;
use crate::error::RealtimeError;

/// Search front-ends and the key their results are listed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SearchApp {
    EmojiFinder,
    Qiita,
    Keizokuryoku,
    ReadImages,
}

impl SearchApp {
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::EmojiFinder => "emoji_finder",
            Self::Qiita => "qiita",
            Self::Keizokuryoku => "keizokuryoku",
            Self::ReadImages => "read_images",
        }
    }

    pub fn items_key(self) -> &'static str {
        match self {
            Self::EmojiFinder => "emojis",
            Self::Qiita => "articles",
            Self::Keizokuryoku => "pages",
            Self::ReadImages => "images",
        }
    }
}

/// `{query, <items>: [...], error?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub query: String,
    pub items: Vec<Value>,
    pub error: Option<String>,
}

/// `{query, answer, error?}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnswerResponse {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub answer: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AnswerResponse {
    /// The answer as display text.
    ///
    /// Strings are returned verbatim. Objects are read, in order, from the
    /// `text` items of a `content` array (joined by blank lines), then a
    /// `response` field, then an `answer` field; anything else is
    /// pretty-printed JSON. A `content` array without text items yields `None`.
    pub fn answer_text(&self) -> Option<String> {
        let object = match self.answer.as_ref()? {
            Value::Null => return None,
            Value::String(text) => return Some(text.clone()),
            Value::Object(object) => object,
            other => return serde_json::to_string_pretty(other).ok(),
        };

        if let Some(Value::Array(items)) = object.get("content") {
            let texts: Vec<&str> = items
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect();
            return (!texts.is_empty()).then(|| texts.join("\n\n"));
        }
        ["response", "answer"]
            .into_iter()
            .find_map(|key| object.get(key).filter(|value| is_present(value)))
            .map(display_value)
            .or_else(|| serde_json::to_string_pretty(object).ok())
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct SearchClient {
    client: reqwest::Client,
    base_url: String,
    csrf_token: Option<String>,
}

impl SearchClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_trailing_slash(base_url).to_string(),
            csrf_token: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, RealtimeError> {
        let client = Self::new(build_client(config.request_timeout)?, &config.backend_url);
        Ok(match &config.csrf_token {
            Some(token) => client.with_csrf_token(token.clone()),
            None => client,
        })
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    /// `GET /{app}/query/?query=<text>`.
    pub async fn query(&self, app: SearchApp, text: &str) -> Result<SearchResponse, RealtimeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RealtimeError::Validation("Search query cannot be empty".into()));
        }

        let url = format!("{}/{}/query/", self.base_url, app.path_segment());
        debug!(%app, query = text, "Sending search query");
        let response = self
            .client
            .get(&url)
            .headers(backend_headers(self.csrf_token.as_deref()))
            .query(&[("query", text)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RealtimeError::Search {
                status: status.as_u16(),
                message: backend_error_message(status.as_u16(), &body),
            });
        }

        let mut object: Map<String, Value> = serde_json::from_str(&body)?;
        let items = match object.remove(app.items_key()) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let query = object
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or(text)
            .to_string();
        let error = object
            .get("error")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        debug!(%app, results = items.len(), "Search completed");

        Ok(SearchResponse { query, items, error })
    }

    /// `POST /read_images/answer/` with the query and the selected image URLs.
    pub async fn answer(&self, query: &str, urls: &[String]) -> Result<AnswerResponse, RealtimeError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RealtimeError::Validation("Search query cannot be empty".into()));
        }
        if urls.is_empty() {
            return Err(RealtimeError::Validation("No image URLs provided".into()));
        }

        let mut form: Vec<(&str, &str)> = vec![("query", query)];
        form.extend(urls.iter().map(|url| ("urls", url.as_str())));

        let url = format!("{}/{}/answer/", self.base_url, SearchApp::ReadImages.path_segment());
        debug!(query, images = urls.len(), "Requesting answer");
        let response = self
            .client
            .post(&url)
            .headers(backend_headers(self.csrf_token.as_deref()))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RealtimeError::Search {
                status: status.as_u16(),
                message: backend_error_message(status.as_u16(), &body),
            });
        }
        serde_json::from_str(&body).map_err(RealtimeError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn items_keys_match_backend_payloads() {
        assert_eq!(SearchApp::EmojiFinder.items_key(), "emojis");
        assert_eq!(SearchApp::Qiita.items_key(), "articles");
        assert_eq!(SearchApp::Keizokuryoku.items_key(), "pages");
        assert_eq!(SearchApp::ReadImages.items_key(), "images");
        assert_eq!("read_images".parse::<SearchApp>().unwrap(), SearchApp::ReadImages);
    }

    #[test]
    fn answer_text_handles_strings_and_objects() {
        let text = AnswerResponse {
            query: "q".into(),
            answer: Some(json!("a cat")),
            error: None,
        };
        assert_eq!(text.answer_text().as_deref(), Some("a cat"));

        let object = AnswerResponse {
            query: "q".into(),
            answer: Some(json!({"label": "cat"})),
            error: None,
        };
        assert!(object.answer_text().unwrap().contains("\"label\": \"cat\""));

        let empty = AnswerResponse {
            query: "q".into(),
            answer: Some(Value::Null),
            error: None,
        };
        assert_eq!(empty.answer_text(), None);
    }

    fn answer(value: Value) -> Option<String> {
        AnswerResponse {
            query: "q".into(),
            answer: Some(value),
            error: None,
        }
        .answer_text()
    }

    #[test]
    fn answer_text_joins_text_content_items() {
        let text = answer(json!({
            "content": [
                {"type": "text", "text": "First paragraph."},
                {"type": "image", "source": "ignored"},
                {"type": "text", "text": "Second paragraph."}
            ],
            "response": "not used"
        }));
        assert_eq!(text.as_deref(), Some("First paragraph.\n\nSecond paragraph."));

        assert_eq!(answer(json!({"content": [{"type": "image"}]})), None);
    }

    #[test]
    fn answer_text_prefers_response_then_answer() {
        assert_eq!(
            answer(json!({"response": "from response", "answer": "from answer"})).as_deref(),
            Some("from response")
        );
        assert_eq!(
            answer(json!({"response": "", "answer": "from answer"})).as_deref(),
            Some("from answer")
        );
    }

    #[test]
    fn answer_text_falls_back_to_pretty_json() {
        let text = answer(json!({"label": "cat", "score": 0.9})).unwrap();
        assert!(text.starts_with("{\n"), "{text}");
        assert!(text.contains("\"score\": 0.9"));
    }
}
