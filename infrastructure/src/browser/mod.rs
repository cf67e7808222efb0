//! HTTP browser
//!
//! Search goes through the DuckDuckGo Instant Answer API (no API key); the
//! abstract source and related topics become [`SearchResult`]s. Page visits
//! are plain GETs, with HTML reduced to readable text.

mod html;

pub use html::{ExtractedPage, extract_page, html_to_text};

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use taskpilot_application::ports::browser::{PageContent, SearchOptions, SearchResult, VisitOptions};
use taskpilot_application::{Browser, CollaboratorError};
use tracing::debug;

/// DuckDuckGo Instant Answer API endpoint (no API key required).
const DDG_API_URL: &str = "https://api.duckduckgo.com/";

/// Maximum response body size (5 MB)
const MAX_BODY_SIZE: usize = 5 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpBrowser {
    client: reqwest::Client,
    search_url: String,
}

impl HttpBrowser {
    pub fn new() -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("taskpilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CollaboratorError::Network(e.to_string()))?;
        Ok(Self {
            client,
            search_url: DDG_API_URL.to_string(),
        })
    }

    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }
}

fn network_error(err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Timeout(REQUEST_TIMEOUT.as_secs())
    } else {
        CollaboratorError::Network(err.to_string())
    }
}

/// DDG topic text reads "Title - description"; fall back to the whole text.
fn split_topic(text: &str) -> (String, String) {
    match text.split_once(" - ") {
        Some((title, _)) => (title.trim().to_string(), text.to_string()),
        None => (text.to_string(), text.to_string()),
    }
}

/// Turn an Instant Answer payload into ranked results.
fn parse_instant_answer(data: &Value, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    if let Some(url) = data["AbstractURL"].as_str()
        && !url.is_empty()
    {
        let heading = data["Heading"].as_str().unwrap_or_default();
        let source = data["AbstractSource"].as_str().unwrap_or("Abstract");
        results.push(SearchResult {
            title: if heading.is_empty() { source.to_string() } else { heading.to_string() },
            url: url.to_string(),
            snippet: data["AbstractText"].as_str().unwrap_or_default().to_string(),
        });
    }

    // Topic groups nest their entries under "Topics"
    let mut push_topic = |topic: &Value| {
        if let (Some(text), Some(url)) = (topic["Text"].as_str(), topic["FirstURL"].as_str())
            && !text.is_empty()
            && !url.is_empty()
        {
            let (title, snippet) = split_topic(text);
            results.push(SearchResult {
                title,
                url: url.to_string(),
                snippet,
            });
        }
    };
    for topic in data["RelatedTopics"].as_array().into_iter().flatten() {
        match topic["Topics"].as_array() {
            Some(group) => group.iter().for_each(&mut push_topic),
            None => push_topic(topic),
        }
    }

    results.truncate(max_results);
    results
}

fn truncate_text(mut text: String, max_bytes: usize) -> String {
    if text.len() > max_bytes {
        let mut end = max_bytes;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, CollaboratorError> {
        if query.trim().is_empty() {
            return Err(CollaboratorError::InvalidInput("empty search query".into()));
        }

        let response = self
            .client
            .get(&self.search_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Network(format!(
                "Search API returned {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError::Network(format!("Bad search response: {}", e)))?;
        let results = parse_instant_answer(&body, options.max_results);
        debug!(query, count = results.len(), "Search complete");
        Ok(results)
    }

    async fn visit_url(
        &self,
        url: &str,
        options: &VisitOptions,
    ) -> Result<PageContent, CollaboratorError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(CollaboratorError::InvalidInput(format!(
                "unsupported URL scheme: {}",
                url
            )));
        }

        let response = self.client.get(url).send().await.map_err(network_error)?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Err(CollaboratorError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(CollaboratorError::Network(format!(
                "HTTP error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }
        if response.content_length().unwrap_or(0) > MAX_BODY_SIZE as u64 {
            return Err(CollaboratorError::InvalidInput(format!(
                "Response too large (max: {} bytes)",
                MAX_BODY_SIZE
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let final_url = response.url().to_string();
        let body = response.bytes().await.map_err(network_error)?;
        if body.len() > MAX_BODY_SIZE {
            return Err(CollaboratorError::InvalidInput(format!(
                "Response too large: {} bytes",
                body.len()
            )));
        }
        let content = String::from_utf8_lossy(&body).to_string();

        let is_html = content_type.contains("text/html") || content_type.contains("xhtml");
        let (title, text) = if is_html {
            let page = extract_page(&content);
            (page.title, page.text)
        } else {
            (None, content.clone())
        };

        Ok(PageContent {
            url: final_url,
            title,
            status_code: status.as_u16(),
            content: truncate_text(content, MAX_BODY_SIZE),
            text_content: truncate_text(text, options.max_text_bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_instant_answer() {
        let data = json!({
            "Heading": "Rust (programming language)",
            "AbstractText": "Rust is a systems programming language.",
            "AbstractSource": "Wikipedia",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust_(programming_language)",
            "RelatedTopics": [
                {"Text": "Cargo - Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo"},
                {"Name": "See also", "Topics": [
                    {"Text": "Tokio runtime", "FirstURL": "https://duckduckgo.com/Tokio"}
                ]},
                {"Text": "", "FirstURL": "https://duckduckgo.com/empty"}
            ]
        });

        let results = parse_instant_answer(&data, 5);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "Rust (programming language)");
        assert_eq!(results[1].title, "Cargo");
        assert_eq!(results[1].snippet, "Cargo - Rust package manager");
        assert_eq!(results[2].url, "https://duckduckgo.com/Tokio");

        assert_eq!(parse_instant_answer(&data, 1).len(), 1);
    }

    #[test]
    fn test_empty_answer_has_no_results() {
        let data = json!({"AbstractURL": "", "RelatedTopics": []});
        assert!(parse_instant_answer(&data, 5).is_empty());
    }

    #[test]
    fn test_truncate_text_respects_char_boundaries() {
        assert_eq!(truncate_text("héllo".to_string(), 2), "h");
        assert_eq!(truncate_text("short".to_string(), 10), "short");
    }

    #[tokio::test]
    async fn test_visit_rejects_non_http_urls() {
        let browser = HttpBrowser::new().unwrap();
        let err = browser
            .visit_url("file:///etc/passwd", &VisitOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::InvalidInput(_)));
    }
}
