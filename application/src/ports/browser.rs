//! Browsing port
//!
//! Web search and page retrieval, used by research and browse actions.

use super::collaborator_error::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { max_results: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitOptions {
    /// Longest text content returned, in bytes
    pub max_text_bytes: usize,
}

impl Default for VisitOptions {
    fn default() -> Self {
        Self {
            max_text_bytes: 50_000,
        }
    }
}

/// A fetched page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub url: String,
    pub title: Option<String>,
    pub status_code: u16,
    /// Raw body
    pub content: String,
    /// Visible text extracted from the body
    pub text_content: String,
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, CollaboratorError>;

    async fn visit_url(
        &self,
        url: &str,
        options: &VisitOptions,
    ) -> Result<PageContent, CollaboratorError>;
}
