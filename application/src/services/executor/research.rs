//! Research handler
//!
//! Fans out one lookup per query (browser search + page visits when a
//! browser is configured, then a completion call), races the whole session
//! against `research_timeout`, and synthesizes the findings into one report:
//! `{summary, keyFindings, technicalDetails, recommendations}`.
//!
//! Findings are cached per handler instance by normalized query, keeping
//! at most [`DEFAULT_CACHE_CAPACITY`] queries (oldest evicted first).

use super::{ActionHandler, ExecutionContext, HandlerError, HandlerOutput};
use crate::ports::browser::{SearchOptions, VisitOptions};
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use taskpilot_domain::core::string::truncate;
use taskpilot_domain::structured::{extract_from_response, is_extraction_failure};
use taskpilot_domain::{Action, ActionPayload, CompletionOptions, PromptTemplate};
use tracing::{debug, info, warn};

/// Longest fallback summary built from raw findings
const FALLBACK_SUMMARY_LEN: usize = 4000;

/// Queries remembered by a handler unless configured otherwise
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

type Findings = Arc<Mutex<Vec<(String, String)>>>;

/// Finding per normalized query, evicted in insertion order
struct FindingCache {
    entries: HashMap<String, String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl FindingCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, finding: String) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), finding).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

pub struct ResearchHandler {
    cache: Mutex<FindingCache>,
}

impl Default for ResearchHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl ResearchHandler {
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Remember at most `capacity` queries; 0 disables caching.
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(FindingCache::new(capacity)),
        }
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.lock().entries.len()
    }

    /// Look up one query and push its finding.
    async fn research_query(
        &self,
        query: &str,
        research_context: &str,
        context: &ExecutionContext,
        findings: Findings,
    ) -> Result<(), HandlerError> {
        let key = normalize_query(query);
        let cached = self.cache.lock().get(&key);
        if let Some(cached) = cached {
            debug!(query, "Research cache hit");
            findings.lock().push((query.to_string(), cached));
            return Ok(());
        }

        let sources = self.browse(query, context).await;

        let finding = if context.completion.is_available() {
            let options = CompletionOptions::default().with_system(PromptTemplate::research_system());
            let prompt = PromptTemplate::research_query(query, research_context, &sources);
            match context.completion.complete_text(&prompt, &options).await {
                Ok(text) => text,
                Err(e) if !sources.is_empty() => {
                    warn!(query, error = %e, "Completion failed; keeping raw sources");
                    raw_sources(&sources)
                }
                Err(e) => return Err(e.into()),
            }
        } else if !sources.is_empty() {
            raw_sources(&sources)
        } else {
            return Err(HandlerError::MissingCollaborator("completion or browser"));
        };

        self.cache.lock().insert(key, finding.clone());
        findings.lock().push((query.to_string(), finding));
        Ok(())
    }

    /// Search results plus the text of the top pages; browser errors are logged.
    async fn browse(&self, query: &str, context: &ExecutionContext) -> Vec<(String, String)> {
        let Some(browser) = &context.browser else {
            return Vec::new();
        };
        let results = match browser.search(query, &SearchOptions::default()).await {
            Ok(results) => results,
            Err(e) => {
                warn!(query, error = %e, "Search failed");
                return Vec::new();
            }
        };

        let mut sources: Vec<(String, String)> = Vec::new();
        for result in results.iter().take(context.config.visit_top_results) {
            match browser.visit_url(&result.url, &VisitOptions::default()).await {
                Ok(page) if !page.text_content.trim().is_empty() => {
                    sources.push((result.url.clone(), page.text_content));
                }
                Ok(_) => {}
                Err(e) => debug!(url = %result.url, error = %e, "Skipping unreachable result"),
            }
        }
        for result in &results {
            if !result.snippet.is_empty() && !sources.iter().any(|(url, _)| url == &result.url) {
                sources.push((result.url.clone(), format!("{}: {}", result.title, result.snippet)));
            }
        }
        sources
    }

    async fn synthesize(
        &self,
        research_context: &str,
        findings: &[(String, String)],
        context: &ExecutionContext,
    ) -> Value {
        if context.completion.is_available() {
            let options = CompletionOptions::default().with_system(PromptTemplate::research_system());
            let prompt = PromptTemplate::research_synthesis(research_context, findings);
            match context.completion.complete_structured(&prompt, &options).await {
                Ok(response) => {
                    if let Ok(report) = extract_from_response(&response)
                        && report.is_object()
                        && !is_extraction_failure(&report)
                        && report.get("summary").is_some()
                    {
                        return report;
                    }
                    debug!("Synthesis was not structured; using text fallback");
                }
                Err(e) => warn!(error = %e, "Synthesis failed; using text fallback"),
            }
        }
        text_report(findings)
    }
}

fn raw_sources(sources: &[(String, String)]) -> String {
    sources
        .iter()
        .map(|(url, text)| format!("{}\n{}", url, truncate(text, 1000)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Report built straight from the findings when synthesis is unavailable
fn text_report(findings: &[(String, String)]) -> Value {
    let summary = findings
        .iter()
        .map(|(query, finding)| format!("{}: {}", query, finding))
        .collect::<Vec<_>>()
        .join("\n\n");
    json!({
        "summary": truncate(&summary, FALLBACK_SUMMARY_LEN),
        "keyFindings": findings.iter().map(|(_, f)| truncate(f, 300)).collect::<Vec<_>>(),
        "technicalDetails": [],
        "recommendations": [],
        "structured": false,
    })
}

#[async_trait]
impl ActionHandler for ResearchHandler {
    async fn handle(
        &self,
        action: &Action,
        context: &ExecutionContext,
    ) -> Result<HandlerOutput, HandlerError> {
        let ActionPayload::Research(request) = &action.payload else {
            return Err(HandlerError::invalid_payload(action, "research request"));
        };
        let mut queries: Vec<String> = request
            .queries
            .iter()
            .filter(|q| !q.trim().is_empty())
            .take(context.config.max_research_queries.max(1))
            .cloned()
            .collect();
        if queries.is_empty() {
            queries.push(action.description.clone());
        }

        let findings: Findings = Arc::new(Mutex::new(Vec::new()));
        let session = join_all(
            queries
                .iter()
                .map(|q| self.research_query(q, &request.context, context, findings.clone())),
        );
        let (errors, timed_out) =
            match tokio::time::timeout(context.config.research_timeout, session).await {
                Ok(results) => (
                    results.into_iter().filter_map(Result::err).collect::<Vec<_>>(),
                    false,
                ),
                Err(_) => {
                    warn!(
                        action_id = %action.id,
                        timeout_secs = context.config.research_timeout.as_secs(),
                        "Research timed out; using partial findings"
                    );
                    (Vec::new(), true)
                }
            };

        let gathered = findings.lock().clone();
        if gathered.is_empty() {
            return Err(match errors.into_iter().next() {
                Some(err) => err,
                None if timed_out => HandlerError::Failed(format!(
                    "research timed out after {}s with no findings",
                    context.config.research_timeout.as_secs()
                )),
                None => HandlerError::Failed("research produced no findings".to_string()),
            });
        }

        let report = self.synthesize(&request.context, &gathered, context).await;
        let artifact = context.memory.store_research_results(
            &action.task_id,
            action.step_id.as_ref(),
            &queries,
            &report,
        );
        info!(
            action_id = %action.id,
            queries = queries.len(),
            findings = gathered.len(),
            partial = timed_out,
            "Research complete"
        );

        Ok(HandlerOutput::new(json!({
            "queries": queries,
            "report": report,
            "findings": gathered.len(),
            "partial": timed_out,
        }))
        .with_artifacts(vec![artifact]))
    }
}
