//! TF-IDF index over indexed texts
//!
//! No embedding model is involved: documents and queries are bags of
//! lowercase alphanumeric terms, weighted by term frequency and inverse
//! document frequency, compared by cosine similarity.

use parking_lot::RwLock;
use std::collections::HashMap;
use taskpilot_application::VectorIndex;
use taskpilot_application::ports::vector_index::ScoredId;

/// Terms shorter than this carry no signal
const MIN_TERM_LEN: usize = 2;

#[derive(Default)]
struct Inner {
    /// id → term counts
    documents: HashMap<String, HashMap<String, u32>>,
    /// term → number of documents containing it
    document_frequency: HashMap<String, u32>,
}

#[derive(Default)]
pub struct TermFrequencyIndex {
    inner: RwLock<Inner>,
}

impl TermFrequencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn terms(text: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for term in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
    {
        *counts.entry(term.to_lowercase()).or_insert(0) += 1;
    }
    counts
}

impl Inner {
    fn drop_document(&mut self, id: &str) {
        let Some(previous) = self.documents.remove(id) else {
            return;
        };
        for term in previous.keys() {
            if let Some(df) = self.document_frequency.get_mut(term) {
                *df = df.saturating_sub(1);
                if *df == 0 {
                    self.document_frequency.remove(term);
                }
            }
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.documents.len() as f32;
        let df = self.document_frequency.get(term).copied().unwrap_or(0) as f32;
        ((1.0 + n) / (1.0 + df)).ln() + 1.0
    }

    fn weights(&self, counts: &HashMap<String, u32>) -> HashMap<String, f32> {
        counts
            .iter()
            .map(|(term, &count)| (term.clone(), count as f32 * self.idf(term)))
            .collect()
    }
}

fn norm(weights: &HashMap<String, f32>) -> f32 {
    weights.values().map(|w| w * w).sum::<f32>().sqrt()
}

impl VectorIndex for TermFrequencyIndex {
    fn index(&self, id: &str, text: &str) {
        let counts = terms(text);
        let mut inner = self.inner.write();

        // re-indexing replaces the previous document
        inner.drop_document(id);
        for term in counts.keys() {
            *inner.document_frequency.entry(term.clone()).or_insert(0) += 1;
        }
        inner.documents.insert(id.to_string(), counts);
    }

    fn remove(&self, id: &str) {
        self.inner.write().drop_document(id);
    }

    fn search(&self, query: &str, limit: usize) -> Vec<ScoredId> {
        let inner = self.inner.read();
        let query = inner.weights(&terms(query));
        let query_norm = norm(&query);
        if query_norm == 0.0 || limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<ScoredId> = inner
            .documents
            .iter()
            .filter_map(|(id, counts)| {
                let doc = inner.weights(counts);
                let dot: f32 = query
                    .iter()
                    .filter_map(|(term, qw)| doc.get(term).map(|dw| qw * dw))
                    .sum();
                let denom = query_norm * norm(&doc);
                (dot > 0.0 && denom > 0.0).then(|| ScoredId {
                    id: id.clone(),
                    score: dot / denom,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        scored.truncate(limit);
        scored
    }
}
