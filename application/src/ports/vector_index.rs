//! Optional similarity index backing `MemoryStore::semantic_search`.

/// A document id with its similarity score (higher is closer)
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredId {
    pub id: String,
    pub score: f32,
}

pub trait VectorIndex: Send + Sync {
    fn index(&self, id: &str, text: &str);

    /// Forget a document; unknown ids are ignored.
    fn remove(&self, id: &str);

    /// Best matches first, at most `limit`
    fn search(&self, query: &str, limit: usize) -> Vec<ScoredId>;
}
