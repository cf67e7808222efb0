//! Memory persistence and indexing adapters
//!
//! - [`JsonFilePersistence`] mirrors memory records to `<dir>/<collection>/<id>.json`
//! - [`TermFrequencyIndex`] is an in-process TF-IDF index for semantic search

mod json_files;
mod term_index;

pub use json_files::JsonFilePersistence;
pub use term_index::TermFrequencyIndex;
