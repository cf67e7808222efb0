//! Structured-response parsing shared by every caller of the completion
//! service.

pub mod code_blocks;
pub mod extract;

pub use code_blocks::{CodeBlock, extension_for_language, extract_code_blocks};
pub use extract::{
    ExtractionFailure, MAX_FALLBACK_TEXT, extract_as, extract_from_response, extract_json,
    extract_json_or_fallback, is_extraction_failure,
};
