//! Task contracts between the batch driver and the providers: what is asked
//! (prompts), how answers are read (parse) and what they become (record).
//! Parsing and validation belong to the caller, never to the orchestrator.

pub mod parse;
pub mod prompt;
pub mod record;

pub use parse::parse_json_response;
pub use record::{
    CombinedAnswer, ExtractedData, FieldValue, Prediction, PredictionOutcome, StockAnalysis,
    validate_extracted_data,
};
