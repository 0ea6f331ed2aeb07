// Library root
// -----------
// The binary (`main.rs`) parses configuration and hands a `RagSession` to
// the UI. Everything below is usable without a terminal.
//
// Module responsibilities:
// - `api`: blocking HTTP calls to the Gemini File Search endpoints, behind
//   the `FileSearchApi` trait.
// - `models`: request/response wire types.
// - `rag`: session state and the upload/import/query sequence.
// - `poll`: bounded, cancellable waiting for import operations.
// - `documents`: local document discovery and mime types.
// - `config`: clap CLI definition and validated configuration.
// - `error`: the `RagError` taxonomy.
// - `ui`: terminal flows.
pub mod api;
pub mod config;
pub mod documents;
pub mod error;
pub mod models;
pub mod poll;
pub mod rag;
pub mod ui;

pub use api::{FileSearchApi, GeminiClient};
pub use error::{RagError, Result};
pub use rag::{grounding_sources, Grounding, QueryAnswer, RagSession};
