//! Client, file ingestion and generation variants for the Gemini API.
//!
//! [`GeminiService`] is the entry point used by the relay server. It is
//! built on the [`GenerativeModel`] trait, implemented over HTTP by
//! [`GeminiClient`].
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use relay_gemini::{ClientConfig, GeminiClient, GeminiService, ServiceSettings};
//!
//! # async fn run() -> Result<(), relay_gemini::GeminiError> {
//! let client = GeminiClient::new(ClientConfig::new("api-key", "gemini-2.0-flash"))?;
//! let service = GeminiService::new(Arc::new(client), ServiceSettings::default());
//! println!("{}", service.generate_text("Write a haiku about rust").await?);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod history;
mod ingest;
mod model;
mod schema;
mod service;
mod sse;
mod tools;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiClient};
pub use error::{ErrorKind, GeminiError};
pub use history::{Exchange, assemble_history};
pub use ingest::{IngestPhase, MediaType, PollPolicy, RemoteFileRef, ingest};
pub use model::{GenerativeModel, TextStream};
pub use schema::ResponseSchema;
pub use service::{GeminiService, ServiceSettings};
pub use tools::{LocalTool, Multiply, ToolRegistry};
pub use types::{Content, FileUpload, GenerationConfig, Part, Role, SafetySetting};
