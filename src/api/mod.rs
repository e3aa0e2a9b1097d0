//! Purpose: Public API boundary: the `Sheets` seam, its HTTP and in-memory backends, and credentials.
//! Exports: Core read/write types plus `SheetsClient`, `MemorySheets`, and token sources.
//! Role: The only path callers (CLI, tests) use to reach the core loops.
//! Invariants: Backends are interchangeable behind `Sheets`.

mod auth;
mod client;
pub mod memory;

pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::read::{AdaptiveReader, ReadOutcome, ReadPath, ReadPlan};
pub use crate::core::retry::{RetryPolicy, with_retry};
pub use crate::core::rows::{Cell, Row};
pub use crate::core::sheets::{SheetProperties, Sheets, ValueInput, find_sheet};
pub use crate::core::write::{ChunkedWriter, WritePlan, WriteReport};
pub use auth::{
    ACCESS_TOKEN_ENV, CREDENTIALS_ENV, CredentialSources, SCOPES, ServiceAccountTokens,
    StaticToken, TokenSource, load_token_source,
};
pub use client::{ClientOptions, DEFAULT_BASE_URL, SheetsClient};
pub use memory::MemorySheets;
