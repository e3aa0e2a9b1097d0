//! Purpose: Library crate behind the `sheetrelay` CLI and its tests.
//! Exports: `api` (Sheets seam, HTTP client, credentials), `core` (retry, adaptive read, chunked write),
//! `job` (export, replicate), `config`, `notice`.
//! Role: Internal library backing the binary; not yet a stable public SDK.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
//! Invariants: Nothing below `job` talks to a concrete backend; everything goes through `Sheets`.
pub mod api;
pub mod config;
pub mod core;
pub mod job;
pub mod notice;
