//! # Collaborator Bridge Traits
//!
//! Contracts between the download core and the external services it drives.
//!
//! ## Overview
//!
//! The core orchestrates batch downloads but performs no network I/O, no
//! byte-level media work, and no filesystem scanning of its own. Each of
//! those capabilities lives behind a trait defined here and is injected by
//! the host application:
//!
//! - [`FetchService`](fetch::FetchService) - acquires one track end to end
//!   (download, transcode, tag embedding)
//! - [`ExistenceProbe`](probe::ExistenceProbe) - batched check for files
//!   already on disk
//! - [`QueueLedger`](ledger::QueueLedger) - durable per-item queue records
//! - [`CredentialIssuer`](issuer::CredentialIssuer) - issues short-lived
//!   session credentials via a host browser environment
//! - [`MetadataSource`](metadata::MetadataSource) - canonical release
//!   date / track ordinal lookups
//! - [`ManifestWriter`](manifest::ManifestWriter) - playlist manifest output
//! - [`Clock`](time::Clock) - time source for deterministic testing
//!
//! ## Error Handling
//!
//! All traits use [`BridgeError`](error::BridgeError). Implementations should
//! convert their internal errors into it with actionable messages; the core
//! classifies some failures by message text (authorization) or by variant
//! (`NotAvailable` for a missing issuing environment).
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` so handles can be shared across async
//! tasks behind `Arc`.

pub mod error;
pub mod fetch;
pub mod issuer;
pub mod ledger;
pub mod manifest;
pub mod metadata;
pub mod probe;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use fetch::{AudioFormat, FetchReceipt, FetchRequest, FetchService};
pub use issuer::{CredentialIssuer, IssuedCredential};
pub use ledger::{LedgerEntryId, QueueLedger};
pub use manifest::ManifestWriter;
pub use metadata::{CanonicalDetails, MetadataSource};
pub use probe::{ExistenceProbe, ProbeHit, ProbeQuery};
pub use time::{Clock, SystemClock};
