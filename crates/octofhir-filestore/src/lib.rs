//! # octofhir-filestore
//!
//! File-store abstraction for OctoFHIR bulk data tooling.
//!
//! This crate defines the contract that download destinations must implement
//! and ships a local-filesystem implementation. Remote object stores can be
//! plugged in by implementing the same traits in a separate crate.
//!
//! ## Overview
//!
//! The main traits are:
//!
//! - [`FileStore`] - resolves a location string into a [`FileHandle`]
//! - [`FileHandle`] - a single addressable file or directory supporting
//!   existence checks, directory creation, child resolution, and streaming
//!   writes
//!
//! ## Example
//!
//! ```ignore
//! use octofhir_filestore::{FileStore, LocalFileStore};
//!
//! let store = LocalFileStore::new();
//! let dir = store.handle("/tmp/export-0001")?;
//! dir.mkdirs().await?;
//! let file = dir.child("Patient.0000.ndjson");
//! let written = file.write_all(&mut reader).await?;
//! ```

mod error;
mod local;
mod traits;

pub use error::StoreError;
pub use local::{LocalFileHandle, LocalFileStore};
pub use traits::{FileHandle, FileStore};
