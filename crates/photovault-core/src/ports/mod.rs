//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the backup
//! orchestrator depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IObjectStore`] - Object storage (S3, local directory)
//! - [`IMetadataReader`] - Capture time, camera and GPS from media files

pub mod metadata_reader;
pub mod object_store;

pub use metadata_reader::{IMetadataReader, NoMetadata};
pub use object_store::IObjectStore;
