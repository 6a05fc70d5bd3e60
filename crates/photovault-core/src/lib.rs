//! PhotoVault Core - Domain types and ports
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `MediaEntry`, `Group`, `ArchiveUnit`, `UploadRecord`, `Watermark`
//! - **Port definitions** - Traits for adapters: `IObjectStore`, `IMetadataReader`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module contains pure value types with no I/O.
//! Ports define trait interfaces that adapter crates implement; the backup
//! orchestrator in `photovault-backup` only ever talks to storage and media
//! metadata through them.

pub mod config;
pub mod domain;
pub mod ports;
