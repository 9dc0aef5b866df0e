//! Decoders for Forza Horizon car assets and a host-agnostic car folder
//! importer.
//!
//! The low-level readers live in [`data`] and [`models`]. [`import`] ties them
//! together with the path [`resolve`]r and the [`classify`] heuristics and
//! drives an [`import::ImportSink`] supplied by the host application.

/// Texture channel and tiling classifiers
pub mod classify;
/// Byte stream reader and the bundle container
pub mod data;
/// Error definitions
pub mod error;
/// Sinks that need no 3D host: JSON manifests and PNG extraction
#[cfg(any(feature = "json", feature = "textures"))]
pub mod export;
/// Car folder import orchestration
pub mod import;
/// User-facing import log
pub mod log;
/// Mesh, material and texture file formats
pub mod models;
/// Generic wrapper for values that may or may not match a known variant.
pub mod recognized;
/// Mapping in-game path references to files on disk
pub mod resolve;

pub use error::{DecodeError, ImportError, ResolveError};
pub use import::{ImportOptions, ImportOutcome, ImportSink, ImportSummary, import_car_folder};
