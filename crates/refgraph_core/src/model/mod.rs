//! Domain records for the folder/subject hierarchy and its shortcuts.
//!
//! # Responsibility
//! - Define canonical owned nodes (`Folder`, `Subject`).
//! - Define the non-owning `Shortcut` reference and its derived projection.
//!
//! # Invariants
//! - Identifiers are opaque strings and never reused across records.
//! - Records serialize with camelCase field names to match stored documents.

pub mod item;
pub mod shortcut;
