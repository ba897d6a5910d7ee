//! Use-case services over the content store.
//!
//! # Responsibility
//! - Turn store reads and writes into hierarchy-level operations.
//! - Keep permission, cycle, and share-boundary gates in front of every write.

pub mod feed;
pub mod move_service;
pub mod promotion;
pub mod shortcut_service;
