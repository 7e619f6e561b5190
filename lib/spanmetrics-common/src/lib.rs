//! Shared building blocks for the span metrics workspace.
#![deny(missing_docs)]

pub mod cache;
pub mod collections;
pub mod error;
pub mod hash;
pub mod task;
pub mod time;

#[doc(hidden)]
pub use anyhow::anyhow as _anyhow;
