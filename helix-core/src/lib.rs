//! Helix Core - Strongly-typed identifiers and limits for the query scheduler.
//!
//! This crate provides the vocabulary shared by the scheduling core and the
//! concurrency layer: tenant and querier IDs, queue paths, the local-queue
//! position sentinel, and explicit limits on caller-supplied input.
//!
//! A [`QueuePath`] names a node in the scheduler's tree queue below the
//! root: the tenant first, then any routing dimensions. [`Position`] is the
//! rotation cursor of a node, either its own local queue or a child index.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod types;

pub use error::{Error, Result};
pub use limits::Limits;
pub use types::{Position, QuerierId, QueuePath, TenantId};
