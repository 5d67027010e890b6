//! Helix Scheduler - async front for the tenant-fair request queue.
//!
//! The scheduling core in `helix-queue` is single-threaded and clock-free.
//! This crate makes it shareable between producer tasks and querier workers:
//!
//! - [`RequestQueue`]: one async mutex around the broker, long-poll dequeue
//!   and waiting-worker accounting.
//! - [`forget_task`]: background sweep that forgets queriers whose forget
//!   delay has elapsed.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod forget;
mod request_queue;

pub use forget::{forget_task, FORGET_CHECK_INTERVAL_MS};
pub use request_queue::RequestQueue;
