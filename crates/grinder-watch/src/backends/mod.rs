//! Native change notification backends.
//!
//! Backends only shorten the wait before the next scan. Discovery itself
//! always goes through a full scan, so a backend that misses events (network
//! mounts, overflowing kernel queues) costs latency, never correctness.

pub mod notify_backend;

pub use notify_backend::NotifyTrigger;
