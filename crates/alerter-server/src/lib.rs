//! Shared library surface for the alerter server and its tests.

pub mod api;
pub mod backoff;
pub mod cache;
pub mod change_tap;
pub mod clock;
pub mod config;
pub mod correlation;
pub mod error;
pub mod generator;
pub mod loops;
pub mod publisher;
pub mod state;
pub mod store;
