//! Background loops for continuous processing.

pub mod correlation_loop;
pub mod ttl_reaper_loop;
