//! Airspace Alerter SDK
//!
//! Submit routes, trigger hazard simulations and subscribe to the alert
//! channel of an alerter server.

pub mod client;

pub use alerter_core::{CorrelationEvent, Point, Route, SimulationResponse, SubmitRouteResponse};
pub use client::{AlerterClient, EventStream};
