//! Broadcast slot reservation engine.
//!
//! A fixed booking term is tiled into elementary slots with finite capacity.
//! [`engine::Engine::book`] admits a reservation only if every slot it touches
//! has capacity left, consuming one unit from each and creating the
//! livestream in one durable, all-or-nothing step.

pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;
