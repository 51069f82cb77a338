//! Infrastructure layer - Decision sources, caching, events and telemetry

pub mod events;
pub mod experimentation;
pub mod logging;
pub mod observability;
