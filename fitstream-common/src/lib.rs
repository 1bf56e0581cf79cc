//! # FitStream Common Library
//!
//! Shared code for the FitStream station components including:
//! - Telemetry event types (StationEvent enum)
//! - EventBus (tokio broadcast wrapper)
//! - Media identity type
//! - Common error types
//! - Timestamp utilities

pub mod error;
pub mod events;
pub mod ident;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, StationEvent};
pub use ident::MediaId;
