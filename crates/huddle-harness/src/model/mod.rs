//! Reference model for model-based testing.
//!
//! The model is a simplified room that captures WHAT participants should
//! observe once every message has been delivered, without links, frames or
//! timers. It is the oracle the real sessions are checked against.
//!
//! # Design Principles
//!
//! - Simplicity: the model should be obviously correct
//! - Quiescent view: only state after all deliveries is modelled
//! - Deterministic: same operations, same state

pub mod operation;
mod room;

pub use operation::{ClientId, Operation, OperationError, OperationResult, SmallMessage};
pub use room::{ModelPhase, ModelRoom, ObservableState};
