//! Deterministic simulation harness for Huddle rooms.
//!
//! Two levels of simulation:
//!
//! - [`Mesh`] runs bare [`huddle_core::Session`]s against each other in one
//!   thread, with per-link FIFO delivery and seeded interleaving across
//!   links. It is the fast path for room invariants.
//! - [`SimDirectory`] and [`SimEnv`] run complete [`huddle_node::Node`]s
//!   inside turmoil hosts, over simulated TCP with latency and loss.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference room. Operations are applied to
//! both the model and a [`Mesh`], and their observable states are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod mesh;
pub mod model;
pub mod sim_directory;
pub mod sim_env;

pub use mesh::{MAX_STEPS, Mesh, MeshEnv, Sent, SimInstant};
pub use model::{
    ClientId, ModelPhase, ModelRoom, ObservableState, Operation, OperationError, OperationResult,
    SmallMessage,
};
pub use sim_directory::{Outage, SimDirectory};
pub use sim_env::SimEnv;
