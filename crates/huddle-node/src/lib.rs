//! Huddle node runtime.
//!
//! This crate runs a [`huddle_core::Session`] for real using:
//! - Tokio for async runtime and per-link IO tasks
//! - A pluggable [`Directory`] for identifiers and links
//! - System time and OS randomness
//!
//! ## Architecture
//!
//! ```text
//! huddle-node
//!   ├─ SystemEnv          (production Environment impl)
//!   ├─ Directory          (identifier assignment + link establishment)
//!   │    └─ TcpDirectory  (identifier = listen address)
//!   ├─ Node               (single-threaded reactor around the session)
//!   └─ LinkHandle         (reader/writer tasks per link)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod directory;
mod error;
mod executor;
pub mod framing;
mod link;
mod node;
mod system_env;
mod tcp;

pub use config::{Backoff, NodeConfig};
pub use directory::Directory;
pub use error::{DirectoryError, LinkError, NodeError};
pub use executor::BroadcastPolicy;
pub use link::{LinkHandle, LinkId, LinkInput};
pub use node::{Node, NodeCommand, NodeEvent, NodeHandle};
pub use system_env::SystemEnv;
pub use tcp::{HANDSHAKE_TIMEOUT, TcpDirectory};
