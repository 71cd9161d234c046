//! Huddle session core.
//!
//! Sans-IO state machine for one room participant. Callers feed
//! [`SessionEvent`]s into [`Session::handle`] and execute the returned
//! [`SessionAction`]s; nothing in this crate touches a socket or a clock
//! directly.
//!
//! ## Architecture
//!
//! ```text
//! huddle-core
//!   ├─ Session              (lifecycle, owns everything below)
//!   ├─ LinkRegistry         (open links, keyed by remote identifier)
//!   ├─ RoomStrategy
//!   │    ├─ HostRelayStrategy     (RosterManager + relay)
//!   │    └─ ClientForwardStrategy (replica roster)
//!   ├─ EventLog             (bounded, severity-tagged)
//!   └─ Environment          (time + randomness)
//! ```
//!
//! The host is the single writer of the roster. Clients only replace their
//! roster from snapshots or apply the host's deltas.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod env;
pub mod error;
pub mod event;
pub mod event_log;
pub mod link;
pub mod relay;
pub mod roster;
pub mod session;
pub mod strategy;

pub use config::{EVENT_LOG_CAPACITY, MAX_PARTICIPANTS, REJECTION_GRACE, RoomConfig};
pub use env::{Environment, Timestamp};
pub use error::SessionError;
pub use event::{DirectoryFailure, SessionAction, SessionEvent, SessionState};
pub use event_log::{EventLog, LogEntry, LogLevel};
pub use link::{LinkDirection, LinkInfo, LinkRegistry};
pub use roster::{Admission, Roster, RosterManager};
pub use session::Session;
pub use strategy::{
    ClientForwardStrategy, HostRelayStrategy, RoomContext, RoomEnd, RoomOutcome, RoomStrategy,
};
