#![forbid(unsafe_code)]

//! In-memory model of a snap package daemon: the entity store, the lazily
//! simulated change engine, the plug/slot connection graph and the request
//! handlers that turn store state into protocol replies.
//!
//! Nothing here knows about HTTP; `snapmock-daemon` owns the transport.

pub mod api;
pub mod change;
pub mod channel;
pub mod connections;
pub mod error;
pub mod handlers;
pub mod model;
pub mod store;

pub use api::{Envelope, ErrorResult, Params, Reply};
pub use change::{Change, ChangeFilter, Task, TaskEffect, TaskSpec, TaskStatus};
pub use channel::ChannelName;
pub use connections::{GraphError, InterfaceAction};
pub use error::{ApiError, ErrorKind};
pub use model::*;
pub use store::{tracked_channel, Release, Settings, Store, StoreLookup};
