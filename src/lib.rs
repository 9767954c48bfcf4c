//! Cluster State Registry
//!
//! Single-leader state registry for a multi-node hosting platform. It keeps a
//! durable inventory of cluster nodes as one JSON file per record, tracks
//! liveness through a heartbeat protocol with an inactivity timeout, and
//! selects nodes for new accounts by free-capacity score, recording each
//! account→node binding durably.
//!
//! Transport, authentication and provisioning live outside this crate; the
//! registry is an in-process value embedded by its callers and is the only
//! writer for its data directory.

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod node;
pub mod placement;
pub mod registry;
pub mod store;

pub use config::{RegistryConfig, DEFAULT_NODE_TIMEOUT};
pub use error::{RegistryError, RegistryResult};
pub use node::{NodeInfo, NodeResources, NodeRole, NodeStatus};
pub use placement::{capacity_score, select_best_node, AccountPlacement};
pub use registry::Registry;
pub use store::{FileStore, Namespace};
