//! shard-frontend — keeps a local load balancer in sync with a group.
//!
//! A group's shards publish host ports; the balancer aggregates them
//! behind per-port virtual services. [`Frontend::create_service`]
//! registers one virtual service per distinct (group, container port,
//! protocol) and one backend per shard-port, and
//! [`Frontend::remove_service`] tears the services down. Creation is
//! idempotent against the remote (`409` counts as created); a local
//! id cache merely skips redundant round trips and is never required
//! for correctness.

pub mod error;
mod iface;
pub mod sync;

pub use error::FrontendError;
pub use sync::Frontend;
