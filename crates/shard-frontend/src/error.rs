//! Frontend error types.

use thiserror::Error;

/// Errors that can occur while synchronizing the load balancer.
#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("invalid load balancer endpoint '{0}' (expected iface://host:port)")]
    Endpoint(String),

    #[error("listing network interfaces: {0}")]
    Interfaces(#[source] std::io::Error),

    #[error("interface '{0}' has no usable address")]
    NoAddress(String),

    #[error("building http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{op}: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The virtual service vanished between creation and backend
    /// registration.
    #[error("virtual service '{0}' does not exist on the balancer")]
    ServiceVanished(String),

    /// A shard was already registered as a backend; duplicate shard
    /// registration is abnormal, unlike service re-creation.
    #[error("backend '{backend}' is already registered on service '{service}'")]
    BackendExists { service: String, backend: String },

    /// Asked to remove a virtual service the balancer does not have.
    #[error("virtual service '{0}' not found on the balancer")]
    ServiceNotFound(String),

    #[error("group '{0}' has no published ports to deregister")]
    NothingToRemove(String),

    #[error("unexpected status {status} from {url}: {body}")]
    Remote {
        url: String,
        status: u16,
        body: String,
    },
}
