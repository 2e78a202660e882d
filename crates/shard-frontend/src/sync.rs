//! Virtual-service and backend synchronization.
//!
//! Every remote call opens a fresh request and classifies the response
//! through a per-call table mapping recognized status codes to semantic
//! errors; `200` is success, anything unrecognized becomes a generic
//! remote error carrying the response body. Network failures are
//! reported separately from protocol failures.

use std::collections::{BTreeSet, HashSet};
use std::net::IpAddr;

use serde::Serialize;
use tracing::{debug, info};

use shard_runtime::{PortBinding, Protocol, Shard};

use crate::error::FrontendError;
use crate::iface;

const STATUS_CONFLICT: u16 = 409;
const STATUS_NOT_FOUND: u16 = 404;

type Handler = Box<dyn FnOnce() -> Result<(), FrontendError> + Send>;

/// Synchronizes a load balancer's service/backend set with a group's
/// shards.
pub struct Frontend {
    client: reqwest::Client,
    base: String,
    host_ip: IpAddr,
    /// Virtual services created within this process lifetime. A pure
    /// optimization: a cold cache is corrected by the remote's `409`.
    cache: HashSet<String>,
}

impl Frontend {
    /// Connect from an `iface://host:port` endpoint; the interface name
    /// resolves to this machine's concrete address once, up front.
    pub fn new(endpoint: &str) -> Result<Self, FrontendError> {
        let (interface, remote) = endpoint
            .split_once("://")
            .filter(|(iface, remote)| !iface.is_empty() && !remote.is_empty())
            .ok_or_else(|| FrontendError::Endpoint(endpoint.to_string()))?;

        let host_ip = iface::first_address(interface)?;
        Self::with_address(remote, host_ip)
    }

    /// Connect to `host:port` with an already-resolved local address.
    pub fn with_address(remote: &str, host_ip: IpAddr) -> Result<Self, FrontendError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(FrontendError::Client)?;

        Ok(Self {
            client,
            base: format!("http://{}", remote.trim_end_matches('/')),
            host_ip,
            cache: HashSet::new(),
        })
    }

    /// Register one virtual service per distinct (group, container port,
    /// protocol) and one backend per shard-port.
    ///
    /// Ports with a zero host or container side are skipped; they are
    /// unpublished or malformed bindings the balancer cannot route to.
    pub async fn create_service(
        &mut self,
        group: &str,
        shards: &[Shard],
    ) -> Result<(), FrontendError> {
        let mut services = 0usize;
        let mut backends = 0usize;

        for shard in shards {
            for port in &shard.ports {
                if port.host_port == 0 || port.container_port == 0 {
                    continue;
                }

                let vs_id = service_id(group, port.container_port, port.protocol);
                if !self.cache.contains(&vs_id) {
                    self.put_service(&vs_id, port).await?;
                    self.cache.insert(vs_id.clone());
                    services += 1;
                }

                self.put_backend(&vs_id, shard, port).await?;
                backends += 1;
            }
        }

        info!(group, services, backends, "balancer registration complete");
        Ok(())
    }

    /// Remove every virtual service covering the shards' published
    /// ports, deduplicated across shards.
    pub async fn remove_service(
        &mut self,
        group: &str,
        shards: &[Shard],
    ) -> Result<(), FrontendError> {
        let mut ids = BTreeSet::new();
        for shard in shards {
            for port in &shard.ports {
                if port.host_port == 0 || port.container_port == 0 {
                    continue;
                }
                ids.insert(service_id(group, port.container_port, port.protocol));
            }
        }

        if ids.is_empty() {
            return Err(FrontendError::NothingToRemove(group.to_string()));
        }

        for vs_id in &ids {
            self.delete_service(vs_id).await?;
            self.cache.remove(vs_id);
        }

        info!(group, services = ids.len(), "balancer deregistration complete");
        Ok(())
    }

    async fn put_service(
        &self,
        vs_id: &str,
        port: &PortBinding,
    ) -> Result<(), FrontendError> {
        let body = ServiceRequest {
            port: port.container_port,
            protocol: port.protocol,
        };
        let request = self
            .client
            .put(format!("{}/service/{vs_id}", self.base))
            .json(&body);

        let id = vs_id.to_string();
        self.roundtrip(
            "create virtual service",
            request,
            vec![(
                STATUS_CONFLICT,
                Box::new(move || {
                    // Already present remotely; creation is idempotent.
                    debug!(vs_id = %id, "virtual service already exists");
                    Ok(())
                }),
            )],
        )
        .await
    }

    async fn put_backend(
        &self,
        vs_id: &str,
        shard: &Shard,
        port: &PortBinding,
    ) -> Result<(), FrontendError> {
        let host = if is_wildcard(&port.host_ip) {
            // The balancer needs a routable address, not a bind-all.
            self.host_ip.to_string()
        } else {
            port.host_ip.clone()
        };

        let body = BackendRequest {
            host,
            port: port.host_port,
            pulse: match port.protocol {
                // Health probing is not meaningful for connectionless
                // services.
                Protocol::Udp => Some(PulseOptions { kind: "none" }),
                Protocol::Tcp => None,
            },
        };
        let request = self
            .client
            .put(format!("{}/service/{vs_id}/{}", self.base, shard.id))
            .json(&body);

        let service = vs_id.to_string();
        let vanished = service.clone();
        let backend = shard.id.clone();
        self.roundtrip(
            "register backend",
            request,
            vec![
                (
                    STATUS_CONFLICT,
                    Box::new(move || Err(FrontendError::BackendExists { service, backend })),
                ),
                (
                    STATUS_NOT_FOUND,
                    Box::new(move || Err(FrontendError::ServiceVanished(vanished))),
                ),
            ],
        )
        .await
    }

    async fn delete_service(&self, vs_id: &str) -> Result<(), FrontendError> {
        let request = self
            .client
            .delete(format!("{}/service/{vs_id}", self.base));

        let id = vs_id.to_string();
        self.roundtrip(
            "remove virtual service",
            request,
            vec![(
                STATUS_NOT_FOUND,
                Box::new(move || Err(FrontendError::ServiceNotFound(id))),
            )],
        )
        .await
    }

    async fn roundtrip(
        &self,
        op: &'static str,
        request: reqwest::RequestBuilder,
        dispatch: Vec<(u16, Handler)>,
    ) -> Result<(), FrontendError> {
        let response = request
            .send()
            .await
            .map_err(|source| FrontendError::Transport { op, source })?;

        let status = response.status().as_u16();
        if status == 200 {
            return Ok(());
        }

        if let Some((_, handler)) = dispatch.into_iter().find(|(code, _)| *code == status) {
            return handler();
        }

        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(FrontendError::Remote { url, status, body })
    }
}

/// Deterministic virtual-service identifier for a group's published
/// port. Path-unsafe characters in the group name are flattened so the
/// id can live in a URL path segment.
fn service_id(group: &str, container_port: u16, protocol: Protocol) -> String {
    let flat: String = group
        .chars()
        .map(|c| match c {
            '/' | ':' => '-',
            c => c,
        })
        .collect();
    format!("{flat}-{container_port}-{protocol}")
}

fn is_wildcard(host_ip: &str) -> bool {
    matches!(host_ip, "" | "0.0.0.0" | "::" | "*")
}

#[derive(Debug, Serialize)]
struct ServiceRequest {
    port: u16,
    protocol: Protocol,
}

#[derive(Debug, Serialize)]
struct BackendRequest {
    host: String,
    port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pulse: Option<PulseOptions>,
}

#[derive(Debug, Serialize)]
struct PulseOptions {
    #[serde(rename = "type")]
    kind: &'static str,
}
