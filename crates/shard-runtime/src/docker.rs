//! Docker Engine API client.
//!
//! Implements [`Engine`] against the engine's REST API with a fresh
//! http1 handshake per request, over either the standard unix socket or
//! a TCP endpoint taken from `DOCKER_HOST`. Only the handful of
//! endpoints orchestration needs are spoken here; everything else about
//! the engine stays behind the [`Engine`] trait.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use tokio::net::{TcpStream, UnixStream};
use tracing::debug;

use crate::engine::{Engine, EngineContainer, InstanceState, LabelSelector};
use crate::error::EngineError;
use crate::types::{LaunchConfig, PortBinding, Protocol};

const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";
const DEFAULT_TCP_PORT: u16 = 2375;

#[derive(Debug, Clone)]
enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

/// Client for the Docker Engine REST API.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    endpoint: Endpoint,
}

impl DockerEngine {
    /// Connect settings from `DOCKER_HOST`, defaulting to the standard
    /// unix socket.
    pub fn from_env() -> Result<Self, EngineError> {
        match std::env::var("DOCKER_HOST") {
            Ok(uri) if !uri.is_empty() => Self::new(&uri),
            _ => Self::new(DEFAULT_SOCKET),
        }
    }

    /// Build a client for a `unix://` path or `tcp://`/`http://`
    /// host\[:port\] endpoint.
    pub fn new(uri: &str) -> Result<Self, EngineError> {
        if let Some(path) = uri.strip_prefix("unix://") {
            return Ok(Self {
                endpoint: Endpoint::Unix(PathBuf::from(path)),
            });
        }

        let authority = uri
            .strip_prefix("tcp://")
            .or_else(|| uri.strip_prefix("http://"));

        match authority {
            Some(rest) => {
                let host = rest.trim_end_matches('/');
                if host.is_empty() {
                    return Err(EngineError::Endpoint(uri.to_string()));
                }
                let authority = if host.contains(':') {
                    host.to_string()
                } else {
                    format!("{host}:{DEFAULT_TCP_PORT}")
                };
                Ok(Self {
                    endpoint: Endpoint::Tcp(authority),
                })
            }
            None => Err(EngineError::Endpoint(uri.to_string())),
        }
    }

    async fn roundtrip(
        &self,
        op: &'static str,
        method: http::Method,
        path_and_query: String,
        body: Option<Vec<u8>>,
    ) -> Result<(u16, Bytes), EngineError> {
        let host = match &self.endpoint {
            Endpoint::Unix(_) => "localhost".to_string(),
            Endpoint::Tcp(authority) => authority.clone(),
        };

        let mut builder = http::Request::builder()
            .method(method)
            .uri(path_and_query.as_str())
            .header(http::header::HOST, host);
        if body.is_some() {
            builder = builder.header(http::header::CONTENT_TYPE, "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| transport(op, e))?;

        debug!(%path_and_query, op, "engine request");

        match &self.endpoint {
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|e| transport(op, e))?;
                send(op, stream, request).await
            }
            Endpoint::Tcp(authority) => {
                let stream = TcpStream::connect(authority.as_str())
                    .await
                    .map_err(|e| transport(op, e))?;
                send(op, stream, request).await
            }
        }
    }

    async fn expect(
        &self,
        op: &'static str,
        method: http::Method,
        path_and_query: String,
        body: Option<Vec<u8>>,
        ok: &[u16],
    ) -> Result<Bytes, EngineError> {
        let (status, body) = self.roundtrip(op, method, path_and_query, body).await?;
        if ok.contains(&status) {
            return Ok(body);
        }
        Err(EngineError::Api {
            op,
            status,
            message: api_message(&body),
        })
    }
}

async fn send<S>(
    op: &'static str,
    stream: S,
    request: http::Request<Full<Bytes>>,
) -> Result<(u16, Bytes), EngineError>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let (mut sender, conn) = http1::handshake(io).await.map_err(|e| transport(op, e))?;

    // Drive the connection for the lifetime of this one request.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let response = sender
        .send_request(request)
        .await
        .map_err(|e| transport(op, e))?;
    let status = response.status().as_u16();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| transport(op, e))?
        .to_bytes();

    Ok((status, body))
}

fn transport<E>(op: &'static str, source: E) -> EngineError
where
    E: std::error::Error + Send + Sync + 'static,
{
    EngineError::Transport {
        op,
        source: Box::new(source),
    }
}

fn api_message(body: &[u8]) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(e) => e.message,
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    }
}

/// Percent-encode a query value (RFC 3986 unreserved set passes through).
fn query_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

// Wire shapes. Field names follow the engine API document.

#[derive(Debug, Serialize)]
struct Empty {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateRequest {
    image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cmd: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    entrypoint: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    env: Vec<String>,
    labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    user: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    working_dir: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    exposed_ports: BTreeMap<String, Empty>,
    host_config: HostConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct HostConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    cpuset_cpus: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    port_bindings: BTreeMap<String, Vec<HostBinding>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct HostBinding {
    #[serde(skip_serializing_if = "String::is_empty")]
    host_ip: String,
    host_port: String,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Labels", default)]
    labels: BTreeMap<String, String>,
    #[serde(rename = "Ports", default)]
    ports: Vec<PortSummary>,
}

#[derive(Debug, Deserialize)]
struct PortSummary {
    #[serde(rename = "IP", default)]
    ip: String,
    #[serde(rename = "PrivatePort")]
    private_port: u16,
    #[serde(rename = "PublicPort", default)]
    public_port: u16,
    #[serde(rename = "Type")]
    proto: String,
}

#[derive(Debug, Deserialize)]
struct InspectResponse {
    #[serde(rename = "State")]
    state: StateBlock,
}

#[derive(Debug, Deserialize)]
struct StateBlock {
    #[serde(rename = "Running")]
    running: bool,
}

fn create_request(config: &LaunchConfig) -> CreateRequest {
    let mut exposed_ports = BTreeMap::new();
    let mut port_bindings = BTreeMap::new();

    for spec in &config.ports {
        let key = format!("{}/{}", spec.container_port, spec.protocol);
        exposed_ports.insert(key.clone(), Empty {});
        port_bindings.insert(
            key,
            vec![HostBinding {
                host_ip: String::new(),
                host_port: spec.host_port.map(|p| p.to_string()).unwrap_or_default(),
            }],
        );
    }

    CreateRequest {
        image: config.image.clone(),
        cmd: config.cmd.clone(),
        entrypoint: config.entrypoint.clone(),
        env: config.env.clone(),
        labels: config.labels.clone(),
        user: config.user.clone(),
        working_dir: config.working_dir.clone(),
        exposed_ports,
        host_config: HostConfig {
            cpuset_cpus: config.cpuset_cpus.clone(),
            port_bindings,
        },
    }
}

fn container_from(summary: ContainerSummary) -> EngineContainer {
    let name = summary
        .names
        .first()
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| summary.id.chars().take(12).collect());

    let ports = summary
        .ports
        .into_iter()
        .filter_map(|p| {
            let protocol: Protocol = p.proto.parse().ok()?;
            Some(PortBinding {
                host_ip: p.ip,
                host_port: p.public_port,
                container_port: p.private_port,
                protocol,
            })
        })
        .collect();

    EngineContainer {
        id: summary.id,
        name,
        image: summary.image,
        status: summary.status,
        labels: summary.labels,
        ports,
    }
}

impl Engine for DockerEngine {
    async fn create(&self, config: &LaunchConfig) -> Result<String, EngineError> {
        let op = "create container";
        let body = serde_json::to_vec(&create_request(config))
            .map_err(|source| EngineError::Decode { op, source })?;

        let response = self
            .expect(
                op,
                http::Method::POST,
                "/containers/create".to_string(),
                Some(body),
                &[201],
            )
            .await?;

        let created: CreateResponse = serde_json::from_slice(&response)
            .map_err(|source| EngineError::Decode { op, source })?;
        Ok(created.id)
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        // 304 means the instance is already running, which is fine.
        self.expect(
            "start container",
            http::Method::POST,
            format!("/containers/{id}/start"),
            None,
            &[204, 304],
        )
        .await?;
        Ok(())
    }

    async fn list(
        &self,
        selector: LabelSelector<'_>,
    ) -> Result<Vec<EngineContainer>, EngineError> {
        let op = "list containers";
        let expr = match selector {
            LabelSelector::Key(key) => key.to_string(),
            LabelSelector::KeyValue(key, value) => format!("{key}={value}"),
        };
        let filters = serde_json::json!({ "label": [expr] }).to_string();
        let path = format!(
            "/containers/json?all=true&filters={}",
            query_escape(&filters)
        );

        let body = self.expect(op, http::Method::GET, path, None, &[200]).await?;
        let summaries: Vec<ContainerSummary> = serde_json::from_slice(&body)
            .map_err(|source| EngineError::Decode { op, source })?;

        Ok(summaries.into_iter().map(container_from).collect())
    }

    async fn inspect(&self, id: &str) -> Result<InstanceState, EngineError> {
        let op = "inspect container";
        let body = self
            .expect(op, http::Method::GET, format!("/containers/{id}/json"), None, &[200])
            .await?;
        let inspected: InspectResponse = serde_json::from_slice(&body)
            .map_err(|source| EngineError::Decode { op, source })?;

        Ok(InstanceState {
            running: inspected.state.running,
        })
    }

    async fn stop(&self, id: &str, timeout: Duration) -> Result<(), EngineError> {
        // 304 means the instance was already stopped.
        self.expect(
            "stop container",
            http::Method::POST,
            format!("/containers/{id}/stop?t={}", timeout.as_secs()),
            None,
            &[204, 304],
        )
        .await?;
        Ok(())
    }

    async fn remove(&self, id: &str, remove_volumes: bool) -> Result<(), EngineError> {
        self.expect(
            "remove container",
            http::Method::DELETE,
            format!("/containers/{id}?v={remove_volumes}"),
            None,
            &[204],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PortSpec;

    #[test]
    fn endpoint_unix() {
        let engine = DockerEngine::new("unix:///var/run/docker.sock").unwrap();
        assert!(matches!(engine.endpoint, Endpoint::Unix(ref p)
            if p == std::path::Path::new("/var/run/docker.sock")));
    }

    #[test]
    fn endpoint_tcp_with_port() {
        let engine = DockerEngine::new("tcp://10.0.0.5:2376").unwrap();
        assert!(matches!(engine.endpoint, Endpoint::Tcp(ref a) if a == "10.0.0.5:2376"));
    }

    #[test]
    fn endpoint_tcp_default_port() {
        let engine = DockerEngine::new("http://dockerd").unwrap();
        assert!(matches!(engine.endpoint, Endpoint::Tcp(ref a) if a == "dockerd:2375"));
    }

    #[test]
    fn endpoint_rejects_unknown_scheme() {
        assert!(matches!(
            DockerEngine::new("ssh://host"),
            Err(EngineError::Endpoint(_))
        ));
        assert!(matches!(
            DockerEngine::new("tcp://"),
            Err(EngineError::Endpoint(_))
        ));
    }

    #[test]
    fn create_request_wire_shape() {
        let mut config = LaunchConfig {
            image: "nginx:latest".to_string(),
            env: vec!["SHARD_WEIGHT=2".to_string()],
            cpuset_cpus: "0-1".to_string(),
            ports: vec![PortSpec {
                host_port: Some(8080),
                container_port: 80,
                protocol: Protocol::Tcp,
            }],
            ..LaunchConfig::default()
        };
        config
            .labels
            .insert("shardgrid.group".to_string(), "web".to_string());

        let value = serde_json::to_value(create_request(&config)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "Image": "nginx:latest",
                "Env": ["SHARD_WEIGHT=2"],
                "Labels": {"shardgrid.group": "web"},
                "ExposedPorts": {"80/tcp": {}},
                "HostConfig": {
                    "CpusetCpus": "0-1",
                    "PortBindings": {"80/tcp": [{"HostPort": "8080"}]}
                }
            })
        );
    }

    #[test]
    fn create_request_omits_empty_fields() {
        let config = LaunchConfig {
            image: "redis".to_string(),
            ..LaunchConfig::default()
        };
        let value = serde_json::to_value(create_request(&config)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "Image": "redis",
                "Labels": {},
                "HostConfig": {}
            })
        );
    }

    #[test]
    fn container_summary_decodes() {
        let body = r#"[{
            "Id": "8dfafdbc3a40",
            "Names": ["/web-1"],
            "Image": "nginx:latest",
            "Status": "Up 2 minutes",
            "Labels": {"shardgrid.group": "web", "shardgrid.unit": "0-1"},
            "Ports": [
                {"IP": "0.0.0.0", "PrivatePort": 80, "PublicPort": 8080, "Type": "tcp"},
                {"PrivatePort": 9000, "Type": "tcp"}
            ]
        }]"#;

        let summaries: Vec<ContainerSummary> = serde_json::from_str(body).unwrap();
        let container = container_from(summaries.into_iter().next().unwrap());

        assert_eq!(container.name, "web-1");
        assert_eq!(container.labels["shardgrid.group"], "web");
        assert_eq!(container.ports.len(), 2);
        assert_eq!(container.ports[0].host_port, 8080);
        assert_eq!(container.ports[1].host_port, 0); // exposed, not published
    }

    #[test]
    fn inspect_response_decodes() {
        let body = r#"{"Id": "abc", "State": {"Running": true, "Paused": false}}"#;
        let inspected: InspectResponse = serde_json::from_str(body).unwrap();
        assert!(inspected.state.running);
    }

    #[test]
    fn api_message_prefers_engine_error_body() {
        assert_eq!(
            api_message(br#"{"message": "No such container: abc"}"#),
            "No such container: abc"
        );
        assert_eq!(api_message(b"plain failure\n"), "plain failure");
    }

    #[test]
    fn query_escape_covers_filter_json() {
        assert_eq!(
            query_escape(r#"{"label":["shardgrid.group"]}"#),
            "%7B%22label%22%3A%5B%22shardgrid.group%22%5D%7D"
        );
    }
}
