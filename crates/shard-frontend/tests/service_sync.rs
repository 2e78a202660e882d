//! Synchronizer tests against an in-process balancer.
//!
//! A small axum server records every service/backend call and answers
//! with a scriptable status code, which is enough to exercise the cache,
//! the conflict-absorption rule, and the hard-error paths end to end.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::put;
use axum::{Json, Router};
use serde_json::Value;

use shard_frontend::{Frontend, FrontendError};
use shard_runtime::{PortBinding, Protocol, Shard};
use shard_topology::Unit;

#[derive(Default)]
struct LbState {
    service_puts: Mutex<Vec<(String, Value)>>,
    backend_puts: Mutex<Vec<(String, String, Value)>>,
    deletes: Mutex<Vec<String>>,
    // Zero means "answer 200".
    service_status: AtomicU16,
    backend_status: AtomicU16,
    delete_status: AtomicU16,
}

impl LbState {
    fn status(cell: &AtomicU16) -> StatusCode {
        match cell.load(Ordering::Relaxed) {
            0 => StatusCode::OK,
            code => StatusCode::from_u16(code).unwrap(),
        }
    }
}

async fn put_service(
    State(state): State<Arc<LbState>>,
    Path(vs): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    state.service_puts.lock().unwrap().push((vs, body));
    LbState::status(&state.service_status)
}

async fn delete_service(
    State(state): State<Arc<LbState>>,
    Path(vs): Path<String>,
) -> StatusCode {
    state.deletes.lock().unwrap().push(vs);
    LbState::status(&state.delete_status)
}

async fn put_backend(
    State(state): State<Arc<LbState>>,
    Path((vs, rs)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    state.backend_puts.lock().unwrap().push((vs, rs, body));
    LbState::status(&state.backend_status)
}

async fn serve() -> (Arc<LbState>, SocketAddr) {
    let state = Arc::new(LbState::default());
    let app = Router::new()
        .route("/service/{vs}", put(put_service).delete(delete_service))
        .route("/service/{vs}/{rs}", put(put_backend))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (state, addr)
}

fn frontend(addr: SocketAddr) -> Frontend {
    Frontend::with_address(
        &addr.to_string(),
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)),
    )
    .unwrap()
}

fn shard(id: &str, ports: Vec<PortBinding>) -> Shard {
    Shard {
        name: id.to_string(),
        id: id.to_string(),
        status: "Up 1 second".to_string(),
        unit: Unit::from_label_parts("0-1", "2"),
        ports,
    }
}

fn port(host_port: u16, container_port: u16, protocol: Protocol) -> PortBinding {
    PortBinding {
        host_ip: "0.0.0.0".to_string(),
        host_port,
        container_port,
        protocol,
    }
}

#[tokio::test]
async fn create_registers_one_service_and_a_backend_per_shard() {
    let (state, addr) = serve().await;
    let mut front = frontend(addr);

    let shards = vec![
        shard("s1", vec![port(32001, 8080, Protocol::Tcp)]),
        shard("s2", vec![port(32002, 8080, Protocol::Tcp)]),
    ];
    front.create_service("web", &shards).await.unwrap();

    let services = state.service_puts.lock().unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].0, "web-8080-tcp");
    assert_eq!(services[0].1, serde_json::json!({"port": 8080, "protocol": "tcp"}));

    let backends = state.backend_puts.lock().unwrap();
    assert_eq!(backends.len(), 2);
    assert_eq!(backends[0].1, "s1");
    assert_eq!(backends[0].2["host"], "192.0.2.7"); // wildcard rewritten
    assert_eq!(backends[0].2["port"], 32001);
    assert_eq!(backends[1].1, "s2");
}

#[tokio::test]
async fn second_create_hits_the_cache_but_registers_backends_again() {
    let (state, addr) = serve().await;
    let mut front = frontend(addr);

    let shards = vec![shard("s1", vec![port(32001, 8080, Protocol::Tcp)])];
    front.create_service("web", &shards).await.unwrap();
    front.create_service("web", &shards).await.unwrap();

    // One service creation, two backend registrations.
    assert_eq!(state.service_puts.lock().unwrap().len(), 1);
    assert_eq!(state.backend_puts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn service_conflict_is_absorbed_with_a_cold_cache() {
    let (state, addr) = serve().await;
    state.service_status.store(409, Ordering::Relaxed);

    // Fresh frontend simulating a restart after the service was created.
    let mut front = frontend(addr);
    let shards = vec![shard("s1", vec![port(32001, 8080, Protocol::Tcp)])];
    front.create_service("web", &shards).await.unwrap();

    assert_eq!(state.service_puts.lock().unwrap().len(), 1);
    assert_eq!(state.backend_puts.lock().unwrap().len(), 1);

    // The conflicted id is now cached; no second creation attempt.
    front.create_service("web", &shards).await.unwrap();
    assert_eq!(state.service_puts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn backend_conflict_is_a_hard_error() {
    let (state, addr) = serve().await;
    state.backend_status.store(409, Ordering::Relaxed);

    let mut front = frontend(addr);
    let shards = vec![shard("s1", vec![port(32001, 8080, Protocol::Tcp)])];

    match front.create_service("web", &shards).await {
        Err(FrontendError::BackendExists { service, backend }) => {
            assert_eq!(service, "web-8080-tcp");
            assert_eq!(backend, "s1");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn vanished_service_is_a_hard_error() {
    let (state, addr) = serve().await;
    state.backend_status.store(404, Ordering::Relaxed);

    let mut front = frontend(addr);
    let shards = vec![shard("s1", vec![port(32001, 8080, Protocol::Tcp)])];

    assert!(matches!(
        front.create_service("web", &shards).await,
        Err(FrontendError::ServiceVanished(id)) if id == "web-8080-tcp"
    ));
}

#[tokio::test]
async fn udp_backends_disable_health_probing() {
    let (state, addr) = serve().await;
    let mut front = frontend(addr);

    let shards = vec![shard(
        "s1",
        vec![
            port(32001, 8080, Protocol::Tcp),
            port(32053, 53, Protocol::Udp),
        ],
    )];
    front.create_service("dns", &shards).await.unwrap();

    let backends = state.backend_puts.lock().unwrap();
    assert_eq!(backends.len(), 2);

    let tcp = backends.iter().find(|b| b.0 == "dns-8080-tcp").unwrap();
    assert!(tcp.2.get("pulse").is_none());

    let udp = backends.iter().find(|b| b.0 == "dns-53-udp").unwrap();
    assert_eq!(udp.2["pulse"], serde_json::json!({"type": "none"}));
}

#[tokio::test]
async fn unpublished_ports_are_skipped() {
    let (state, addr) = serve().await;
    let mut front = frontend(addr);

    // Exposed but never published: no host port.
    let shards = vec![shard("s1", vec![port(0, 9000, Protocol::Tcp)])];
    front.create_service("web", &shards).await.unwrap();

    assert!(state.service_puts.lock().unwrap().is_empty());
    assert!(state.backend_puts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn concrete_host_addresses_are_passed_through() {
    let (state, addr) = serve().await;
    let mut front = frontend(addr);

    let mut binding = port(32001, 8080, Protocol::Tcp);
    binding.host_ip = "10.1.2.3".to_string();
    let shards = vec![shard("s1", vec![binding])];
    front.create_service("web", &shards).await.unwrap();

    let backends = state.backend_puts.lock().unwrap();
    assert_eq!(backends[0].2["host"], "10.1.2.3");
}

#[tokio::test]
async fn remove_deletes_each_distinct_service_once() {
    let (state, addr) = serve().await;
    let mut front = frontend(addr);

    let shards = vec![
        shard(
            "s1",
            vec![
                port(32001, 80, Protocol::Tcp),
                port(32053, 53, Protocol::Udp),
            ],
        ),
        shard(
            "s2",
            vec![
                port(32002, 80, Protocol::Tcp),
                port(32054, 53, Protocol::Udp),
            ],
        ),
    ];
    front.remove_service("edge", &shards).await.unwrap();

    let mut deletes = state.deletes.lock().unwrap().clone();
    deletes.sort();
    assert_eq!(deletes, vec!["edge-53-udp", "edge-80-tcp"]);
}

#[tokio::test]
async fn remove_missing_service_is_a_hard_error() {
    let (state, addr) = serve().await;
    state.delete_status.store(404, Ordering::Relaxed);

    let mut front = frontend(addr);
    let shards = vec![shard("s1", vec![port(32001, 80, Protocol::Tcp)])];

    assert!(matches!(
        front.remove_service("web", &shards).await,
        Err(FrontendError::ServiceNotFound(id)) if id == "web-80-tcp"
    ));
}

#[tokio::test]
async fn remove_with_nothing_published_fails() {
    let (_state, addr) = serve().await;
    let mut front = frontend(addr);

    let shards = vec![shard("s1", vec![])];
    assert!(matches!(
        front.remove_service("web", &shards).await,
        Err(FrontendError::NothingToRemove(group)) if group == "web"
    ));
}

#[tokio::test]
async fn unknown_status_surfaces_the_response_body() {
    let (state, addr) = serve().await;
    state.service_status.store(500, Ordering::Relaxed);

    let mut front = frontend(addr);
    let shards = vec![shard("s1", vec![port(32001, 8080, Protocol::Tcp)])];

    match front.create_service("web", &shards).await {
        Err(FrontendError::Remote { status, url, .. }) => {
            assert_eq!(status, 500);
            assert!(url.contains("/service/web-8080-tcp"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn transport_failures_are_reported_distinctly() {
    // Nothing is listening here.
    let mut front = Frontend::with_address(
        "127.0.0.1:1",
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7)),
    )
    .unwrap();
    let shards = vec![shard("s1", vec![port(32001, 8080, Protocol::Tcp)])];

    assert!(matches!(
        front.create_service("web", &shards).await,
        Err(FrontendError::Transport { .. })
    ));
}
