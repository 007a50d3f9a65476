//! Shared helpers for socket-level tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{Buf, Bytes};
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use portico_config::PorticoConfig;
use portico_rpc::{encode_message, HelloReply, HelloRequest};
use portico_server::{Orchestrator, Services, ShutdownReport, ShutdownSignal, Started};
use portico_telemetry::Telemetry;
use prost::Message;
use serde_json::Value;
use tokio::task::JoinHandle;

pub type TestClient = Client<HttpConnector, Full<Bytes>>;

/// HTTP/1.1 client.
pub fn http1() -> TestClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// HTTP/2 prior-knowledge client.
pub fn http2() -> TestClient {
    Client::builder(TokioExecutor::new())
        .http2_only(true)
        .build_http()
}

/// Loopback configuration with the given ports and budget.
pub fn config(http_port: u16, grpc_port: u16, shutdown_secs: u64) -> PorticoConfig {
    let mut config = PorticoConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.http_port = http_port;
    config.server.grpc_port = grpc_port;
    config.server.shutdown_timeout_secs = shutdown_secs;
    config
}

/// A port that was free a moment ago.
pub async fn free_port() -> u16 {
    let socket = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    socket.local_addr().unwrap().port()
}

/// A running server and the means to stop it.
pub struct Running {
    pub addrs: Vec<(&'static str, SocketAddr)>,
    pub cancel: ShutdownSignal,
    pub task: JoinHandle<portico_server::ServerResult<ShutdownReport>>,
}

impl Running {
    pub fn addr(&self, name: &str) -> SocketAddr {
        self.addrs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, addr)| *addr)
            .unwrap()
    }

    /// Fires cancellation and waits for the report.
    pub async fn stop(self) -> ShutdownReport {
        self.cancel.trigger();
        self.task.await.unwrap().unwrap()
    }
}

/// Starts the bundled services.
pub async fn start(config: PorticoConfig) -> Running {
    let services = Services::from_config(&config);
    start_with(config, services).await
}

/// Starts custom services.
pub async fn start_with(config: PorticoConfig, services: Services) -> Running {
    start_with_telemetry(config, services, Telemetry::disabled()).await
}

/// Starts custom services that drain `telemetry` on shutdown.
pub async fn start_with_telemetry(
    config: PorticoConfig,
    services: Services,
    telemetry: Telemetry,
) -> Running {
    let started: Started = Orchestrator::new(Arc::new(config), services, telemetry)
        .start()
        .await
        .unwrap();
    let addrs = started.local_addrs();
    let cancel = ShutdownSignal::new();
    let task = tokio::spawn(started.run(cancel.clone()));
    Running {
        addrs,
        cancel,
        task,
    }
}

/// `GET {path}` and the decoded envelope.
pub async fn get_json(
    client: &TestClient,
    addr: SocketAddr,
    path: &str,
    headers: &[(&str, &str)],
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder()
        .method(Method::GET)
        .uri(format!("http://{addr}{path}"));
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = client
        .request(builder.body(Full::new(Bytes::new())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, serde_json::from_slice(&body).unwrap())
}

fn hello(name: &str) -> Bytes {
    HelloRequest {
        name: name.to_string(),
    }
    .encode_to_vec()
    .into()
}

/// Native unary call to `helloworld.Greeter/SayHello`.
///
/// Returns the reply and the `grpc-status` trailer.
pub async fn say_hello_native(
    client: &TestClient,
    addr: SocketAddr,
    name: &str,
) -> (Option<HelloReply>, String) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("http://{addr}/helloworld.Greeter/SayHello"))
        .header("content-type", "application/grpc")
        .header("te", "trailers")
        .body(Full::new(encode_message(&hello(name))))
        .unwrap();
    let response = client.request(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let head_status = response
        .headers()
        .get("grpc-status")
        .map(|v| v.to_str().unwrap().to_string());
    let collected = response.into_body().collect().await.unwrap();
    let status = collected
        .trailers()
        .and_then(|t| t.get("grpc-status"))
        .map(|v| v.to_str().unwrap().to_string())
        .or(head_status)
        .unwrap();
    let mut body = collected.to_bytes();
    let reply = if body.is_empty() {
        None
    } else {
        Some(decode_frame(&mut body))
    };
    (reply, status)
}

/// gRPC-Web text call to `helloworld.Greeter/SayHello` over HTTP/1.1.
///
/// Returns the reply and the status from the trailer frame.
pub async fn say_hello_web_text(
    client: &TestClient,
    addr: SocketAddr,
    name: &str,
) -> (HelloReply, String) {
    let body = STANDARD.encode(encode_message(&hello(name)));
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("http://{addr}/helloworld.Greeter/SayHello"))
        .header("content-type", "application/grpc-web-text")
        .header("x-grpc-web", "1")
        .body(Full::new(Bytes::from(body)))
        .unwrap();
    let response = client.request(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/grpc-web-text"));

    let encoded = response.into_body().collect().await.unwrap().to_bytes();
    let decoded = STANDARD.decode(&encoded).unwrap();
    let mut body = Bytes::from(decoded);
    let reply = decode_frame(&mut body);

    assert_eq!(body.get_u8(), 0x80);
    let len = body.get_u32() as usize;
    let trailers = String::from_utf8(body.split_to(len).to_vec()).unwrap();
    let status = trailers
        .split("\r\n")
        .find_map(|line| line.strip_prefix("grpc-status:"))
        .unwrap()
        .trim()
        .to_string();
    (reply, status)
}

fn decode_frame(body: &mut Bytes) -> HelloReply {
    assert_eq!(body.get_u8(), 0, "compressed or trailer frame first");
    let len = body.get_u32() as usize;
    HelloReply::decode(body.split_to(len)).unwrap()
}
