//! Shutdown ordering and the shared deadline.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{config, get_json, http1, start_with, start_with_telemetry};
use futures_util::future::BoxFuture;
use http::{Method, StatusCode};
use opentelemetry_sdk::export::trace::{ExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::trace::TracerProvider;
use portico_core::{Envelope, HttpRequest};
use portico_server::{DrainOutcome, RestRouter, Services};
use portico_telemetry::{flush_budget, FlushOutcome, Telemetry};
use tokio::sync::Notify;

/// Span exporter whose shutdown hangs, like an unreachable collector.
#[derive(Debug)]
struct StallingExporter(Duration);

impl SpanExporter for StallingExporter {
    fn export(&mut self, _batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        Box::pin(async { Ok(()) })
    }

    fn shutdown(&mut self) {
        std::thread::sleep(self.0);
    }
}

fn stalling_telemetry(stall: Duration) -> Telemetry {
    let provider = TracerProvider::builder()
        .with_simple_exporter(StallingExporter(stall))
        .build();
    Telemetry::with_provider(provider)
}

/// Bundled RPC services plus a REST route that signals entry and then sleeps.
fn services_with_slow_route(entered: Arc<Notify>, delay: Duration) -> Services {
    let config = config(0, 0, 1);
    let mut services = Services::from_config(&config);
    let rest = RestRouter::builder()
        .request_timeout(Duration::from_secs(600))
        .route(Method::GET, "/slow", move |_request: HttpRequest| {
            let entered = Arc::clone(&entered);
            async move {
                entered.notify_one();
                tokio::time::sleep(delay).await;
                Envelope::success(&serde_json::json!({"slept_ms": delay.as_millis() as u64}))
            }
        })
        .build();
    services.rest = Arc::new(rest);
    services
}

#[tokio::test]
async fn test_in_flight_request_completes_before_exit() {
    let entered = Arc::new(Notify::new());
    let services = services_with_slow_route(Arc::clone(&entered), Duration::from_millis(300));
    let server = start_with(config(0, 0, 5), services).await;
    let addr = server.addr("multiplexed");

    let client = http1();
    let request = tokio::spawn(async move { get_json(&client, addr, "/slow", &[]).await });
    entered.notified().await;

    let began = Instant::now();
    let report = server.stop().await;
    assert!(report.is_graceful());
    assert_eq!(report.listeners, DrainOutcome::Graceful);
    assert!(began.elapsed() < Duration::from_secs(5));

    let (status, _, body) = request.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["slept_ms"], 300);
}

#[tokio::test]
async fn test_deadline_forces_degraded_exit() {
    let entered = Arc::new(Notify::new());
    let services = services_with_slow_route(Arc::clone(&entered), Duration::from_secs(3600));
    let server = start_with(config(0, 0, 1), services).await;
    let addr = server.addr("multiplexed");

    let client = http1();
    let request = tokio::spawn(async move {
        client
            .request(
                http::Request::builder()
                    .uri(format!("http://{addr}/slow"))
                    .body(http_body_util::Full::new(bytes::Bytes::new()))
                    .unwrap(),
            )
            .await
    });
    entered.notified().await;

    let began = Instant::now();
    let report = server.stop().await;
    let elapsed = began.elapsed();

    assert!(!report.is_graceful());
    assert_eq!(report.listeners, DrainOutcome::Degraded { abandoned: 1 });
    assert!(!report.abandoned_tasks.is_empty());
    assert!(elapsed >= Duration::from_millis(900), "exited early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "overran the budget: {elapsed:?}");

    // The abandoned request sees its connection closed.
    assert!(request.await.unwrap().is_err());
}

#[tokio::test]
async fn test_new_connections_refused_while_draining() {
    let entered = Arc::new(Notify::new());
    let services = services_with_slow_route(Arc::clone(&entered), Duration::from_millis(500));
    let server = start_with(config(0, 0, 5), services).await;
    let addr = server.addr("multiplexed");

    let client = http1();
    let in_flight = tokio::spawn(async move { get_json(&client, addr, "/slow", &[]).await });
    entered.notified().await;

    server.cancel.trigger();
    // Give the listener a moment to close its socket.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());

    let (status, _, _) = in_flight.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(server.task.await.unwrap().unwrap().is_graceful());
}

#[tokio::test]
async fn test_second_cancellation_is_ignored() {
    let server = start_with(config(0, 0, 5), Services::from_config(&config(0, 0, 5))).await;
    let addr = server.addr("multiplexed");
    let (status, _, _) = get_json(&http1(), addr, "/v1/", &[]).await;
    assert_eq!(status, StatusCode::OK);

    assert!(server.cancel.trigger());
    assert!(!server.cancel.trigger());
    let report = server.task.await.unwrap().unwrap();
    assert!(report.is_graceful());
}

#[tokio::test]
async fn test_flush_runs_alongside_listener_drain() {
    let budget = Duration::from_secs(2);
    let request_time = Duration::from_millis(1500);
    let flush = flush_budget(budget);
    assert_eq!(flush, Duration::from_secs(1));

    let entered = Arc::new(Notify::new());
    let services = services_with_slow_route(Arc::clone(&entered), request_time);
    let server = start_with_telemetry(
        config(0, 0, budget.as_secs()),
        services,
        stalling_telemetry(Duration::from_secs(3)),
    )
    .await;
    let addr = server.addr("multiplexed");

    let client = http1();
    let request = tokio::spawn(async move { get_json(&client, addr, "/slow", &[]).await });
    entered.notified().await;

    let began = Instant::now();
    let report = server.stop().await;
    let elapsed = began.elapsed();

    assert_eq!(report.listeners, DrainOutcome::Graceful);
    assert_eq!(report.telemetry, Some(FlushOutcome::TimedOut { budget: flush }));
    // Sequential draining would take request_time + flush = 2.5s.
    assert!(elapsed >= Duration::from_millis(1300), "exited early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(2200), "drains ran in sequence: {elapsed:?}");

    let (status, _, _) = request.await.unwrap();
    assert_eq!(status, StatusCode::OK);
}
