//! Prometheus metrics for the assistant.
//!
//! Exposes:
//! - `fault_assistant_stage_duration_seconds` (histogram by pipeline stage)
//! - `fault_assistant_turn_total` (counter by outcome: ok / error / cancelled)
//! - `fault_assistant_turn_inflight` (gauge)
//! - `fault_assistant_graph_hits_total` (counter)
//! - `fault_assistant_command_total` / `fault_assistant_command_duration_seconds`
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 5ms up to ~80 seconds.
    let buckets = prometheus::exponential_buckets(0.005, 2.0, 15)
        .expect("failed to create histogram buckets");
    register_histogram_vec!(
        "fault_assistant_stage_duration_seconds",
        "Pipeline stage duration in seconds",
        &["stage"],
        buckets
    )
    .expect("failed to register stage duration histogram")
});

static TURN_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fault_assistant_turn_total",
        "Question turns by outcome",
        &["outcome"]
    )
    .expect("failed to register turn counter")
});

static TURN_INFLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "fault_assistant_turn_inflight",
        "Number of turns currently being answered"
    )
    .expect("failed to register inflight gauge")
});

static GRAPH_HITS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "fault_assistant_graph_hits_total",
        "Hits returned by the graph search"
    )
    .expect("failed to register graph hit counter")
});

static COMMAND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fault_assistant_command_total",
        "CLI commands by name and status",
        &["command", "status"]
    )
    .expect("failed to register command counter")
});

static COMMAND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fault_assistant_command_duration_seconds",
        "CLI command duration in seconds",
        &["command"]
    )
    .expect("failed to register command duration histogram")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&STAGE_DURATION);
    Lazy::force(&TURN_TOTAL);
    Lazy::force(&TURN_INFLIGHT);
    Lazy::force(&GRAPH_HITS);
    Lazy::force(&COMMAND_TOTAL);
    Lazy::force(&COMMAND_DURATION);
}

/// Record how a CLI command finished.
pub fn record_command_result(command: &str, duration: Duration, success: bool) {
    init_collectors();
    let status = if success { "success" } else { "error" };
    COMMAND_TOTAL.with_label_values(&[command, status]).inc();
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration.as_secs_f64());
}

/// Record how long a pipeline stage took.
pub fn record_stage(stage: &'static str, duration: Duration) {
    init_collectors();
    STAGE_DURATION
        .with_label_values(&[stage])
        .observe(duration.as_secs_f64());
}

/// Count a finished turn.
pub fn record_turn(outcome: &'static str) {
    init_collectors();
    TURN_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_graph_hits(count: usize) {
    init_collectors();
    GRAPH_HITS.inc_by(count as u64);
}

/// Turns currently in flight.
pub fn inflight_turns() -> i64 {
    init_collectors();
    TURN_INFLIGHT.get()
}

/// Keeps the inflight gauge raised while alive.
#[derive(Debug)]
pub struct TurnGuard(());

impl TurnGuard {
    pub fn start() -> Self {
        init_collectors();
        TURN_INFLIGHT.inc();
        TurnGuard(())
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        TURN_INFLIGHT.dec();
    }
}

fn plain_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(plain_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "encode error",
        ));
    }

    let mut response = plain_response(StatusCode::OK, buffer);
    if let Ok(content_type) = hyper::header::HeaderValue::from_str(encoder.format_type()) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(plain_response(StatusCode::NOT_FOUND, Bytes::new())),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn records_stage_durations() {
        let before = STAGE_DURATION
            .with_label_values(&["test_stage"])
            .get_sample_count();

        record_stage("test_stage", Duration::from_millis(120));

        let histogram = STAGE_DURATION.with_label_values(&["test_stage"]);
        assert_eq!(histogram.get_sample_count(), before + 1);
        assert!(histogram.get_sample_sum() >= 0.12);
    }

    #[test]
    fn records_turn_outcomes_separately() {
        let ok_before = TURN_TOTAL.with_label_values(&["test_ok"]).get();
        record_turn("test_ok");
        record_turn("test_ok");
        record_turn("test_err");

        assert!(TURN_TOTAL.with_label_values(&["test_ok"]).get() >= ok_before + 2);
        assert!(TURN_TOTAL.with_label_values(&["test_err"]).get() >= 1);
    }

    #[test]
    fn graph_hits_accumulate() {
        let before = {
            init_collectors();
            GRAPH_HITS.get()
        };
        record_graph_hits(3);
        assert!(GRAPH_HITS.get() >= before + 3);
    }

    #[test]
    fn records_command_results() {
        record_command_result("test_cmd", Duration::from_millis(5), true);
        record_command_result("test_cmd", Duration::from_millis(5), false);

        assert!(COMMAND_TOTAL.with_label_values(&["test_cmd", "success"]).get() >= 1);
        assert!(COMMAND_TOTAL.with_label_values(&["test_cmd", "error"]).get() >= 1);
        assert!(
            COMMAND_DURATION
                .with_label_values(&["test_cmd"])
                .get_sample_count()
                >= 2
        );
    }

    #[test]
    fn init_collectors_can_be_called_multiple_times() {
        init_collectors();
        init_collectors();
    }

    #[tokio::test]
    async fn metrics_response_contains_registered_metrics() {
        record_turn("test_response");
        let _guard = TurnGuard::start();

        let response = metrics_response().await.expect("metrics response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(hyper::header::CONTENT_TYPE)
            .is_some());

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect metrics body")
            .to_bytes();
        let text = String::from_utf8(body_bytes.to_vec()).expect("utf-8 metrics body");
        assert!(text.contains("fault_assistant_turn_total"));
        assert!(text.contains("test_response"));
        assert!(text.contains("fault_assistant_turn_inflight"));
    }
}
