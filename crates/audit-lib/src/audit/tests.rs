//! End-to-end audit runs against an in-memory cluster

use super::*;
use crate::error::Error;
use crate::kinds::ResourceKind;
use crate::testing::{MockCluster, TcpDialer};
use serde_json::json;
use std::sync::Arc;

const METRICS_BODY: &str = "xcp_edge_connected_clusters 3\n";

fn test_config() -> AuditConfig {
    AuditConfig {
        local_port: 0,
        api_timeout_secs: 5,
        ready_timeout_secs: 5,
        fetch_timeout_secs: 5,
        ..Default::default()
    }
}

async fn metrics_server() -> mockito::ServerGuard {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/metrics")
        .with_status(200)
        .with_body(METRICS_BODY)
        .create_async()
        .await;
    server
}

fn report_text(sink: ReportSink<Vec<u8>>) -> String {
    String::from_utf8(sink.into_inner()).unwrap()
}

#[tokio::test]
async fn test_team_namespace_report() {
    let server = metrics_server().await;
    let dialer = TcpDialer::new(server.host_with_port());
    let cluster = MockCluster::new()
        .with_namespaces(&["default", "kube-system", "team-a"])
        .with_services("team-a", 2)
        .with_pods("team-a", 1)
        .with_services("kube-system", 9)
        .with_labeled_pods("istio-system", "app=edge", &["edge-5d8f"])
        .with_dialer(Arc::new(dialer.clone()));

    let config = AuditConfig {
        extra_excluded_namespaces: vec!["default".to_string()],
        ..test_config()
    };
    let mut sink = ReportSink::new(Vec::new(), "memory");
    let logger = AuditLogger::new("test");

    let summary = run_audit(&cluster, &config, &mut sink, &logger)
        .await
        .unwrap();

    let report = report_text(sink);
    let expected = "Namespace team-a has 2 services, 1 pods, 0 gateways with 0 hostnames, \
                    0 virtual services, 0 destination rules, 0 service entries, \
                    0 tier1 gateway pods and 0 ingressgateway pods.\n\
                    0 multicluster service entries\n";
    assert_eq!(report, format!("{expected}{METRICS_BODY}"));
    assert!(!report.contains("kube-system"));
    assert!(!report.contains("Namespace default"));

    assert_eq!(
        summary,
        AuditSummary {
            namespaces: 1,
            multicluster_service_entries: 0,
            metrics_bytes: METRICS_BODY.len(),
        }
    );
    assert_eq!(dialer.live_streams(), 0);
}

#[tokio::test]
async fn test_report_lines_follow_namespace_order() {
    let server = metrics_server().await;
    let cluster = MockCluster::new()
        .with_namespaces(&["payments", "tsb", "checkout"])
        .with_gateway(
            "checkout",
            json!({"servers": [
                {"port": {"number": 15443}, "hosts": ["*.global"]},
                {"port": {"number": 443}, "hosts": ["shop.example.com", "api.example.com"]}
            ]}),
        )
        .with_custom(ResourceKind::VirtualService, "checkout", 3)
        .with_custom(ResourceKind::ServiceEntry, "xcp-multicluster", 7)
        .with_labeled_pods("istio-system", "app=edge", &["edge-0"])
        .with_dialer(Arc::new(TcpDialer::new(server.host_with_port())));

    let mut sink = ReportSink::new(Vec::new(), "memory");
    run_audit(&cluster, &test_config(), &mut sink, &AuditLogger::new("test"))
        .await
        .unwrap();

    let report = report_text(sink);
    let lines: Vec<&str> = report.lines().collect();
    assert!(lines[0].starts_with("Namespace payments has 0 services"));
    assert!(lines[1].starts_with(
        "Namespace checkout has 0 services, 0 pods, 1 gateways with 2 hostnames, 3 virtual services"
    ));
    assert_eq!(lines[2], "7 multicluster service entries");
    assert_eq!(lines[3], METRICS_BODY.trim_end());
}

#[tokio::test]
async fn test_missing_edge_pod_skips_metrics() {
    let server = metrics_server().await;
    let dialer = TcpDialer::new(server.host_with_port());
    let cluster = MockCluster::new()
        .with_namespaces(&["team-a"])
        .with_labeled_pods("istio-system", "app=other", &["not-edge"])
        .with_dialer(Arc::new(dialer.clone()));

    let mut sink = ReportSink::new(Vec::new(), "memory");
    let err = run_audit(&cluster, &test_config(), &mut sink, &AuditLogger::new("test"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)), "unexpected error: {err}");
    assert_eq!(dialer.dial_count(), 0);

    let report = report_text(sink);
    assert!(report.ends_with("0 multicluster service entries\n"));
    assert!(!report.contains("xcp_edge"));
}

#[tokio::test]
async fn test_namespace_error_stops_before_partial_line() {
    let cluster = MockCluster::new()
        .with_namespaces(&["team-a", "restricted", "team-b"])
        .with_services("team-a", 1)
        .failing_namespace("restricted");

    let mut sink = ReportSink::new(Vec::new(), "memory");
    let err = run_audit(&cluster, &test_config(), &mut sink, &AuditLogger::new("test"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Kube(_)), "unexpected error: {err}");
    let report = report_text(sink);
    assert_eq!(report.lines().count(), 1);
    assert!(report.starts_with("Namespace team-a has 1 services"));
    assert!(!report.contains("restricted"));
    assert!(!report.contains("team-b"));
}

#[tokio::test]
async fn test_multicluster_error_is_propagated() {
    let cluster = MockCluster::new()
        .with_namespaces(&["team-a"])
        .failing_namespace("xcp-multicluster");

    let mut sink = ReportSink::new(Vec::new(), "memory");
    let err = run_audit(&cluster, &test_config(), &mut sink, &AuditLogger::new("test"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Kube(_)), "unexpected error: {err}");
    assert!(!report_text(sink).contains("multicluster"));
}

#[tokio::test]
async fn test_failed_run_keeps_previous_report_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prod-east.txt");
    std::fs::write(&path, "last good report\n").unwrap();

    let cluster = MockCluster::new()
        .with_namespaces(&["restricted"])
        .failing_namespace("restricted");

    let mut sink = ReportSink::file(&path);
    let err = run_audit(&cluster, &test_config(), &mut sink, &AuditLogger::new("test"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Kube(_)), "unexpected error: {err}");
    drop(sink);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "last good report\n");
}
