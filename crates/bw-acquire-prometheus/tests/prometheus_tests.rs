use std::sync::Arc;
use std::time::Duration;

use bw_acquire::{collect, run_source_contract_suite};
use bw_acquire_prometheus::{PrometheusOptions, PrometheusSource};
use bw_core::{
    Fault, JobFilter, JobRegistry, ReportOutcome, StalenessPolicy, Subsystem, VerdictState,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const NOW: f64 = 1_760_000_000.0;
const API_KEY: &str = "s3cret";

/// Minimal HTTP responder serving recorded vectors keyed by metric name.
async fn fake_prometheus() -> String {
    let fixture: serde_json::Value =
        serde_json::from_str(include_str!("fixtures/homelab.json")).expect("fixture parses");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else { return };
            let fixture = fixture.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&buf).to_lowercase();
                let (status, body) = respond(&request, &fixture);
                let reply = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = sock.write_all(reply.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

fn respond(request: &str, fixture: &serde_json::Value) -> (&'static str, String) {
    if !request.contains(&format!("x-api-key: {}", API_KEY.to_lowercase())) {
        return ("401 Unauthorized", r#"{"status":"error","error":"unauthorized"}"#.to_string());
    }
    let path = request.lines().next().and_then(|l| l.split_whitespace().nth(1)).unwrap_or("");
    if path.starts_with("/api/v1/status/buildinfo") {
        return ("200 OK", r#"{"status":"success","data":{"version":"2.53.0"}}"#.to_string());
    }
    let metric = path.split("query=").nth(1).map(|q| q.split('&').next().unwrap_or("")).unwrap_or("");
    let result = fixture.get(metric).cloned().unwrap_or_else(|| serde_json::json!([]));
    let body = serde_json::json!({"status": "success", "data": {"resultType": "vector", "result": result}});
    ("200 OK", body.to_string())
}

fn source(url: String, api_key: Option<&str>) -> PrometheusSource {
    PrometheusSource::new(&PrometheusOptions {
        url,
        api_key: api_key.map(String::from),
        timeout: Duration::from_secs(5),
        accept_invalid_certs: true,
    })
    .expect("client builds")
}

#[tokio::test]
async fn test_prometheus_source_passes_contract() {
    let src = source(fake_prometheus().await, Some(API_KEY));
    let seen = run_source_contract_suite(&src, &Subsystem::ALL).await.unwrap();
    assert_eq!(seen, 19);
}

#[tokio::test]
async fn test_recorded_metrics_reconcile_to_verdicts() {
    let src = source(fake_prometheus().await, Some(API_KEY));
    let out = collect(Arc::new(src), &Subsystem::ALL, Duration::from_secs(5)).await;
    assert!(out.faults.is_empty(), "{:?}", out.faults);

    let reg = JobRegistry::from_signals(out.signals, out.faults, NOW, &StalenessPolicy::default());
    let rows: Vec<_> = reg
        .list_job_records(&JobFilter::default())
        .into_iter()
        .map(|r| (r.identity.subsystem, r.identity.name.clone(), r.identity.target.clone(), r.verdict.state))
        .collect();
    let t = |s: &str| Some(s.to_string());
    assert_eq!(
        rows,
        vec![
            (Subsystem::PhysicalDbBackup, "main/full".into(), t("1"), VerdictState::Ok),
            (Subsystem::PhysicalDbBackup, "main/incr".into(), t("1"), VerdictState::Ok),
            (Subsystem::PhysicalDbBackup, "main/full".into(), t("2"), VerdictState::Error),
            (Subsystem::Replication, "tank/services/plex".into(), t("nas-1.holthome.net"), VerdictState::Ok),
            (Subsystem::Replication, "tank/services/sonarr".into(), t("nas-1.holthome.net"), VerdictState::Running),
            (Subsystem::SnapshotBackup, "service-immich".into(), t("r2-offsite"), VerdictState::Failed),
            (Subsystem::SnapshotBackup, "service-sonarr".into(), t("nas-primary"), VerdictState::Ok),
        ]
    );

    let records = reg.list_job_records(&JobFilter { name: Some("sonarr".into()), ..Default::default() });
    let restic = records.iter().find(|r| r.identity.subsystem == Subsystem::SnapshotBackup).unwrap();
    assert_eq!(restic.meta("snapshots_total"), Some("42"));
    assert_eq!(restic.meta("repository_location"), Some("nas-1"));

    let pg = reg.list_job_records(&JobFilter { subsystems: vec![Subsystem::PhysicalDbBackup], ..Default::default() });
    assert_eq!(pg[0].meta("repo_name"), Some("NFS"));
    assert_eq!(pg[2].meta("repo_name"), Some("R2"));
}

#[tokio::test]
async fn test_rejected_credentials_degrade_every_query() {
    let src = source(fake_prometheus().await, None);
    let out = collect(Arc::new(src), &[Subsystem::Replication], Duration::from_secs(5)).await;
    assert!(out.signals.is_empty());
    assert_eq!(out.faults.len(), 3);
    assert!(out.faults.iter().all(|f| matches!(f, Fault::AcquisitionUnavailable { .. })));

    let reg = JobRegistry::from_signals(out.signals, out.faults, NOW, &StalenessPolicy::default());
    assert!(matches!(reg.report(&JobFilter::default()).outcome, ReportOutcome::NoIdentitiesDiscovered { .. }));
}

#[tokio::test]
async fn test_check_reports_version() {
    let src = source(fake_prometheus().await, Some(API_KEY));
    assert_eq!(src.check().await.unwrap(), "2.53.0");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let src = source("http://127.0.0.1:9".to_string(), Some(API_KEY));
    assert!(src.query("up").await.is_err());
}
