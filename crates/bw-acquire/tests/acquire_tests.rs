use std::sync::Arc;
use std::time::Duration;

use bw_acquire::{collect, run_source_contract_suite, AcquisitionError, QueryKind, StaticSource};
use bw_core::{
    Fault, JobFilter, JobIdentity, JobRegistry, RawSignal, SourceKind, StalenessPolicy, Subsystem, VerdictState,
};

const NOW: f64 = 1_760_000_000.0;

fn syncoid(dataset: &str, target: Option<&str>) -> RawSignal {
    RawSignal::job(
        JobIdentity::new(Subsystem::Replication, dataset, target.map(String::from)),
        SourceKind::MetricsStore,
    )
}

fn replication_source() -> StaticSource {
    StaticSource::new(SourceKind::MetricsStore)
        .answer(
            Subsystem::Replication,
            QueryKind::Identity,
            vec![syncoid("tank/a", Some("nas")), syncoid("tank/b", Some("nas"))],
        )
        .answer(
            Subsystem::Replication,
            QueryKind::Status,
            vec![syncoid("tank/a", None).with_status(1), syncoid("tank/b", None).with_status(1)],
        )
        .answer(
            Subsystem::Replication,
            QueryKind::LastSuccess,
            vec![syncoid("tank/a", None).with_last_success(NOW - 60.0), syncoid("tank/b", None).with_last_success(NOW - 60.0)],
        )
}

#[tokio::test]
async fn test_static_source_passes_contract() {
    let seen = run_source_contract_suite(&replication_source(), &[Subsystem::Replication]).await.unwrap();
    assert_eq!(seen, 6);
}

#[tokio::test]
async fn test_contract_rejects_wrong_provenance() {
    let source = StaticSource::new(SourceKind::DirectProbe)
        .answer(Subsystem::Replication, QueryKind::Status, vec![syncoid("tank/a", Some("nas"))]);
    assert!(run_source_contract_suite(&source, &[Subsystem::Replication]).await.is_err());
}

#[tokio::test]
async fn test_all_queries_return_before_merge() {
    let out = collect(Arc::new(replication_source()), &[Subsystem::Replication], Duration::from_secs(5)).await;
    assert!(out.faults.is_empty());
    let reg = JobRegistry::from_signals(out.signals, out.faults, NOW, &StalenessPolicy::default());
    let states: Vec<_> = reg.list_job_records(&JobFilter::default()).iter().map(|r| r.verdict.state).collect();
    assert_eq!(states, vec![VerdictState::Ok, VerdictState::Ok]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_status_query_degrades_to_unknown() {
    let source = replication_source().fail(
        Subsystem::Replication,
        QueryKind::Status,
        AcquisitionError::Transport("503 Service Unavailable".into()),
    );
    let out = collect(Arc::new(source), &[Subsystem::Replication], Duration::from_secs(5)).await;
    assert!(matches!(out.faults.as_slice(), [Fault::AcquisitionUnavailable { .. }]));
    let reg = JobRegistry::from_signals(out.signals, out.faults, NOW, &StalenessPolicy::default());
    let records = reg.list_job_records(&JobFilter::default());
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.verdict.state == VerdictState::Unknown));
    assert_eq!(reg.faults().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_identity_timeout_yields_no_identities() {
    let source = StaticSource::new(SourceKind::MetricsStore)
        .answer(Subsystem::Replication, QueryKind::Identity, vec![syncoid("tank/a", Some("nas"))])
        .delay(Subsystem::Replication, QueryKind::Identity, Duration::from_secs(60));
    let out = collect(Arc::new(source), &[Subsystem::Replication], Duration::from_secs(10)).await;
    let reg = JobRegistry::from_signals(out.signals, out.faults, NOW, &StalenessPolicy::default());
    assert!(reg.is_empty());
    assert!(matches!(
        reg.report(&JobFilter::default()).outcome,
        bw_core::ReportOutcome::NoIdentitiesDiscovered { .. }
    ));
}
