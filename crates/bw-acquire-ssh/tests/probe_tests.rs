use std::sync::Arc;
use std::time::Duration;

use bw_acquire::{collect, run_source_contract_suite, AcquisitionError};
use bw_acquire_ssh::{CommandOutput, ProbeSource, ResticProbe, ScriptedExecutor};
use bw_core::{Fault, JobFilter, JobRegistry, StalenessPolicy, Subsystem, VerdictState};

// 2025-11-28T08:53:20Z
const NOW: f64 = 1_764_320_000.0;

const SYNCOID_TIMERS: &str = "\
syncoid-tank-services-plex.timer   loaded active waiting Syncoid replication timer
syncoid-tank-services-sonarr.timer loaded active waiting Syncoid replication timer
";

const SYNCOID_SONARR: &str = "\
ActiveState=inactive
SubState=dead
Result=success
ExecMainExitTimestamp=@1764316800
ExecStart={ path=/nix/store/abc-sanoid/bin/syncoid ; argv[]=/nix/store/abc-sanoid/bin/syncoid --sshkey /run/secrets/k tank/services/sonarr zfs-replication@nas-1.holthome.net:backup/forge/sonarr ; ignore_errors=no ; start_time=[n/a] ; stop_time=[n/a] ; pid=0 ; code=(null) ; status=0/0 }
";

const SYNCOID_PLEX: &str = "\
ActiveState=activating
SubState=start
Result=success
ExecMainExitTimestamp=@1764309600
ExecStart={ path=/nix/store/abc-sanoid/bin/syncoid ; argv[]=/nix/store/abc-sanoid/bin/syncoid tank/services/plex zfs-replication@nas-1.holthome.net:backup/forge/plex ; ignore_errors=no }
";

const RESTIC_SERVICES: &str = "\
restic-backup-service-immich.service loaded failed failed restic backup immich
restic-backup-service-sonarr.service loaded inactive dead restic backup sonarr
";

const RESTIC_SONARR_SHOW: &str = "\
Result=success
Environment=RESTIC_REPOSITORY=/mnt/nas-backup/sonarr RESTIC_PASSWORD_FILE=/run/secrets/restic-password RESTIC_CACHE_DIR=/var/cache/restic
EnvironmentFile=
";

const RESTIC_IMMICH_SHOW: &str = "\
Result=exit-code
Environment=RESTIC_REPOSITORY=s3:https://acct.r2.cloudflarestorage.com/immich RESTIC_PASSWORD_FILE=/run/secrets/restic-password
EnvironmentFile=-/run/secrets/r2-credentials (ignore_errors=yes)
";

fn forge() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .on_stdout("echo ok", "ok\n")
        .on_stdout("'syncoid-*.timer'", SYNCOID_TIMERS)
        .on_stdout("show syncoid-tank-services-sonarr.service", SYNCOID_SONARR)
        .on_stdout("show syncoid-tank-services-plex.service", SYNCOID_PLEX)
        .on_stdout("'restic-backup-*.service'", RESTIC_SERVICES)
        .on_stdout("show restic-backup-service-sonarr.service", RESTIC_SONARR_SHOW)
        .on_stdout("show restic-backup-service-immich.service", RESTIC_IMMICH_SHOW)
        .on_stdout("/mnt/nas-backup/sonarr", include_str!("fixtures/restic-snapshots-sonarr.json"))
        .on("r2.cloudflarestorage.com/immich", CommandOutput::failed(1, "Fatal: unable to open config file: Stat: 403 Forbidden\n"))
        .on_stdout("pgbackrest info --output=json", include_str!("fixtures/pgbackrest-info.json"))
}

fn restic() -> ResticProbe {
    ResticProbe { program: "restic".into(), snapshot_limit: 1 }
}

#[tokio::test]
async fn test_probe_source_passes_contract() {
    let source = ProbeSource::new(forge(), restic());
    let seen = run_source_contract_suite(&source, &Subsystem::ALL).await.unwrap();
    assert_eq!(seen, 9);
}

#[tokio::test]
async fn test_probed_host_reconciles_to_verdicts() {
    let source = Arc::new(ProbeSource::new(forge(), restic()));
    let out = collect(source.clone(), &Subsystem::ALL, Duration::from_secs(30)).await;
    assert!(out.faults.is_empty(), "{:?}", out.faults);

    let reg = JobRegistry::from_signals(out.signals, out.faults, NOW, &StalenessPolicy::default());
    let rows: Vec<_> = reg
        .list_job_records(&JobFilter::default())
        .into_iter()
        .map(|r| (r.identity.name.clone(), r.identity.target.clone().unwrap_or_default(), r.verdict.state))
        .collect();
    let row = |n: &str, t: &str, s| (n.to_string(), t.to_string(), s);
    assert_eq!(
        rows,
        vec![
            row("main/full", "1", VerdictState::Ok),
            row("main/incr", "1", VerdictState::Ok),
            row("main/full", "2", VerdictState::Error),
            row("tank/services/plex", "nas-1.holthome.net", VerdictState::Running),
            row("tank/services/sonarr", "nas-1.holthome.net", VerdictState::Ok),
            row("service-immich", "r2-offsite", VerdictState::Failed),
            row("service-sonarr", "nas-primary", VerdictState::Ok),
        ]
    );

    let immich = &reg.list_job_records(&JobFilter { name: Some("immich".into()), ..Default::default() })[0];
    assert_eq!(immich.signal.error_flag, Some(true));
    assert!(immich.meta("restic_error").unwrap().contains("403"));

    let sonarr = &reg.list_job_records(&JobFilter {
        subsystems: vec![Subsystem::SnapshotBackup],
        name: Some("sonarr".into()),
        ..Default::default()
    })[0];
    assert_eq!(sonarr.meta("snapshot_id"), Some("3f2a9b7c"));

    // one warm-up shared by every concurrent probe
    let warmups = source.executor().calls().iter().filter(|c| c.as_str() == "echo ok").count();
    assert_eq!(warmups, 1);
}

#[tokio::test]
async fn test_snapshot_listing_runs_with_sudo_and_env_file() {
    let source = ProbeSource::new(forge(), restic());
    run_source_contract_suite(&source, &[Subsystem::SnapshotBackup]).await.unwrap();
    let calls = source.executor().calls();
    let immich = calls.iter().find(|c| c.contains("r2.cloudflarestorage.com")).unwrap();
    assert!(immich.starts_with("sudo sh -c "));
    assert!(immich.contains("/run/secrets/r2-credentials"));
}

#[tokio::test]
async fn test_failed_warm_up_degrades_every_subsystem() {
    let exec = ScriptedExecutor::new()
        .on_error("echo ok", AcquisitionError::Transport("ssh to forge failed: Connection refused".into()));
    let out = collect(Arc::new(ProbeSource::new(exec, restic())), &Subsystem::ALL, Duration::from_secs(30)).await;
    assert!(out.signals.is_empty());
    assert_eq!(out.faults.len(), 3);
    assert!(out.faults.iter().all(|f| matches!(f, Fault::AcquisitionUnavailable { .. })));
}

#[tokio::test]
async fn test_missing_tool_is_isolated_to_its_subsystem() {
    let exec = ScriptedExecutor::new()
        .on_stdout("echo ok", "ok\n")
        .on_stdout("'syncoid-*.timer'", SYNCOID_TIMERS)
        .on_stdout("show syncoid-tank-services-sonarr.service", SYNCOID_SONARR)
        .on_stdout("show syncoid-tank-services-plex.service", SYNCOID_PLEX);
    let out = collect(
        Arc::new(ProbeSource::new(exec, restic())),
        &[Subsystem::Replication, Subsystem::PhysicalDbBackup],
        Duration::from_secs(30),
    )
    .await;
    assert_eq!(out.signals.len(), 2);
    assert_eq!(out.faults.len(), 1);
    assert_eq!(out.faults[0].subsystem(), Subsystem::PhysicalDbBackup);
}

#[tokio::test]
async fn test_stale_stanza_is_not_hidden_by_a_fresh_one() {
    let info = format!(
        r#"[
        {{"name": "main", "status": {{"code": 0, "message": "ok"}},
          "repo": [{{"key": 1, "status": {{"code": 0, "message": "ok"}}}}],
          "backup": [{{"label": "20251126-165320F", "type": "full",
                       "timestamp": {{"start": {stale_start}, "stop": {stale}}}, "database": {{"repo-key": 1}}}}]}},
        {{"name": "analytics", "status": {{"code": 0, "message": "ok"}},
          "repo": [{{"key": 1, "status": {{"code": 0, "message": "ok"}}}}],
          "backup": [{{"label": "20251128-075320F", "type": "full",
                       "timestamp": {{"start": {fresh_start}, "stop": {fresh}}}, "database": {{"repo-key": 1}}}}]}}
    ]"#,
        stale_start = NOW as i64 - 40 * 3600 - 600,
        stale = NOW as i64 - 40 * 3600,
        fresh_start = NOW as i64 - 3600 - 600,
        fresh = NOW as i64 - 3600,
    );
    let exec = ScriptedExecutor::new().on_stdout("echo ok", "ok\n").on_stdout("pgbackrest info --output=json", &info);
    let out =
        collect(Arc::new(ProbeSource::new(exec, restic())), &[Subsystem::PhysicalDbBackup], Duration::from_secs(30))
            .await;
    assert!(out.faults.is_empty(), "{:?}", out.faults);

    let reg = JobRegistry::from_signals(out.signals, out.faults, NOW, &StalenessPolicy::default());
    let rows: Vec<_> = reg
        .list_job_records(&JobFilter::default())
        .into_iter()
        .map(|r| (r.identity.name.clone(), r.meta("stanza").map(String::from), r.verdict.state))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("analytics/full".to_string(), Some("analytics".to_string()), VerdictState::Ok),
            ("main/full".to_string(), Some("main".to_string()), VerdictState::Stale),
        ]
    );
}
