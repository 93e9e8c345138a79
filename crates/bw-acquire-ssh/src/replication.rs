use bw_acquire::{AcquisitionError, Batch, QueryKind};
use bw_core::{Fault, JobIdentity, RawSignal, SourceKind, Subsystem, FAILED_CODE, IN_PROGRESS_CODE, SUCCESS_CODE};
use tracing::debug;

use crate::systemd::{parse_properties, parse_timestamp, parse_unit_list};
use crate::RemoteExecutor;

const SUBSYSTEM: Subsystem = Subsystem::Replication;

pub const LIST_TIMERS: &str = "systemctl list-units --type=timer --all 'syncoid-*.timer' --no-legend --plain";

fn show_command(service: &str) -> String {
    format!(
        "systemctl show {service}.service --property=ActiveState,SubState,Result,ExecMainExitTimestamp,ExecStart --timestamp=unix"
    )
}

/// `syncoid-tank-services-sonarr` -> `tank/services/sonarr`
pub fn dataset_from_unit(unit: &str) -> String {
    unit.strip_prefix("syncoid-").unwrap_or(unit).replace('-', "/")
}

/// Host of the first `user@host:path` argument.
pub fn target_host_from_exec_start(exec_start: &str) -> Option<String> {
    exec_start.split_whitespace().find_map(|tok| {
        let (user, rest) = tok.split_once('@')?;
        if !user.chars().last().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return None;
        }
        let (host, _) = rest.split_once(':')?;
        (!host.is_empty()).then(|| host.to_string())
    })
}

/// One signal per syncoid service from its systemd state.
pub async fn probe_replication(exec: &dyn RemoteExecutor, batch: &mut Batch) -> Result<(), AcquisitionError> {
    let listing = exec.run(LIST_TIMERS, true).await?.require_success()?;
    for timer in parse_unit_list(&listing.stdout, "syncoid-", ".timer") {
        let service = timer.trim_end_matches(".timer");
        let shown = match exec.run(&show_command(service), true).await {
            Ok(out) if out.success() => out,
            Ok(out) => {
                debug!(%service, code = out.exit_code, "systemctl show failed");
                batch.faults.push(Fault::unavailable(
                    SUBSYSTEM,
                    QueryKind::Status.as_str(),
                    format!("{service}: systemctl show exited {}", out.exit_code),
                ));
                continue;
            }
            Err(e) => {
                batch.faults.push(Fault::unavailable(SUBSYSTEM, QueryKind::Status.as_str(), format!("{service}: {e}")));
                continue;
            }
        };
        batch.push(service_signal(service, &shown.stdout));
    }
    Ok(())
}

fn service_signal(service: &str, show_stdout: &str) -> RawSignal {
    let props = parse_properties(show_stdout);
    let prop = |k: &str| props.get(k).map(String::as_str).unwrap_or("");
    let active = prop("ActiveState");
    let result = prop("Result");

    let code = if active == "activating" {
        IN_PROGRESS_CODE
    } else if result == "success" {
        SUCCESS_CODE
    } else {
        FAILED_CODE
    };

    let target = target_host_from_exec_start(prop("ExecStart"));
    let identity = JobIdentity::new(SUBSYSTEM, dataset_from_unit(service), target.clone());
    let mut signal = RawSignal::job(identity, SourceKind::DirectProbe)
        .with_status(code)
        .with_meta("unit", service)
        .with_meta("systemd_state", format!("{}/{}", or_unknown(active), or_unknown(prop("SubState"))));
    if let Some(host) = target {
        signal = signal.with_meta("target_host", host);
    }
    if result == "success" {
        if let Some(ts) = parse_timestamp(prop("ExecMainExitTimestamp")) {
            signal = signal.with_last_success(ts);
        }
    }
    signal
}

fn or_unknown(s: &str) -> &str {
    if s.is_empty() {
        "unknown"
    } else {
        s
    }
}
