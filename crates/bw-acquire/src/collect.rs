use std::sync::Arc;
use std::time::Duration;

use bw_core::{Fault, RawSignal, Subsystem};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::{AcquisitionError, Batch, QueryKind, SignalSource};

/// Everything one source returned for a run.
#[derive(Clone, Debug, Default)]
pub struct Acquired {
    pub signals: Vec<RawSignal>,
    pub faults: Vec<Fault>,
}

/// Issue every query of `source` for `subsystems` concurrently and wait for
/// all of them.
///
/// Each call is bounded by `deadline`. A failed or timed-out call becomes an
/// `AcquisitionUnavailable` fault and contributes no signals. Output order
/// follows (subsystem, query) issue order regardless of completion order.
pub async fn collect(source: Arc<dyn SignalSource>, subsystems: &[Subsystem], deadline: Duration) -> Acquired {
    let mut set = JoinSet::new();
    let mut plan: Vec<(Subsystem, QueryKind)> = Vec::new();

    for &subsystem in subsystems {
        for query in source.queries(subsystem) {
            let index = plan.len();
            plan.push((subsystem, query));
            let source = Arc::clone(&source);
            set.spawn(async move {
                let result = match tokio::time::timeout(deadline, source.fetch_signals(subsystem, query)).await {
                    Ok(result) => result,
                    Err(_) => Err(AcquisitionError::Timeout(deadline)),
                };
                (index, result)
            });
        }
    }

    let mut slots: Vec<Option<Result<Batch, AcquisitionError>>> = vec![None; plan.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => warn!(error = %e, "acquisition task did not complete"),
        }
    }

    let mut out = Acquired::default();
    for ((subsystem, query), slot) in plan.into_iter().zip(slots) {
        match slot {
            Some(Ok(mut batch)) => {
                debug!(%subsystem, %query, signals = batch.signals.len(), "query answered");
                for fault in &batch.faults {
                    warn!(%fault, "signal dropped");
                }
                out.signals.append(&mut batch.signals);
                out.faults.append(&mut batch.faults);
            }
            Some(Err(e)) => {
                warn!(%subsystem, %query, error = %e, "query unavailable");
                out.faults.push(Fault::unavailable(subsystem, query.as_str(), e));
            }
            None => out.faults.push(Fault::unavailable(subsystem, query.as_str(), "task aborted")),
        }
    }
    out
}
