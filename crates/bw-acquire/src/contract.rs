use anyhow::{anyhow, Result};
use bw_core::{SignalScope, Subsystem};

use crate::SignalSource;

/// Shared adapter contract suite, run by every adapter's tests against
/// recorded fixtures.
///
/// Checks that every query answers, that each signal stays within the
/// subsystem it was asked about, and that provenance matches the source.
pub async fn run_source_contract_suite(source: &dyn SignalSource, subsystems: &[Subsystem]) -> Result<usize> {
    let mut seen = 0usize;
    for &subsystem in subsystems {
        let queries = source.queries(subsystem);
        if queries.is_empty() {
            return Err(anyhow!("{subsystem}: source declares no queries"));
        }
        for query in queries {
            let batch = source
                .fetch_signals(subsystem, query)
                .await
                .map_err(|e| anyhow!("{subsystem} {query}: {e}"))?;
            for signal in &batch.signals {
                if signal.scope.subsystem() != subsystem {
                    return Err(anyhow!(
                        "{subsystem} {query}: signal for {} leaked into the wrong subsystem",
                        signal.scope.subsystem()
                    ));
                }
                if signal.source != source.source_kind() {
                    return Err(anyhow!("{subsystem} {query}: signal tagged {:?}", signal.source));
                }
                if let SignalScope::Job(id) = &signal.scope {
                    if id.name.trim().is_empty() {
                        return Err(anyhow!("{subsystem} {query}: job signal without a name"));
                    }
                }
            }
            seen += batch.signals.len();
        }
    }
    Ok(seen)
}
