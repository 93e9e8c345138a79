use async_trait::async_trait;
use bw_acquire::{AcquisitionError, Batch, QueryKind, SignalSource};
use bw_core::{SourceKind, Subsystem};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::pgbackrest::probe_physical_db;
use crate::replication::probe_replication;
use crate::snapshot::ResticProbe;
use crate::RemoteExecutor;

/// Direct-probe acquisition adapter. Each subsystem is answered by a single
/// `Status` query that returns complete signals.
pub struct ProbeSource<E> {
    exec: E,
    restic: ResticProbe,
    warm: OnceCell<Result<(), AcquisitionError>>,
}

impl<E: RemoteExecutor> ProbeSource<E> {
    pub fn new(exec: E, restic: ResticProbe) -> Self {
        Self { exec, restic, warm: OnceCell::new() }
    }

    pub fn executor(&self) -> &E {
        &self.exec
    }

    /// Warm the connection once; every later call sees the same outcome.
    pub async fn ensure_connected(&self) -> Result<(), AcquisitionError> {
        self.warm
            .get_or_init(|| async {
                info!(destination = %self.exec.destination(), "connecting");
                let res = self.exec.warm_up().await;
                if let Err(e) = &res {
                    warn!(destination = %self.exec.destination(), error = %e, "connection warm-up failed");
                }
                res
            })
            .await
            .clone()
    }
}

#[async_trait]
impl<E: RemoteExecutor> SignalSource for ProbeSource<E> {
    fn source_kind(&self) -> SourceKind {
        SourceKind::DirectProbe
    }

    fn queries(&self, _subsystem: Subsystem) -> Vec<QueryKind> {
        vec![QueryKind::Status]
    }

    async fn fetch_signals(&self, subsystem: Subsystem, query: QueryKind) -> Result<Batch, AcquisitionError> {
        let mut batch = Batch::default();
        if query != QueryKind::Status {
            return Ok(batch);
        }
        self.ensure_connected().await?;
        match subsystem {
            Subsystem::Replication => probe_replication(&self.exec, &mut batch).await?,
            Subsystem::SnapshotBackup => self.restic.probe(&self.exec, &mut batch).await?,
            Subsystem::PhysicalDbBackup => probe_physical_db(&self.exec, &mut batch).await?,
        }
        Ok(batch)
    }
}
