use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bw_core::{RawSignal, SourceKind, Subsystem};

use crate::{AcquisitionError, Batch, QueryKind, SignalSource};

#[derive(Clone, Debug)]
struct Script {
    response: Result<Vec<RawSignal>, AcquisitionError>,
    delay: Option<Duration>,
}

impl Default for Script {
    fn default() -> Self {
        Self { response: Ok(Vec::new()), delay: None }
    }
}

/// In-memory source answering from canned responses.
#[derive(Clone, Debug)]
pub struct StaticSource {
    kind: SourceKind,
    scripts: BTreeMap<(Subsystem, QueryKind), Script>,
}

impl StaticSource {
    pub fn new(kind: SourceKind) -> Self {
        Self { kind, scripts: BTreeMap::new() }
    }

    pub fn answer(mut self, subsystem: Subsystem, query: QueryKind, signals: Vec<RawSignal>) -> Self {
        self.scripts.entry((subsystem, query)).or_default().response = Ok(signals);
        self
    }

    pub fn fail(mut self, subsystem: Subsystem, query: QueryKind, error: AcquisitionError) -> Self {
        self.scripts.entry((subsystem, query)).or_default().response = Err(error);
        self
    }

    /// Sleep before answering; pairs with paused tokio time in tests.
    pub fn delay(mut self, subsystem: Subsystem, query: QueryKind, by: Duration) -> Self {
        self.scripts.entry((subsystem, query)).or_default().delay = Some(by);
        self
    }
}

#[async_trait]
impl SignalSource for StaticSource {
    fn source_kind(&self) -> SourceKind {
        self.kind
    }

    fn queries(&self, subsystem: Subsystem) -> Vec<QueryKind> {
        self.scripts.keys().filter(|(s, _)| *s == subsystem).map(|(_, q)| *q).collect()
    }

    async fn fetch_signals(&self, subsystem: Subsystem, query: QueryKind) -> Result<Batch, AcquisitionError> {
        let Some(script) = self.scripts.get(&(subsystem, query)) else {
            return Ok(Batch::default());
        };
        if let Some(by) = script.delay {
            tokio::time::sleep(by).await;
        }
        script.response.clone().map(Batch::of)
    }
}
