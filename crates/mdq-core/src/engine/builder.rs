//! Engine construction with pluggable collaborators.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use super::{Engine, EngineConfig, Shared};
use crate::admission::Admission;
use crate::control::JobControl;
use crate::destination::{DestinationResolver, Disambiguating};
use crate::events::Publisher;
use crate::fetch::{FetchTransport, RoutingTransport};
use crate::job::{Job, JobId};
use crate::postprocess::{CommandPostprocessor, Passthrough, Postprocessor};
use crate::store::QueueStore;

/// Defaults: curl/file routing transport, the configured postprocess
/// command (or passthrough), and the numbering resolver.
pub struct EngineBuilder {
    config: EngineConfig,
    transport: Option<Arc<dyn FetchTransport>>,
    postprocessor: Option<Arc<dyn Postprocessor>>,
    resolver: Option<Arc<dyn DestinationResolver>>,
    publisher: Option<Publisher>,
    records: Vec<Job>,
    next_id: JobId,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            transport: None,
            postprocessor: None,
            resolver: None,
            publisher: None,
            records: Vec::new(),
            next_id: 1,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn FetchTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn postprocessor(mut self, postprocessor: Arc<dyn Postprocessor>) -> Self {
        self.postprocessor = Some(postprocessor);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn DestinationResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Publish into an existing publisher, e.g. one a mirror already watches.
    pub fn publisher(mut self, publisher: Publisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Start from persisted records. Jobs left Active are requeued with
    /// their attempt unchanged. `next_id` is the lowest id a new job may get.
    pub fn restore(mut self, records: Vec<Job>, next_id: JobId) -> Self {
        self.records = records;
        self.next_id = next_id;
        self
    }

    /// Must be called from within a Tokio runtime; workers run on it.
    pub fn build(self) -> Result<Engine> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("engine must be built inside a Tokio runtime")?;

        let postprocessor: Arc<dyn Postprocessor> =
            match (self.postprocessor, &self.config.postprocess_command) {
                (Some(p), _) => p,
                (None, Some(argv)) => Arc::new(
                    CommandPostprocessor::from_argv(argv)
                        .context("invalid [postprocess] command")?,
                ),
                (None, None) => Arc::new(Passthrough),
            };
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(RoutingTransport::with_curl(self.config.curl)));
        let resolver = self.resolver.unwrap_or_else(|| Arc::new(Disambiguating));

        let restored = self.records.len();
        let store = QueueStore::restore(
            self.publisher.unwrap_or_default(),
            self.records,
            self.next_id,
        );
        if restored > 0 {
            tracing::info!(jobs = restored, "restored queue");
        }

        let shared = Shared {
            admission: Admission::new(self.config.max_active),
            config: self.config,
            store,
            control: JobControl::new(),
            transport,
            postprocessor,
            resolver,
            finalize_lock: Mutex::new(()),
            runtime,
        };
        Ok(Engine::from_shared(Arc::new(shared)))
    }
}
