use crate::db::{ActiveDatabase, ConnectionProbe};
use crate::llm::GenerationOrchestrator;
use crate::pipeline::QueryPipeline;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<QueryPipeline>,
    pub connections: Arc<dyn ConnectionProbe>,
}

impl AppState {
    pub fn new(pipeline: Arc<QueryPipeline>, connections: Arc<dyn ConnectionProbe>) -> Self {
        Self {
            pipeline,
            connections,
        }
    }

    pub fn active(&self) -> &ActiveDatabase {
        self.pipeline.active()
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        self.pipeline.orchestrator()
    }
}
