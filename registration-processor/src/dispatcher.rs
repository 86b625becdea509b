use std::sync::Arc;

use crate::config::Config;
use crate::errors::{ErrorAggregate, ProcessResult, ProcessingError};
use crate::pipelines::{Pipeline, ProcessorContext};
use crate::types::{ProcessOutcome, QueueData};

/// Pipelines ordered by ascending priority. The first pipeline that accepts an item handles it.
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: Vec<Pipeline>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every pipeline, configured from `config`.
    pub fn from_config(config: &Config, context: Arc<ProcessorContext>) -> Self {
        Pipeline::all(config, context)
            .into_iter()
            .fold(Self::new(), |mut registry, pipeline| {
                registry.register(pipeline);
                registry
            })
    }

    /// Inserts after every pipeline of equal or lower priority value.
    pub fn register(&mut self, pipeline: Pipeline) {
        let index = self
            .pipelines
            .partition_point(|registered| registered.priority() <= pipeline.priority());
        self.pipelines.insert(index, pipeline);
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn route(&self, item: &QueueData) -> Option<&Pipeline> {
        self.pipelines.iter().find(|pipeline| pipeline.accept(item))
    }

    pub async fn validate(&self, item: &QueueData) -> ProcessResult<bool> {
        self.route_or_fail(item)?.validate(item).await
    }

    pub async fn process(&self, item: &QueueData) -> ProcessResult<ProcessOutcome> {
        self.route_or_fail(item)?.process(item).await
    }

    fn route_or_fail(&self, item: &QueueData) -> ProcessResult<&Pipeline> {
        self.route(item).ok_or_else(|| {
            ErrorAggregate::from(ProcessingError::UnknownDiscriminator(
                item.discriminator.clone(),
            ))
        })
    }
}
