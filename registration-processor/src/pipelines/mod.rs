use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use crate::apis::{
    ApiError, AttributeTypeRegistry, ConceptRegistry, IdentifierTypeRegistry,
    IdentityMappingStore, LocationDirectory, ObservationStore, RecordStore, UserDirectory,
};
use crate::config::Config;
use crate::errors::{ErrorAggregate, LookupKind, ProcessResult, ProcessingError};
use crate::extract::{FieldPath, Payload};
use crate::metrics_consts::{QUEUE_DATA_ERRORS, QUEUE_DATA_PROCESSED};
use crate::resolver::IdentityResolver;
use crate::types::{Attribute, Identifier, Location, ProcessOutcome, QueueData};

pub mod demographics_update;
pub mod registration;

pub use demographics_update::DemographicsUpdatePipeline;
pub use registration::RegistrationPipeline;

/// Collaborator handles shared by every pipeline run.
pub struct ProcessorContext {
    pub record_store: Arc<dyn RecordStore>,
    pub identity_mappings: Arc<dyn IdentityMappingStore>,
    pub identifier_types: Arc<dyn IdentifierTypeRegistry>,
    pub attribute_types: Arc<dyn AttributeTypeRegistry>,
    pub concepts: Arc<dyn ConceptRegistry>,
    pub locations: Arc<dyn LocationDirectory>,
    pub users: Arc<dyn UserDirectory>,
    pub observations: Arc<dyn ObservationStore>,
}

impl ProcessorContext {
    /// Builds a context whose lookups are all answered by one registry.
    pub fn with_registry<R>(
        record_store: Arc<dyn RecordStore>,
        identity_mappings: Arc<dyn IdentityMappingStore>,
        registry: Arc<R>,
        observations: Arc<dyn ObservationStore>,
    ) -> Self
    where
        R: IdentifierTypeRegistry
            + AttributeTypeRegistry
            + ConceptRegistry
            + LocationDirectory
            + UserDirectory
            + 'static,
    {
        Self {
            record_store,
            identity_mappings,
            identifier_types: registry.clone(),
            attribute_types: registry.clone(),
            concepts: registry.clone(),
            locations: registry.clone(),
            users: registry,
            observations,
        }
    }

    pub fn resolver(&self) -> IdentityResolver {
        IdentityResolver::new(self.record_store.clone(), self.identity_mappings.clone())
    }
}

pub(crate) fn collaborator(operation: &'static str, source: ApiError) -> ProcessingError {
    ProcessingError::Collaborator { operation, source }
}

pub(crate) fn commit(operation: &'static str, source: ApiError) -> ProcessingError {
    ProcessingError::Commit { operation, source }
}

/// Builds an identifier, recording a miss on the type name or a blank value.
pub(crate) async fn create_identifier(
    context: &ProcessorContext,
    type_name: &str,
    value: Option<&str>,
    errors: &mut ErrorAggregate,
) -> Option<Identifier> {
    let identifier_type = match context.identifier_types.find_by_name(type_name).await {
        Ok(Some(identifier_type)) => identifier_type,
        Ok(None) => {
            errors.push(ProcessingError::lookup_miss(LookupKind::IdentifierType, type_name));
            return None;
        }
        Err(e) => {
            errors.push(collaborator("find identifier type", e));
            return None;
        }
    };

    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Some(Identifier::new(identifier_type, value)),
        None => {
            errors.push(ProcessingError::MissingValue {
                what: "Identifier value".to_owned(),
                type_name: type_name.to_owned(),
            });
            None
        }
    }
}

/// Identifiers sent as parallel arrays of type names and values, paired by position.
pub(crate) async fn other_identifiers(
    context: &ProcessorContext,
    payload: &Payload,
    types_path: FieldPath,
    values_path: FieldPath,
    errors: &mut ErrorAggregate,
) -> Vec<Identifier> {
    let type_names = payload.read_list(types_path, errors);
    let values = payload.read_list(values_path, errors);
    if type_names.len() != values.len() {
        errors.push(ProcessingError::extraction(
            values_path,
            format!(
                "{} identifier types but {} identifier values",
                type_names.len(),
                values.len()
            ),
        ));
    }

    let mut identifiers = Vec::with_capacity(type_names.len());
    for (type_name, value) in type_names.iter().zip(&values) {
        if let Some(identifier) = create_identifier(context, type_name, Some(value), errors).await {
            identifiers.push(identifier);
        }
    }
    identifiers
}

/// Builds an attribute when the payload carries a non-blank value for it.
pub(crate) async fn create_attribute(
    context: &ProcessorContext,
    type_name: &str,
    value: Option<String>,
    errors: &mut ErrorAggregate,
) -> Option<Attribute> {
    let value = value.filter(|value| !value.trim().is_empty())?;
    match context.attribute_types.find_by_name(type_name).await {
        Ok(Some(attribute_type)) => Some(Attribute {
            attribute_type,
            value,
        }),
        Ok(None) => {
            errors.push(ProcessingError::lookup_miss(LookupKind::AttributeType, type_name));
            None
        }
        Err(e) => {
            errors.push(collaborator("find attribute type", e));
            None
        }
    }
}

/// Parses an id and resolves it in the location directory.
pub(crate) async fn find_location(
    context: &ProcessorContext,
    path: FieldPath,
    location_id: &str,
    errors: &mut ErrorAggregate,
) -> Option<Location> {
    let Ok(id) = location_id.trim().parse::<i64>() else {
        errors.push(ProcessingError::extraction(
            path,
            format!("'{}' is not a location id", location_id),
        ));
        return None;
    };

    match context.locations.find_by_id(id).await {
        Ok(Some(location)) => Some(location),
        Ok(None) => {
            errors.push(ProcessingError::lookup_miss(LookupKind::Location, location_id));
            None
        }
        Err(e) => {
            errors.push(collaborator("find location", e));
            None
        }
    }
}

/// The payload parser, with a parse failure becoming the run's only error.
pub(crate) fn parse_payload(item: &QueueData) -> ProcessResult<Payload> {
    Payload::parse(&item.payload).map_err(ErrorAggregate::from)
}

/// A queue-data handler. Pipelines are immutable and can be shared across concurrent runs.
pub enum Pipeline {
    Registration(RegistrationPipeline),
    DemographicsUpdate(DemographicsUpdatePipeline),
}

impl Pipeline {
    /// Both pipelines, configured from `config`.
    pub fn all(config: &Config, context: Arc<ProcessorContext>) -> Vec<Pipeline> {
        vec![
            Pipeline::Registration(RegistrationPipeline::new(config, context.clone())),
            Pipeline::DemographicsUpdate(DemographicsUpdatePipeline::new(config, context)),
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Pipeline::Registration(_) => "registration",
            Pipeline::DemographicsUpdate(_) => "demographics_update",
        }
    }

    pub fn discriminator(&self) -> &str {
        match self {
            Pipeline::Registration(pipeline) => pipeline.discriminator(),
            Pipeline::DemographicsUpdate(pipeline) => pipeline.discriminator(),
        }
    }

    /// Lower runs first.
    pub fn priority(&self) -> u32 {
        match self {
            Pipeline::Registration(pipeline) => pipeline.priority(),
            Pipeline::DemographicsUpdate(pipeline) => pipeline.priority(),
        }
    }

    pub fn accept(&self, item: &QueueData) -> bool {
        item.discriminator == self.discriminator()
    }

    /// Runs every check without writing. `Ok(false)` means there is nothing to commit.
    pub async fn validate(&self, item: &QueueData) -> ProcessResult<bool> {
        match self {
            Pipeline::Registration(pipeline) => pipeline.validate(item).await,
            Pipeline::DemographicsUpdate(pipeline) => pipeline.validate(item).await,
        }
    }

    pub async fn process(&self, item: &QueueData) -> ProcessResult<ProcessOutcome> {
        info!(
            queue_data_id = item.id.as_str(),
            pipeline = self.name(),
            "processing queue data"
        );

        let result = match self {
            Pipeline::Registration(pipeline) => pipeline.process(item).await,
            Pipeline::DemographicsUpdate(pipeline) => pipeline.process(item).await,
        };

        match &result {
            Ok(outcome) => {
                let labels = [("pipeline", self.name()), ("outcome", outcome.label())];
                counter!(QUEUE_DATA_PROCESSED, &labels).increment(1);
                info!(
                    queue_data_id = item.id.as_str(),
                    outcome = outcome.label(),
                    "processed queue data"
                );
            }
            Err(errors) => {
                let labels = [("pipeline", self.name()), ("outcome", "failed")];
                counter!(QUEUE_DATA_PROCESSED, &labels).increment(1);
                for error in errors.errors() {
                    let labels = [("pipeline", self.name()), ("kind", error.kind())];
                    counter!(QUEUE_DATA_ERRORS, &labels).increment(1);
                }
                warn!(
                    queue_data_id = item.id.as_str(),
                    error_count = errors.len(),
                    "failed to process queue data: {}",
                    errors
                );
            }
        }

        result
    }
}
