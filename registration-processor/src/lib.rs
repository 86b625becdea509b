pub mod apis;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod extract;
pub mod gate;
pub mod memory;
pub mod merge;
pub mod metrics_consts;
pub mod pipelines;
pub mod resolver;
pub mod types;

pub use apis::{
    ApiError, ApiResult, AttributeTypeRegistry, ConceptRegistry, IdentifierTypeRegistry,
    IdentityMappingStore, LocationDirectory, ObservationStore, RecordStore, UserDirectory,
};
pub use config::Config;
pub use dispatcher::PipelineRegistry;
pub use errors::{ErrorAggregate, LookupKind, ProcessResult, ProcessingError, SensitiveField};
pub use pipelines::{Pipeline, ProcessorContext};
pub use resolver::{IdentityResolver, MatchResult, MatchStrategy};
pub use types::{
    Address, Attribute, AttributeType, CandidateRecord, Concept, Identifier, IdentifierType,
    IdentityMapping, Location, Observation, PersonName, ProcessOutcome, QueueData, StoredRecord,
    User,
};
