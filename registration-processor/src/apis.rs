use async_trait::async_trait;

use crate::types::{
    AttributeType, CandidateRecord, Concept, IdentifierType, IdentityMapping, Location,
    Observation, StoredRecord, User,
};

pub type ApiError = Box<dyn std::error::Error + Send + Sync>;
pub type ApiResult<T> = Result<T, ApiError>;

/// The external person record store.
///
/// Query methods return records in the store's own order; matching keeps that order and picks the
/// first acceptable record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str) -> ApiResult<Option<StoredRecord>>;

    async fn find_by_identifier_value(&self, value: &str) -> ApiResult<Vec<StoredRecord>>;

    async fn find_by_full_name(&self, full_name: &str) -> ApiResult<Vec<StoredRecord>>;

    /// Promotes a candidate into a new stored record. The store assigns the permanent uuid.
    async fn create(&self, candidate: &CandidateRecord) -> ApiResult<StoredRecord>;

    async fn save(&self, record: &StoredRecord) -> ApiResult<()>;
}

#[async_trait]
pub trait IdentityMappingStore: Send + Sync {
    async fn find_by_temporary_id(&self, temporary_id: &str)
        -> ApiResult<Option<IdentityMapping>>;

    async fn save(&self, mapping: &IdentityMapping) -> ApiResult<()>;
}

#[async_trait]
pub trait IdentifierTypeRegistry: Send + Sync {
    async fn find_by_name(&self, name: &str) -> ApiResult<Option<IdentifierType>>;
}

#[async_trait]
pub trait AttributeTypeRegistry: Send + Sync {
    async fn find_by_name(&self, name: &str) -> ApiResult<Option<AttributeType>>;
}

#[async_trait]
pub trait ConceptRegistry: Send + Sync {
    async fn find_by_name(&self, name: &str) -> ApiResult<Option<Concept>>;

    async fn find_by_id(&self, id: i64) -> ApiResult<Option<Concept>>;
}

#[async_trait]
pub trait LocationDirectory: Send + Sync {
    async fn find_by_id(&self, id: i64) -> ApiResult<Option<Location>>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> ApiResult<Option<User>>;
}

#[async_trait]
pub trait ObservationStore: Send + Sync {
    async fn save(&self, observation: &Observation) -> ApiResult<()>;
}
