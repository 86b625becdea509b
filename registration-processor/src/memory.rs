//! In-memory collaborators.
//!
//! These back the pipelines in tests and in tools that replay queue data without a real record
//! store. Query semantics are deliberately simple: name search returns every record sharing at
//! least one case-insensitive name token with the query, in insertion order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::apis::{
    ApiError, ApiResult, AttributeTypeRegistry, ConceptRegistry, IdentifierTypeRegistry,
    IdentityMappingStore, LocationDirectory, ObservationStore, RecordStore, UserDirectory,
};
use crate::types::{
    AttributeType, CandidateRecord, Concept, IdentifierType, IdentityMapping, Location,
    Observation, StoredRecord, User,
};

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> ApiResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| ApiError::from(format!("poisoned {} lock", name)))
}

fn snapshot<T: Clone>(mutex: &Mutex<T>) -> T {
    match mutex.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn name_tokens(name: &str) -> Vec<String> {
    name.split_whitespace().map(str::to_lowercase).collect()
}

pub struct InMemoryRecordStore {
    records: Mutex<Vec<StoredRecord>>,
    next_record_id: AtomicUsize,
    writes: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            next_record_id: AtomicUsize::new(1),
            writes: AtomicUsize::new(0),
        }
    }

    /// Seeds the store. Seeding does not count as a write.
    pub fn with_records(records: Vec<StoredRecord>) -> Self {
        let next = records
            .iter()
            .map(|record| record.record_id)
            .max()
            .map_or(1, |max| {
                max.checked_add(1)
                    .map_or(usize::MAX, |next| usize::try_from(next.max(1)).unwrap_or(usize::MAX))
            });
        Self {
            records: Mutex::new(records),
            next_record_id: AtomicUsize::new(next),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn records(&self) -> Vec<StoredRecord> {
        snapshot(&self.records)
    }

    pub fn get(&self, uuid: &str) -> Option<StoredRecord> {
        self.records().into_iter().find(|record| record.uuid == uuid)
    }

    /// Number of `create` and `save` calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_by_external_id(&self, external_id: &str) -> ApiResult<Option<StoredRecord>> {
        let records = lock(&self.records, "record store")?;
        Ok(records
            .iter()
            .find(|record| record.uuid == external_id)
            .cloned())
    }

    async fn find_by_identifier_value(&self, value: &str) -> ApiResult<Vec<StoredRecord>> {
        let records = lock(&self.records, "record store")?;
        Ok(records
            .iter()
            .filter(|record| {
                record
                    .identifiers
                    .iter()
                    .any(|identifier| identifier.value == value)
            })
            .cloned()
            .collect())
    }

    async fn find_by_full_name(&self, full_name: &str) -> ApiResult<Vec<StoredRecord>> {
        let query = name_tokens(full_name);
        let records = lock(&self.records, "record store")?;
        Ok(records
            .iter()
            .filter(|record| {
                record.names.iter().any(|name| {
                    name_tokens(&name.full_name())
                        .iter()
                        .any(|token| query.contains(token))
                })
            })
            .cloned()
            .collect())
    }

    async fn create(&self, candidate: &CandidateRecord) -> ApiResult<StoredRecord> {
        let mut records = lock(&self.records, "record store")?;
        let record_id = self
            .next_record_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map_err(|_| "record ids exhausted")?;
        let record_id = i64::try_from(record_id)?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let record = StoredRecord {
            record_id,
            uuid: Uuid::now_v7().to_string(),
            identifiers: Vec::new(),
            names: candidate.name.iter().cloned().collect(),
            gender: candidate.gender.clone(),
            birth_date: candidate.birth_date,
            birth_date_estimated: candidate.birth_date_estimated,
            addresses: candidate.addresses.clone(),
            attributes: candidate.attributes.clone(),
            deceased: candidate.deceased,
            death_date: candidate.death_date,
            changed_by: candidate.changed_by.clone(),
        };
        let record = candidate
            .identifiers
            .iter()
            .cloned()
            .fold(record, |mut record, identifier| {
                record.add_identifier(identifier);
                record
            });

        records.push(record.clone());
        Ok(record)
    }

    async fn save(&self, record: &StoredRecord) -> ApiResult<()> {
        let mut records = lock(&self.records, "record store")?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        match records.iter_mut().find(|stored| stored.uuid == record.uuid) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(format!("no record with uuid {}", record.uuid).into()),
        }
    }
}

#[derive(Default)]
pub struct InMemoryIdentityMappingStore {
    mappings: Mutex<HashMap<String, IdentityMapping>>,
}

impl InMemoryIdentityMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mappings(&self) -> HashMap<String, IdentityMapping> {
        snapshot(&self.mappings)
    }
}

#[async_trait]
impl IdentityMappingStore for InMemoryIdentityMappingStore {
    async fn find_by_temporary_id(
        &self,
        temporary_id: &str,
    ) -> ApiResult<Option<IdentityMapping>> {
        let mappings = lock(&self.mappings, "identity mapping")?;
        Ok(mappings.get(temporary_id).cloned())
    }

    async fn save(&self, mapping: &IdentityMapping) -> ApiResult<()> {
        let mut mappings = lock(&self.mappings, "identity mapping")?;
        mappings.insert(mapping.temporary_id.clone(), mapping.clone());
        Ok(())
    }
}

/// Lookup registries and directories backed by plain vectors.
#[derive(Default)]
pub struct InMemoryRegistry {
    identifier_types: Vec<IdentifierType>,
    attribute_types: Vec<AttributeType>,
    concepts: Vec<Concept>,
    locations: Vec<Location>,
    users: Vec<User>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identifier_type(mut self, id: i64, name: &str) -> Self {
        self.identifier_types.push(IdentifierType {
            id,
            name: name.to_owned(),
        });
        self
    }

    pub fn with_attribute_type(mut self, id: i64, name: &str) -> Self {
        self.attribute_types.push(AttributeType {
            id,
            name: name.to_owned(),
        });
        self
    }

    pub fn with_concept(mut self, id: i64, name: &str) -> Self {
        self.concepts.push(Concept {
            id,
            name: name.to_owned(),
        });
        self
    }

    pub fn with_location(mut self, id: i64, name: &str) -> Self {
        self.locations.push(Location {
            id,
            name: name.to_owned(),
        });
        self
    }

    pub fn with_user(mut self, id: i64, username: &str) -> Self {
        self.users.push(User {
            id,
            username: username.to_owned(),
        });
        self
    }
}

#[async_trait]
impl IdentifierTypeRegistry for InMemoryRegistry {
    async fn find_by_name(&self, name: &str) -> ApiResult<Option<IdentifierType>> {
        Ok(self
            .identifier_types
            .iter()
            .find(|identifier_type| identifier_type.name == name)
            .cloned())
    }
}

#[async_trait]
impl AttributeTypeRegistry for InMemoryRegistry {
    async fn find_by_name(&self, name: &str) -> ApiResult<Option<AttributeType>> {
        Ok(self
            .attribute_types
            .iter()
            .find(|attribute_type| attribute_type.name == name)
            .cloned())
    }
}

#[async_trait]
impl ConceptRegistry for InMemoryRegistry {
    async fn find_by_name(&self, name: &str) -> ApiResult<Option<Concept>> {
        Ok(self
            .concepts
            .iter()
            .find(|concept| concept.name == name)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> ApiResult<Option<Concept>> {
        Ok(self.concepts.iter().find(|concept| concept.id == id).cloned())
    }
}

#[async_trait]
impl LocationDirectory for InMemoryRegistry {
    async fn find_by_id(&self, id: i64) -> ApiResult<Option<Location>> {
        Ok(self
            .locations
            .iter()
            .find(|location| location.id == id)
            .cloned())
    }
}

#[async_trait]
impl UserDirectory for InMemoryRegistry {
    async fn find_by_username(&self, username: &str) -> ApiResult<Option<User>> {
        Ok(self
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryObservationStore {
    observations: Mutex<Vec<Observation>>,
}

impl InMemoryObservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<Observation> {
        snapshot(&self.observations)
    }
}

#[async_trait]
impl ObservationStore for InMemoryObservationStore {
    async fn save(&self, observation: &Observation) -> ApiResult<()> {
        lock(&self.observations, "observation store")?.push(observation.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PersonName;

    fn record(record_id: i64, uuid: &str, given: &str, family: &str) -> StoredRecord {
        StoredRecord {
            record_id,
            uuid: uuid.to_owned(),
            names: vec![PersonName::new(given, family)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_find_by_full_name_matches_shared_tokens_in_order() {
        let store = InMemoryRecordStore::with_records(vec![
            record(1, "a", "John", "Otieno"),
            record(2, "b", "Mary", "Achieng"),
            record(3, "c", "Jon", "Otieno"),
        ]);

        let hits = store.find_by_full_name("JOHN otieno").await.unwrap();
        let uuids: Vec<_> = hits.iter().map(|r| r.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_create_assigns_new_uuid_and_counts_write() {
        let store = InMemoryRecordStore::with_records(vec![record(7, "a", "John", "Otieno")]);
        let candidate = CandidateRecord {
            external_id: Some("temp-1".to_owned()),
            name: Some(PersonName::new("Mary", "Achieng")),
            ..Default::default()
        };

        let created = store.create(&candidate).await.unwrap();

        assert_ne!(created.uuid, "temp-1");
        assert_eq!(created.record_id, 8);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_create_fails_once_record_ids_are_exhausted() {
        let store = InMemoryRecordStore::with_records(vec![record(i64::MAX, "a", "John", "Otieno")]);
        let candidate = CandidateRecord {
            name: Some(PersonName::new("Mary", "Achieng")),
            ..Default::default()
        };

        assert!(store.create(&candidate).await.is_err());
        assert_eq!(store.write_count(), 0);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_save_unknown_record_fails() {
        let store = InMemoryRecordStore::new();
        let result = store.save(&record(1, "missing", "A", "B")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_registry_lookups() {
        let registry = InMemoryRegistry::new()
            .with_identifier_type(1, "OpenMRS ID")
            .with_concept(1054, "Civil status")
            .with_location(3, "Moi Teaching and Referral Hospital");

        let identifier_type = IdentifierTypeRegistry::find_by_name(&registry, "OpenMRS ID")
            .await
            .unwrap();
        assert_eq!(identifier_type.map(|t| t.id), Some(1));
        assert!(ConceptRegistry::find_by_id(&registry, 1054)
            .await
            .unwrap()
            .is_some());
        assert!(LocationDirectory::find_by_id(&registry, 4)
            .await
            .unwrap()
            .is_none());
    }
}
