#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;

use registration_processor::memory::{
    InMemoryIdentityMappingStore, InMemoryObservationStore, InMemoryRecordStore, InMemoryRegistry,
};
use registration_processor::{
    Address, Config, Identifier, IdentifierType, IdentityMapping, IdentityMappingStore,
    PersonName, PipelineRegistry, ProcessOutcome, ProcessResult, ProcessorContext, QueueData,
    StoredRecord,
};

pub const REGISTRATION: &str = "json-registration";
pub const DEMOGRAPHICS_UPDATE: &str = "json-demographics-update";

/// Lookup metadata every test starts from.
pub fn metadata() -> InMemoryRegistry {
    InMemoryRegistry::new()
        .with_identifier_type(1, "OpenMRS ID")
        .with_identifier_type(2, "AMRS Universal ID")
        .with_identifier_type(3, "National ID")
        .with_identifier_type(4, "Passport")
        .with_attribute_type(1, "Telephone contact")
        .with_attribute_type(2, "Subchief name")
        .with_attribute_type(3, "Next of kin name")
        .with_attribute_type(4, "Next of kin relationship")
        .with_attribute_type(5, "Next of kin contact")
        .with_attribute_type(6, "Next of kin address")
        .with_attribute_type(7, "Mother's Name")
        .with_attribute_type(8, "Contact Phone Number")
        .with_concept(1054, "Civil status")
        .with_concept(1542, "Occupation")
        .with_concept(1712, "Education")
        .with_concept(5555, "MARRIED")
        .with_concept(1107, "NONE")
        .with_location(3, "Moi Teaching and Referral Hospital")
        .with_user(4, "clerk")
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn identifier(id: i64, type_name: &str, value: &str, preferred: bool) -> Identifier {
    let mut identifier = Identifier::new(
        IdentifierType {
            id,
            name: type_name.to_owned(),
        },
        value,
    );
    identifier.preferred = preferred;
    identifier
}

/// Mary Achieng, female, born 1990-03-14, living in Kisumu.
pub fn mary(uuid: &str) -> StoredRecord {
    StoredRecord {
        record_id: 1,
        uuid: uuid.to_owned(),
        identifiers: vec![identifier(2, "AMRS Universal ID", "555-1", true)],
        names: vec![PersonName::new("Mary", "Achieng")],
        gender: Some("F".to_owned()),
        birth_date: Some(date(1990, 3, 14)),
        addresses: vec![Address {
            city_village: Some("Kisumu".to_owned()),
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub struct TestHarness {
    pub records: Arc<InMemoryRecordStore>,
    pub mappings: Arc<InMemoryIdentityMappingStore>,
    pub observations: Arc<InMemoryObservationStore>,
    pub pipelines: PipelineRegistry,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<StoredRecord>) -> Self {
        let records = Arc::new(InMemoryRecordStore::with_records(records));
        let mappings = Arc::new(InMemoryIdentityMappingStore::new());
        let observations = Arc::new(InMemoryObservationStore::new());
        let context = Arc::new(ProcessorContext::with_registry(
            records.clone(),
            mappings.clone(),
            Arc::new(metadata()),
            observations.clone(),
        ));

        Self {
            records,
            mappings,
            observations,
            pipelines: PipelineRegistry::from_config(&Config::default_test_config(), context),
        }
    }

    pub async fn with_mapping(self, temporary_id: &str, assigned_id: &str) -> Self {
        let mapping = IdentityMapping {
            temporary_id: temporary_id.to_owned(),
            assigned_id: assigned_id.to_owned(),
        };
        IdentityMappingStore::save(self.mappings.as_ref(), &mapping)
            .await
            .unwrap();
        self
    }

    pub async fn process(&self, discriminator: &str, payload: Value) -> ProcessResult<ProcessOutcome> {
        let item = QueueData::new("queue-data-1", discriminator, &payload.to_string());
        self.pipelines.process(&item).await
    }

    pub async fn validate(&self, discriminator: &str, payload: Value) -> ProcessResult<bool> {
        let item = QueueData::new("queue-data-1", discriminator, &payload.to_string());
        self.pipelines.validate(&item).await
    }
}
