use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// An item delivered by the queue. The discriminator selects the pipeline and the payload is the
/// JSON document the pipeline reads its fields from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueData {
    pub id: String,
    pub discriminator: String,
    pub payload: String,
}

impl QueueData {
    pub fn new(id: &str, discriminator: &str, payload: &str) -> Self {
        Self {
            id: id.to_owned(),
            discriminator: discriminator.to_owned(),
            payload: payload.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierType {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeType {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concept {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub identifier_type: IdentifierType,
    pub value: String,
    pub location: Option<Location>,
    pub preferred: bool,
}

impl Identifier {
    pub fn new(identifier_type: IdentifierType, value: &str) -> Self {
        Self {
            identifier_type,
            value: value.to_owned(),
            location: None,
            preferred: false,
        }
    }

    /// Identifiers are unique by type and value within a record.
    pub fn same_identity(&self, other: &Identifier) -> bool {
        self.identifier_type.name == other.identifier_type.name && self.value == other.value
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonName {
    pub given_name: Option<String>,
    pub middle_name: Option<String>,
    pub family_name: Option<String>,
}

impl PersonName {
    pub fn new(given_name: &str, family_name: &str) -> Self {
        Self {
            given_name: Some(given_name.to_owned()),
            middle_name: None,
            family_name: Some(family_name.to_owned()),
        }
    }

    /// Non-blank parts joined by single spaces, in given / middle / family order.
    pub fn full_name(&self) -> String {
        [&self.given_name, &self.middle_name, &self.family_name]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_blank(&self) -> bool {
        self.full_name().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub address3: Option<String>,
    pub address4: Option<String>,
    pub address5: Option<String>,
    pub address6: Option<String>,
    pub city_village: Option<String>,
    pub county_district: Option<String>,
    pub state_province: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

impl Address {
    pub fn is_blank(&self) -> bool {
        [
            &self.address1,
            &self.address2,
            &self.address3,
            &self.address4,
            &self.address5,
            &self.address6,
            &self.city_village,
            &self.county_district,
            &self.state_province,
            &self.country,
            &self.postal_code,
        ]
        .into_iter()
        .all(|part| part.as_deref().map_or(true, |p| p.trim().is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub attribute_type: AttributeType,
    pub value: String,
}

/// A record built from a single payload. It only lives for the duration of one pipeline run and
/// is never persisted as-is: the record store either rejects it as a duplicate, merges it into an
/// existing record, or creates a new record from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateRecord {
    pub external_id: Option<String>,
    pub identifiers: Vec<Identifier>,
    pub name: Option<PersonName>,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub birth_date_estimated: bool,
    pub addresses: Vec<Address>,
    pub attributes: Vec<Attribute>,
    pub deceased: bool,
    pub death_date: Option<NaiveDate>,
    pub changed_by: Option<User>,
}

impl CandidateRecord {
    /// The preferred identifier if one is flagged, otherwise the first identifier.
    pub fn preferred_identifier(&self) -> Option<&Identifier> {
        self.identifiers
            .iter()
            .find(|identifier| identifier.preferred)
            .or_else(|| self.identifiers.first())
    }

    pub fn full_name(&self) -> String {
        self.name
            .as_ref()
            .map(PersonName::full_name)
            .unwrap_or_default()
    }
}

/// A record as held by the external record store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredRecord {
    pub record_id: i64,
    pub uuid: String,
    pub identifiers: Vec<Identifier>,
    pub names: Vec<PersonName>,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub birth_date_estimated: bool,
    pub addresses: Vec<Address>,
    pub attributes: Vec<Attribute>,
    pub deceased: bool,
    pub death_date: Option<NaiveDate>,
    pub changed_by: Option<User>,
}

impl StoredRecord {
    /// The name used for matching. Records keep every name they were ever given, the first one is
    /// the primary name.
    pub fn primary_name(&self) -> Option<&PersonName> {
        self.names.first()
    }

    pub fn preferred_identifier(&self) -> Option<&Identifier> {
        self.identifiers
            .iter()
            .find(|identifier| identifier.preferred)
            .or_else(|| self.identifiers.first())
    }

    /// Adds an identifier unless one with the same type and value is already present. At most one
    /// identifier stays preferred.
    pub fn add_identifier(&mut self, mut identifier: Identifier) {
        if self
            .identifiers
            .iter()
            .any(|existing| existing.same_identity(&identifier))
        {
            return;
        }
        if identifier.preferred && self.identifiers.iter().any(|existing| existing.preferred) {
            identifier.preferred = false;
        }
        self.identifiers.push(identifier);
    }
}

/// Association from the temporary id a client generated for a registration to the id the record
/// store assigned when the registration was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMapping {
    pub temporary_id: String,
    pub assigned_id: String,
}

/// A coded observation derived from a registration payload, e.g. marital status.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub person_uuid: String,
    pub question: Concept,
    pub value_coded: Concept,
    pub location: Option<Location>,
    pub observed_at: DateTime<Utc>,
}

/// What a successful pipeline run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A new record was created from the payload.
    Registered {
        record_uuid: String,
        temporary_id: Option<String>,
    },
    /// The registration was committed by an earlier delivery, nothing was written.
    AlreadyRegistered {
        temporary_id: String,
        assigned_id: String,
    },
    /// An existing record was updated with the payload's demographics.
    Updated { record_uuid: String },
}

impl ProcessOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::Registered { .. } => "registered",
            ProcessOutcome::AlreadyRegistered { .. } => "already_registered",
            ProcessOutcome::Updated { .. } => "updated",
        }
    }
}
