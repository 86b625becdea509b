//! Lookup metadata for running the pipelines against the in-memory collaborators.

use std::fs;

use serde::Deserialize;

use registration_processor::memory::InMemoryRegistry;

use crate::error::WorkerError;

#[derive(Debug, Deserialize)]
struct NamedEntry {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserEntry {
    id: i64,
    username: String,
}

/// The contents of a metadata file. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MetadataSeed {
    identifier_types: Vec<NamedEntry>,
    attribute_types: Vec<NamedEntry>,
    concepts: Vec<NamedEntry>,
    locations: Vec<NamedEntry>,
    users: Vec<UserEntry>,
}

impl MetadataSeed {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn load(path: &str) -> Result<Self, WorkerError> {
        let metadata_error = |reason: String| WorkerError::MetadataError {
            path: path.to_owned(),
            reason,
        };

        let raw = fs::read_to_string(path).map_err(|e| metadata_error(e.to_string()))?;
        Self::from_json(&raw).map_err(|e| metadata_error(e.to_string()))
    }

    pub fn into_registry(self) -> InMemoryRegistry {
        let mut registry = InMemoryRegistry::new();
        for entry in self.identifier_types {
            registry = registry.with_identifier_type(entry.id, &entry.name);
        }
        for entry in self.attribute_types {
            registry = registry.with_attribute_type(entry.id, &entry.name);
        }
        for entry in self.concepts {
            registry = registry.with_concept(entry.id, &entry.name);
        }
        for entry in self.locations {
            registry = registry.with_location(entry.id, &entry.name);
        }
        for entry in self.users {
            registry = registry.with_user(entry.id, &entry.username);
        }
        registry
    }
}
