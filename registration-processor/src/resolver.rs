use std::fmt;
use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use crate::apis::{ApiResult, IdentityMappingStore, RecordStore};
use crate::metrics_consts::CANDIDATES_RESOLVED;
use crate::types::{CandidateRecord, PersonName, StoredRecord};

/// Names closer than this edit distance are considered the same name.
pub const MAX_NAME_DISTANCE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    ExternalId,
    TemporaryMapping,
    IdentifierValue,
    Demographics,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::ExternalId => "external_id",
            MatchStrategy::TemporaryMapping => "temporary_mapping",
            MatchStrategy::IdentifierValue => "identifier_value",
            MatchStrategy::Demographics => "demographics",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    NoMatch,
    Matched {
        record: StoredRecord,
        strategy: MatchStrategy,
    },
}

impl MatchResult {
    pub fn record(&self) -> Option<&StoredRecord> {
        match self {
            MatchResult::NoMatch => None,
            MatchResult::Matched { record, .. } => Some(record),
        }
    }

    pub fn into_record(self) -> Option<StoredRecord> {
        match self {
            MatchResult::NoMatch => None,
            MatchResult::Matched { record, .. } => Some(record),
        }
    }
}

/// Edit distance counting single character insertions, deletions and substitutions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, a_char) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

fn names_close(a: Option<&str>, b: Option<&str>) -> bool {
    let a = a.unwrap_or_default().to_lowercase();
    let b = b.unwrap_or_default().to_lowercase();
    levenshtein(&a, &b) < MAX_NAME_DISTANCE
}

fn same_gender(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.to_lowercase() == b.to_lowercase(),
        (None, None) => true,
        _ => false,
    }
}

/// Whether `stored` describes the same person as `candidate` by name, gender and birth date.
pub fn is_demographic_match(stored: &StoredRecord, candidate: &CandidateRecord) -> bool {
    let (Some(stored_name), Some(candidate_name)) = (stored.primary_name(), candidate.name.as_ref())
    else {
        return false;
    };
    if stored_name.is_blank() || candidate_name.is_blank() {
        return false;
    }

    let same_birth_date = matches!(
        (stored.birth_date, candidate.birth_date),
        (Some(stored_date), Some(candidate_date)) if stored_date == candidate_date
    );

    same_gender(stored.gender.as_deref(), candidate.gender.as_deref())
        && same_birth_date
        && name_parts_close(stored_name, candidate_name)
}

fn name_parts_close(stored: &PersonName, candidate: &PersonName) -> bool {
    names_close(stored.given_name.as_deref(), candidate.given_name.as_deref())
        && names_close(stored.family_name.as_deref(), candidate.family_name.as_deref())
}

/// First record, in the order given, that demographically matches the candidate.
pub fn find_matching_record<'a>(
    records: &'a [StoredRecord],
    candidate: &CandidateRecord,
) -> Option<&'a StoredRecord> {
    records
        .iter()
        .find(|record| is_demographic_match(record, candidate))
}

/// Locates the stored record a candidate refers to.
#[derive(Clone)]
pub struct IdentityResolver {
    record_store: Arc<dyn RecordStore>,
    identity_mappings: Arc<dyn IdentityMappingStore>,
}

impl IdentityResolver {
    pub fn new(
        record_store: Arc<dyn RecordStore>,
        identity_mappings: Arc<dyn IdentityMappingStore>,
    ) -> Self {
        Self {
            record_store,
            identity_mappings,
        }
    }

    /// Tries each strategy in turn and stops at the first hit. Temporary ids are only followed
    /// through the identity mapping when `allow_temporary_mapping` is set.
    pub async fn resolve(
        &self,
        candidate: &CandidateRecord,
        allow_temporary_mapping: bool,
    ) -> ApiResult<MatchResult> {
        let external_id = candidate
            .external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        if let Some(external_id) = external_id {
            if let Some(record) = self.record_store.find_by_external_id(external_id).await? {
                return Ok(matched(record, MatchStrategy::ExternalId));
            }

            if allow_temporary_mapping {
                if let Some(mapping) = self
                    .identity_mappings
                    .find_by_temporary_id(external_id)
                    .await?
                {
                    if let Some(record) = self
                        .record_store
                        .find_by_external_id(&mapping.assigned_id)
                        .await?
                    {
                        return Ok(matched(record, MatchStrategy::TemporaryMapping));
                    }
                }
            }
        }

        if let Some(value) = identifier_value(candidate) {
            let hits = self.record_store.find_by_identifier_value(value).await?;
            if let Some(record) = find_matching_record(&hits, candidate) {
                return Ok(matched(record.clone(), MatchStrategy::IdentifierValue));
            }
        }

        let full_name = candidate.full_name();
        if !full_name.is_empty() {
            let hits = self.record_store.find_by_full_name(&full_name).await?;
            if let Some(record) = find_matching_record(&hits, candidate) {
                return Ok(matched(record.clone(), MatchStrategy::Demographics));
            }
        }

        Ok(MatchResult::NoMatch)
    }
}

/// The preferred identifier's value when it has one, otherwise the first non-empty value.
fn identifier_value(candidate: &CandidateRecord) -> Option<&str> {
    let non_empty = |value: &str| !value.trim().is_empty();
    candidate
        .identifiers
        .iter()
        .find(|identifier| identifier.preferred && non_empty(&identifier.value))
        .or_else(|| {
            candidate
                .identifiers
                .iter()
                .find(|identifier| non_empty(&identifier.value))
        })
        .map(|identifier| identifier.value.as_str())
}

fn matched(record: StoredRecord, strategy: MatchStrategy) -> MatchResult {
    debug!(
        record_uuid = record.uuid.as_str(),
        strategy = %strategy,
        "resolved candidate to stored record"
    );
    counter!(CANDIDATES_RESOLVED, "strategy" => strategy.as_str()).increment(1);
    MatchResult::Matched { record, strategy }
}
