use std::sync::Arc;

use tracing::debug;

use super::{
    collaborator, commit, create_attribute, create_identifier, find_location, other_identifiers,
    parse_payload, ProcessorContext,
};
use crate::config::Config;
use crate::errors::{ErrorAggregate, LookupKind, ProcessResult, ProcessingError, SensitiveField};
use crate::extract::{FieldPath, Payload};
use crate::gate::{gate, FieldChangeRequest, GateDecision};
use crate::merge;
use crate::resolver::MatchResult;
use crate::types::{
    Address, CandidateRecord, PersonName, ProcessOutcome, QueueData, StoredRecord,
};

const UUID: FieldPath = FieldPath::new("patient", "patient.uuid");
const MEDICAL_RECORD_NUMBER: FieldPath = FieldPath::new("patient", "patient.medical_record_number");
const GIVEN_NAME: FieldPath = FieldPath::new("patient", "patient.given_name");
const MIDDLE_NAME: FieldPath = FieldPath::new("patient", "patient.middle_name");
const FAMILY_NAME: FieldPath = FieldPath::new("patient", "patient.family_name");
const SEX: FieldPath = FieldPath::new("patient", "patient.sex");
const BIRTH_DATE: FieldPath = FieldPath::new("patient", "patient.birth_date");

const UPDATE: &str = "demographicsupdate";
const OTHER_IDENTIFIER_TYPE: FieldPath =
    FieldPath::new(UPDATE, "demographicsupdate.other_identifier_type");
const OTHER_IDENTIFIER_VALUE: FieldPath =
    FieldPath::new(UPDATE, "demographicsupdate.other_identifier_value");
const NEW_BIRTH_DATE: FieldPath = FieldPath::new(UPDATE, "demographicsupdate.birth_date");
const BIRTH_DATE_ESTIMATED: FieldPath =
    FieldPath::new(UPDATE, "demographicsupdate.birthdate_estimated");
const BIRTH_DATE_CHANGE_VALIDATED: FieldPath =
    FieldPath::new(UPDATE, "demographicsupdate.birthdate_change_validated");
const NEW_SEX: FieldPath = FieldPath::new(UPDATE, "demographicsupdate.sex");
const GENDER_CHANGE_VALIDATED: FieldPath =
    FieldPath::new(UPDATE, "demographicsupdate.gender_change_validated");
const NEW_GIVEN_NAME: FieldPath = FieldPath::new(UPDATE, "demographicsupdate.given_name");
const NEW_MIDDLE_NAME: FieldPath = FieldPath::new(UPDATE, "demographicsupdate.middle_name");
const NEW_FAMILY_NAME: FieldPath = FieldPath::new(UPDATE, "demographicsupdate.family_name");
const COUNTY: FieldPath = FieldPath::new(UPDATE, "demographicsupdate.county");
const LOCATION: FieldPath = FieldPath::new(UPDATE, "demographicsupdate.location");
const SUB_LOCATION: FieldPath = FieldPath::new(UPDATE, "demographicsupdate.sub_location");
const VILLAGE: FieldPath = FieldPath::new(UPDATE, "demographicsupdate.village");
const MOTHERS_NAME: FieldPath = FieldPath::new(UPDATE, "demographicsupdate.mothers_name");
const PHONE_NUMBER: FieldPath = FieldPath::new(UPDATE, "demographicsupdate.phone_number");

const ENCOUNTER_LOCATION: FieldPath = FieldPath::new("encounter", "encounter.location_id");
const PROVIDER: FieldPath = FieldPath::new("encounter", "encounter.provider_id");

struct UpdatePlan {
    target: StoredRecord,
    changes: CandidateRecord,
}

pub struct DemographicsUpdatePipeline {
    discriminator: String,
    priority: u32,
    identifier_type: String,
    context: Arc<ProcessorContext>,
}

impl DemographicsUpdatePipeline {
    pub fn new(config: &Config, context: Arc<ProcessorContext>) -> Self {
        Self {
            discriminator: config.demographics_update_discriminator.clone(),
            priority: config.demographics_update_priority,
            identifier_type: config.demographics_identifier_type.clone(),
            context,
        }
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub async fn validate(&self, item: &QueueData) -> ProcessResult<bool> {
        self.plan(item).await.map(|_| true)
    }

    pub async fn process(&self, item: &QueueData) -> ProcessResult<ProcessOutcome> {
        let UpdatePlan { target, changes } = self.plan(item).await?;

        let merged = merge::apply(target, &changes);
        self.context
            .record_store
            .save(&merged)
            .await
            .map_err(|e| commit("save record", e))?;
        debug!(record_uuid = merged.uuid.as_str(), "saved updated record");

        Ok(ProcessOutcome::Updated {
            record_uuid: merged.uuid,
        })
    }

    async fn plan(&self, item: &QueueData) -> ProcessResult<UpdatePlan> {
        let payload = parse_payload(item)?;
        let mut errors = ErrorAggregate::new();

        let candidate = self.candidate(&payload, &mut errors).await;
        let target = match self.context.resolver().resolve(&candidate, true).await {
            Ok(MatchResult::Matched { record, .. }) => Some(record),
            Ok(MatchResult::NoMatch) => {
                errors.push(ProcessingError::Unresolved);
                None
            }
            Err(e) => {
                errors.push(collaborator("resolve record", e));
                None
            }
        };

        // Built even without a target so the report lists every problem in the payload.
        let changes = self.changes(&payload, &mut errors).await;

        match target {
            Some(target) => errors.into_result(UpdatePlan { target, changes }),
            None => Err(errors),
        }
    }

    /// The record the update is about, as described by the `patient` section.
    async fn candidate(&self, payload: &Payload, errors: &mut ErrorAggregate) -> CandidateRecord {
        let mut identifiers = Vec::new();
        if let Some(value) = payload.read_non_blank(MEDICAL_RECORD_NUMBER, errors) {
            if let Some(mut identifier) =
                create_identifier(&self.context, &self.identifier_type, Some(&value), errors).await
            {
                identifier.preferred = true;
                identifiers.push(identifier);
            }
        }

        let name = PersonName {
            given_name: payload.read_string(GIVEN_NAME, errors),
            middle_name: payload.read_non_blank(MIDDLE_NAME, errors),
            family_name: payload.read_string(FAMILY_NAME, errors),
        };

        CandidateRecord {
            external_id: payload.read_non_blank(UUID, errors),
            identifiers,
            name: Some(name),
            gender: payload.read_non_blank(SEX, errors),
            birth_date: payload.read_date(BIRTH_DATE, errors),
            ..Default::default()
        }
    }

    /// The change set from the `demographicsupdate` section, with sensitive fields gated.
    async fn changes(&self, payload: &Payload, errors: &mut ErrorAggregate) -> CandidateRecord {
        let identifiers = other_identifiers(
            &self.context,
            payload,
            OTHER_IDENTIFIER_TYPE,
            OTHER_IDENTIFIER_VALUE,
            errors,
        )
        .await;
        let mut changes = CandidateRecord {
            identifiers,
            ..Default::default()
        };
        if !changes.identifiers.is_empty() {
            let location = match payload.read_non_blank(ENCOUNTER_LOCATION, errors) {
                Some(location_id) => {
                    find_location(&self.context, ENCOUNTER_LOCATION, &location_id, errors).await
                }
                None => {
                    errors.push(ProcessingError::lookup_miss(LookupKind::Location, "<none>"));
                    None
                }
            };
            for identifier in &mut changes.identifiers {
                identifier.location = location.clone();
            }
        }

        if let Some(birth_date) = payload.read_date(NEW_BIRTH_DATE, errors) {
            let validated = payload.read_bool(BIRTH_DATE_CHANGE_VALIDATED, errors);
            match gate(FieldChangeRequest::new(
                SensitiveField::BirthDate,
                birth_date,
                validated,
            )) {
                GateDecision::Accepted(birth_date) => {
                    changes.birth_date = Some(birth_date);
                    changes.birth_date_estimated = payload.read_bool(BIRTH_DATE_ESTIMATED, errors);
                }
                GateDecision::Rejected(error) => errors.push(error),
            }
        }

        if let Some(gender) = payload.read_non_blank(NEW_SEX, errors) {
            let validated = payload.read_bool(GENDER_CHANGE_VALIDATED, errors);
            match gate(FieldChangeRequest::new(SensitiveField::Gender, gender, validated)) {
                GateDecision::Accepted(gender) => changes.gender = Some(gender),
                GateDecision::Rejected(error) => errors.push(error),
            }
        }

        let name = PersonName {
            given_name: payload.read_non_blank(NEW_GIVEN_NAME, errors),
            middle_name: payload.read_non_blank(NEW_MIDDLE_NAME, errors),
            family_name: payload.read_non_blank(NEW_FAMILY_NAME, errors),
        };
        if !name.is_blank() {
            changes.name = Some(name);
        }

        let address = Address {
            state_province: payload.read_non_blank(COUNTY, errors),
            address6: payload.read_non_blank(LOCATION, errors),
            address5: payload.read_non_blank(SUB_LOCATION, errors),
            city_village: payload.read_non_blank(VILLAGE, errors),
            ..Default::default()
        };
        if !address.is_blank() {
            changes.addresses.push(address);
        }

        for (path, type_name) in [
            (MOTHERS_NAME, "Mother's Name"),
            (PHONE_NUMBER, "Contact Phone Number"),
        ] {
            let value = payload.read_string(path, errors);
            if let Some(attribute) = create_attribute(&self.context, type_name, value, errors).await
            {
                changes.attributes.push(attribute);
            }
        }

        if let Some(username) = payload.read_non_blank(PROVIDER, errors) {
            match self.context.users.find_by_username(&username).await {
                Ok(Some(user)) => changes.changed_by = Some(user),
                Ok(None) => errors.push(ProcessingError::lookup_miss(LookupKind::User, username)),
                Err(e) => errors.push(collaborator("find user", e)),
            }
        }

        changes
    }
}
