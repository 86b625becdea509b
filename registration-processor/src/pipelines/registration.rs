//! Registration of new patients from client-generated records.
//!
//! The client assigns a temporary uuid when the patient is first registered offline. Once the
//! registration is committed the temporary uuid is mapped to the uuid the record store assigned,
//! so a redelivered item is recognized and skipped before anything is written.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tracing::{debug, info};

use super::{
    collaborator, commit, create_attribute, create_identifier, find_location, other_identifiers,
    parse_payload, ProcessorContext,
};
use crate::config::Config;
use crate::errors::{ErrorAggregate, LookupKind, ProcessResult, ProcessingError};
use crate::extract::{FieldPath, Payload};
use crate::metrics_consts::OBSERVATIONS_SAVED;
use crate::resolver::MatchResult;
use crate::types::{
    Address, CandidateRecord, Concept, IdentityMapping, Location, Observation, PersonName,
    ProcessOutcome, QueueData,
};

const TEMPORARY_ID: FieldPath = FieldPath::new("patient", "patient.uuid");
const MEDICAL_RECORD_NUMBER: FieldPath = FieldPath::new("patient", "patient.medical_record_number");
const BIRTH_DATE: FieldPath = FieldPath::new("patient", "patient.birth_date");
const BIRTH_DATE_ESTIMATED: FieldPath = FieldPath::new("patient", "patient.birthdate_estimated");
const SEX: FieldPath = FieldPath::new("patient", "patient.sex");
const GIVEN_NAME: FieldPath = FieldPath::new("patient", "patient.given_name");
const MIDDLE_NAME: FieldPath = FieldPath::new("patient", "patient.middle_name");
const FAMILY_NAME: FieldPath = FieldPath::new("patient", "patient.family_name");
const DECEASED: FieldPath = FieldPath::new("patient", "patient.deceased");
const DATE_OF_DEATH: FieldPath = FieldPath::new("patient", "patient.date_of_death");

const POSTAL_ADDRESS: FieldPath = FieldPath::new("patient", "patient.postal_address");
const LANDMARK: FieldPath = FieldPath::new("patient", "patient.landmark");
const SCHOOL_OR_EMPLOYER_ADDRESS: FieldPath =
    FieldPath::new("patient", "patient.school_or_employer_address");
const DIVISION: FieldPath = FieldPath::new("patient", "patient.division");
const SUB_LOCATION: FieldPath = FieldPath::new("patient", "patient.sub_location");
const LOCATION: FieldPath = FieldPath::new("patient", "patient.location");
const COUNTY: FieldPath = FieldPath::new("patient", "patient.county");
const VILLAGE: FieldPath = FieldPath::new("patient", "patient.village");
const DISTRICT: FieldPath = FieldPath::new("patient", "patient.district");
const PROVINCE: FieldPath = FieldPath::new("patient", "patient.province");
const HOUSE_OR_PLOT_NUMBER: FieldPath = FieldPath::new("patient", "patient.house_or_plot_number");

const ATTRIBUTES: [(FieldPath, &str); 6] = [
    (FieldPath::new("patient", "patient.phone_number"), "Telephone contact"),
    (FieldPath::new("patient", "patient.subchief"), "Subchief name"),
    (FieldPath::new("patient", "patient.next_of_kin_name"), "Next of kin name"),
    (
        FieldPath::new("patient", "patient.next_of_kin_relationship"),
        "Next of kin relationship",
    ),
    (FieldPath::new("patient", "patient.next_of_kin_contact"), "Next of kin contact"),
    (FieldPath::new("patient", "patient.next_of_kin_address"), "Next of kin address"),
];

/// Coded answers recorded as observations, keyed by the question concept's name.
const CODED_OBSERVATIONS: [(FieldPath, &str); 3] = [
    (FieldPath::new("patient", "patient.marital_status"), "Civil status"),
    (FieldPath::new("patient", "patient.occupation"), "Occupation"),
    (FieldPath::new("patient", "patient.education"), "Education"),
];

const OTHER_IDENTIFIER_TYPE: FieldPath = FieldPath::new("observation", "other_identifier_type");
const OTHER_IDENTIFIER_VALUE: FieldPath = FieldPath::new("observation", "other_identifier_value");
const ENCOUNTER_LOCATION: FieldPath = FieldPath::new("encounter", "encounter.location_id");

struct CodedAnswer {
    question: Concept,
    value_coded: Concept,
}

struct NewRegistration {
    candidate: CandidateRecord,
    temporary_id: Option<String>,
    location: Option<Location>,
    answers: Vec<CodedAnswer>,
}

enum RegistrationPlan {
    AlreadyRegistered(IdentityMapping),
    Create(Box<NewRegistration>),
}

pub struct RegistrationPipeline {
    discriminator: String,
    priority: u32,
    identifier_type: String,
    context: Arc<ProcessorContext>,
}

impl RegistrationPipeline {
    pub fn new(config: &Config, context: Arc<ProcessorContext>) -> Self {
        Self {
            discriminator: config.registration_discriminator.clone(),
            priority: config.registration_priority,
            identifier_type: config.registration_identifier_type.clone(),
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
        Ok(matches!(self.plan(item).await?, RegistrationPlan::Create(_)))
    }

    pub async fn process(&self, item: &QueueData) -> ProcessResult<ProcessOutcome> {
        match self.plan(item).await? {
            RegistrationPlan::AlreadyRegistered(mapping) => Ok(ProcessOutcome::AlreadyRegistered {
                temporary_id: mapping.temporary_id,
                assigned_id: mapping.assigned_id,
            }),
            RegistrationPlan::Create(registration) => self.commit(*registration).await,
        }
    }

    async fn plan(&self, item: &QueueData) -> ProcessResult<RegistrationPlan> {
        let payload = parse_payload(item)?;
        let mut errors = ErrorAggregate::new();

        let temporary_id = payload.read_non_blank(TEMPORARY_ID, &mut errors);
        if let Some(temporary_id) = &temporary_id {
            match self
                .context
                .identity_mappings
                .find_by_temporary_id(temporary_id)
                .await
            {
                Ok(Some(mapping)) => {
                    info!(
                        temporary_id = temporary_id.as_str(),
                        assigned_id = mapping.assigned_id.as_str(),
                        "registration already committed, skipping"
                    );
                    return errors.into_result(RegistrationPlan::AlreadyRegistered(mapping));
                }
                Ok(None) => {}
                Err(e) => errors.push(collaborator("find identity mapping", e)),
            }
        }

        let location = match payload.read_non_blank(ENCOUNTER_LOCATION, &mut errors) {
            Some(location_id) => {
                find_location(&self.context, ENCOUNTER_LOCATION, &location_id, &mut errors).await
            }
            None => None,
        };

        let candidate = self
            .candidate(&payload, temporary_id.clone(), location.as_ref(), &mut errors)
            .await;
        let answers = self.coded_answers(&payload, &mut errors).await;

        match self.context.resolver().resolve(&candidate, false).await {
            Ok(MatchResult::Matched { record, .. }) => {
                errors.push(ProcessingError::DuplicateDetected {
                    identifier: record
                        .preferred_identifier()
                        .map(|identifier| identifier.value.clone()),
                    record_uuid: record.uuid,
                });
            }
            Ok(MatchResult::NoMatch) => {}
            Err(e) => errors.push(collaborator("find similar record", e)),
        }

        errors.into_result(RegistrationPlan::Create(Box::new(NewRegistration {
            candidate,
            temporary_id,
            location,
            answers,
        })))
    }

    async fn candidate(
        &self,
        payload: &Payload,
        temporary_id: Option<String>,
        location: Option<&Location>,
        errors: &mut ErrorAggregate,
    ) -> CandidateRecord {
        let mut identifiers = Vec::new();
        let medical_record_number = payload.read_string(MEDICAL_RECORD_NUMBER, errors);
        if let Some(mut preferred) = create_identifier(
            &self.context,
            &self.identifier_type,
            medical_record_number.as_deref(),
            errors,
        )
        .await
        {
            preferred.preferred = true;
            identifiers.push(preferred);
        }
        identifiers.extend(
            other_identifiers(
                &self.context,
                payload,
                OTHER_IDENTIFIER_TYPE,
                OTHER_IDENTIFIER_VALUE,
                errors,
            )
            .await,
        );
        for identifier in &mut identifiers {
            identifier.location = location.cloned();
        }

        let name = PersonName {
            given_name: payload.read_string(GIVEN_NAME, errors),
            middle_name: payload.read_non_blank(MIDDLE_NAME, errors),
            family_name: payload.read_string(FAMILY_NAME, errors),
        };
        let address = Address {
            address1: payload.read_non_blank(POSTAL_ADDRESS, errors),
            address2: payload.read_non_blank(LANDMARK, errors),
            address3: payload.read_non_blank(SCHOOL_OR_EMPLOYER_ADDRESS, errors),
            address4: payload.read_non_blank(DIVISION, errors),
            address5: payload.read_non_blank(SUB_LOCATION, errors),
            address6: payload.read_non_blank(LOCATION, errors),
            city_village: payload.read_non_blank(VILLAGE, errors),
            county_district: payload.read_non_blank(DISTRICT, errors),
            state_province: payload.read_non_blank(PROVINCE, errors),
            country: payload.read_non_blank(COUNTY, errors),
            postal_code: payload.read_non_blank(HOUSE_OR_PLOT_NUMBER, errors),
        };

        let mut attributes = Vec::new();
        for (path, type_name) in ATTRIBUTES {
            let value = payload.read_string(path, errors);
            if let Some(attribute) = create_attribute(&self.context, type_name, value, errors).await
            {
                attributes.push(attribute);
            }
        }

        let deceased = payload.read_bool(DECEASED, errors);
        let death_date = if deceased {
            payload.read_date(DATE_OF_DEATH, errors)
        } else {
            None
        };

        CandidateRecord {
            external_id: temporary_id,
            identifiers,
            name: (!name.is_blank()).then_some(name),
            gender: payload.read_non_blank(SEX, errors),
            birth_date: payload.read_date(BIRTH_DATE, errors),
            birth_date_estimated: payload.read_bool(BIRTH_DATE_ESTIMATED, errors),
            addresses: (!address.is_blank()).then_some(address).into_iter().collect(),
            attributes,
            deceased,
            death_date,
            changed_by: None,
        }
    }

    /// Resolves `<concept id>^<label>` answers so an unknown code blocks the commit.
    async fn coded_answers(
        &self,
        payload: &Payload,
        errors: &mut ErrorAggregate,
    ) -> Vec<CodedAnswer> {
        let mut answers = Vec::new();
        for (path, question_name) in CODED_OBSERVATIONS {
            let Some(value) = payload.read_non_blank(path, errors) else {
                continue;
            };
            let code = value.split('^').next().unwrap_or_default().trim();
            let Ok(concept_id) = code.parse::<i64>() else {
                errors.push(ProcessingError::extraction(
                    path,
                    format!("'{}' is not a coded value", value),
                ));
                continue;
            };

            let question = match self.context.concepts.find_by_name(question_name).await {
                Ok(Some(question)) => Some(question),
                Ok(None) => {
                    errors.push(ProcessingError::lookup_miss(LookupKind::Concept, question_name));
                    None
                }
                Err(e) => {
                    errors.push(collaborator("find concept", e));
                    None
                }
            };
            let value_coded = match self.context.concepts.find_by_id(concept_id).await {
                Ok(Some(value_coded)) => Some(value_coded),
                Ok(None) => {
                    errors.push(ProcessingError::lookup_miss(LookupKind::CodedValue, code));
                    None
                }
                Err(e) => {
                    errors.push(collaborator("find concept", e));
                    None
                }
            };

            if let (Some(question), Some(value_coded)) = (question, value_coded) {
                answers.push(CodedAnswer {
                    question,
                    value_coded,
                });
            }
        }
        answers
    }

    async fn commit(&self, registration: NewRegistration) -> ProcessResult<ProcessOutcome> {
        let NewRegistration {
            candidate,
            temporary_id,
            location,
            answers,
        } = registration;

        let record = self
            .context
            .record_store
            .create(&candidate)
            .await
            .map_err(|e| commit("create record", e))?;
        debug!(record_uuid = record.uuid.as_str(), "created record");

        if let Some(temporary_id) = &temporary_id {
            let mapping = IdentityMapping {
                temporary_id: temporary_id.clone(),
                assigned_id: record.uuid.clone(),
            };
            self.context
                .identity_mappings
                .save(&mapping)
                .await
                .map_err(|e| commit("save identity mapping", e))?;
        }

        let mut errors = ErrorAggregate::new();
        let observed_at = Utc::now();
        for answer in answers {
            let observation = Observation {
                person_uuid: record.uuid.clone(),
                question: answer.question,
                value_coded: answer.value_coded,
                location: location.clone(),
                observed_at,
            };
            match self.context.observations.save(&observation).await {
                Ok(()) => counter!(OBSERVATIONS_SAVED).increment(1),
                Err(e) => errors.push(commit("save observation", e)),
            }
        }

        errors.into_result(ProcessOutcome::Registered {
            record_uuid: record.uuid,
            temporary_id,
        })
    }
}
