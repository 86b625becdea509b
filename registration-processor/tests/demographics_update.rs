mod common;

use serde_json::{json, Value};

use common::{date, mary, TestHarness, DEMOGRAPHICS_UPDATE};
use registration_processor::{ProcessOutcome, ProcessingError, SensitiveField};

fn update(demographics: Value) -> Value {
    json!({
        "patient": {
            "patient.uuid": "perm-1",
            "patient.medical_record_number": "555-1",
            "patient.given_name": "Mary",
            "patient.family_name": "Achieng",
            "patient.sex": "F",
            "patient.birth_date": "1990-03-14"
        },
        "demographicsupdate": demographics,
        "encounter": {
            "encounter.location_id": "3",
            "encounter.provider_id": "clerk"
        }
    })
}

#[tokio::test]
async fn test_birth_date_change_requires_validation() {
    let harness = TestHarness::with_records(vec![mary("perm-1")]);

    let errors = harness
        .process(
            DEMOGRAPHICS_UPDATE,
            update(json!({ "demographicsupdate.birth_date": "1988-01-01" })),
        )
        .await
        .unwrap_err();

    assert_eq!(
        errors.messages(),
        vec!["Change of Birth Date requires manual review"]
    );
    assert!(errors.contains(|e| matches!(
        e,
        ProcessingError::SensitiveFieldBlocked(SensitiveField::BirthDate)
    )));
    assert_eq!(harness.records.write_count(), 0);
    assert_eq!(
        harness.records.get("perm-1").unwrap().birth_date,
        Some(date(1990, 3, 14))
    );
}

#[tokio::test]
async fn test_validated_birth_date_change_applies() {
    let harness = TestHarness::with_records(vec![mary("perm-1")]);

    let outcome = harness
        .process(
            DEMOGRAPHICS_UPDATE,
            update(json!({
                "demographicsupdate.birth_date": "1988-01-01",
                "demographicsupdate.birthdate_estimated": true,
                "demographicsupdate.birthdate_change_validated": "true"
            })),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ProcessOutcome::Updated {
            record_uuid: "perm-1".to_owned()
        }
    );
    let record = harness.records.get("perm-1").unwrap();
    assert_eq!(record.birth_date, Some(date(1988, 1, 1)));
    assert!(record.birth_date_estimated);
    assert_eq!(record.changed_by.map(|user| user.username), Some("clerk".to_owned()));
}

#[tokio::test]
async fn test_gender_change_requires_validation() {
    let harness = TestHarness::with_records(vec![mary("perm-1")]);

    let errors = harness
        .process(
            DEMOGRAPHICS_UPDATE,
            update(json!({
                "demographicsupdate.sex": "M",
                "demographicsupdate.gender_change_validated": false
            })),
        )
        .await
        .unwrap_err();
    assert_eq!(errors.messages(), vec!["Change of Gender requires manual review"]);

    harness
        .process(
            DEMOGRAPHICS_UPDATE,
            update(json!({
                "demographicsupdate.sex": "M",
                "demographicsupdate.gender_change_validated": true
            })),
        )
        .await
        .unwrap();
    assert_eq!(
        harness.records.get("perm-1").unwrap().gender.as_deref(),
        Some("M")
    );
}

#[tokio::test]
async fn test_unresolvable_update_fails_without_merge() {
    let harness = TestHarness::with_records(vec![mary("perm-1")]);
    let payload = json!({
        "patient": {
            "patient.uuid": "unknown-uuid",
            "patient.given_name": "Nobody",
            "patient.family_name": "Known",
            "patient.sex": "M",
            "patient.birth_date": "1970-01-01"
        },
        "demographicsupdate": {
            "demographicsupdate.village": "Eldoret"
        }
    });

    let errors = harness.process(DEMOGRAPHICS_UPDATE, payload).await.unwrap_err();

    assert_eq!(
        errors.messages(),
        vec!["Unable to uniquely identify patient for this demographic update form data"]
    );
    assert_eq!(harness.records.write_count(), 0);
    assert_eq!(harness.records.get("perm-1").unwrap().addresses.len(), 1);
}

#[tokio::test]
async fn test_resolves_through_temporary_mapping() {
    let harness = TestHarness::with_records(vec![mary("perm-1")])
        .with_mapping("temp-9", "perm-1")
        .await;
    let mut payload = update(json!({ "demographicsupdate.phone_number": "0711111111" }));
    payload["patient"] = json!({ "patient.uuid": "temp-9" });

    let outcome = harness.process(DEMOGRAPHICS_UPDATE, payload).await.unwrap();

    assert_eq!(
        outcome,
        ProcessOutcome::Updated {
            record_uuid: "perm-1".to_owned()
        }
    );
    let record = harness.records.get("perm-1").unwrap();
    assert_eq!(record.attributes.len(), 1);
    assert_eq!(record.attributes[0].attribute_type.name, "Contact Phone Number");
    assert_eq!(record.attributes[0].value, "0711111111");
}

#[tokio::test]
async fn test_changes_are_merged_additively() {
    let harness = TestHarness::with_records(vec![mary("perm-1")]);

    harness
        .process(
            DEMOGRAPHICS_UPDATE,
            update(json!({
                "demographicsupdate.other_identifier_type": ["National ID", "Passport"],
                "demographicsupdate.other_identifier_value": ["22334455", "A1234567"],
                "demographicsupdate.given_name": "Mary",
                "demographicsupdate.family_name": "Atieno",
                "demographicsupdate.county": "Uasin Gishu",
                "demographicsupdate.village": "Kapsoya",
                "demographicsupdate.mothers_name": "Rose Achieng"
            })),
        )
        .await
        .unwrap();

    let record = harness.records.get("perm-1").unwrap();

    let identifiers: Vec<_> = record
        .identifiers
        .iter()
        .map(|i| (i.identifier_type.name.as_str(), i.value.as_str()))
        .collect();
    assert_eq!(
        identifiers,
        vec![
            ("AMRS Universal ID", "555-1"),
            ("National ID", "22334455"),
            ("Passport", "A1234567"),
        ]
    );
    assert_eq!(
        record.identifiers[1].location.as_ref().map(|l| l.id),
        Some(3)
    );

    assert_eq!(record.addresses.len(), 2);
    assert_eq!(record.addresses[1].state_province.as_deref(), Some("Uasin Gishu"));
    assert_eq!(record.addresses[1].city_village.as_deref(), Some("Kapsoya"));

    assert_eq!(record.names.len(), 2);
    assert_eq!(record.primary_name().unwrap().full_name(), "Mary Achieng");
    assert_eq!(record.attributes[0].attribute_type.name, "Mother's Name");
    assert_eq!(record.gender.as_deref(), Some("F"));
}

#[tokio::test]
async fn test_every_problem_is_reported_at_once() {
    let harness = TestHarness::with_records(vec![mary("perm-1")]);
    let mut payload = update(json!({
        "demographicsupdate.other_identifier_type": "Old ID",
        "demographicsupdate.other_identifier_value": "X-1",
        "demographicsupdate.birth_date": "1988-01-01",
        "demographicsupdate.sex": "M",
        "demographicsupdate.gender_change_validated": "true",
        "demographicsupdate.village": "Kapsoya"
    }));
    payload["encounter"]["encounter.provider_id"] = json!("nobody");

    let errors = harness.process(DEMOGRAPHICS_UPDATE, payload).await.unwrap_err();

    assert_eq!(
        errors.messages(),
        vec![
            "Unable to find identifier type with name: Old ID",
            "Change of Birth Date requires manual review",
            "Unable to find user using the username: nobody",
        ]
    );
    let record = harness.records.get("perm-1").unwrap();
    assert_eq!(harness.records.write_count(), 0);
    assert_eq!(record.gender.as_deref(), Some("F"));
    assert_eq!(record.addresses.len(), 1);
}

#[tokio::test]
async fn test_identifiers_need_an_encounter_location() {
    let harness = TestHarness::with_records(vec![mary("perm-1")]);
    let mut payload = update(json!({
        "demographicsupdate.other_identifier_type": "National ID",
        "demographicsupdate.other_identifier_value": "22334455"
    }));
    payload["encounter"] = json!({});

    let errors = harness.process(DEMOGRAPHICS_UPDATE, payload).await.unwrap_err();
    assert_eq!(
        errors.messages(),
        vec!["Unable to find encounter location using the id: <none>"]
    );
}

#[tokio::test]
async fn test_validate_reports_without_writing() {
    let harness = TestHarness::with_records(vec![mary("perm-1")]);

    assert!(harness
        .validate(
            DEMOGRAPHICS_UPDATE,
            update(json!({ "demographicsupdate.village": "Kapsoya" }))
        )
        .await
        .unwrap());
    assert_eq!(harness.records.write_count(), 0);
}
