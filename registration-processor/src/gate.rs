use crate::errors::{ProcessingError, SensitiveField};

/// A proposed change to one field of a stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChangeRequest<T> {
    pub field: SensitiveField,
    pub proposed: T,
    pub requires_authorization: bool,
    pub authorization_present: bool,
}

impl<T> FieldChangeRequest<T> {
    /// A change to a sensitive field, authorized by the payload's "change validated" flag.
    pub fn new(field: SensitiveField, proposed: T, authorization_present: bool) -> Self {
        Self {
            field,
            proposed,
            requires_authorization: true,
            authorization_present,
        }
    }
}

#[derive(Debug)]
pub enum GateDecision<T> {
    Accepted(T),
    Rejected(ProcessingError),
}

pub fn gate<T>(request: FieldChangeRequest<T>) -> GateDecision<T> {
    if request.requires_authorization && !request.authorization_present {
        return GateDecision::Rejected(ProcessingError::SensitiveFieldBlocked(request.field));
    }
    GateDecision::Accepted(request.proposed)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_unauthorized_change_is_rejected() {
        let date = NaiveDate::from_ymd_opt(1979, 1, 1).unwrap();
        let decision = gate(FieldChangeRequest::new(SensitiveField::BirthDate, date, false));

        let GateDecision::Rejected(error) = decision else {
            panic!("expected rejection");
        };
        assert_eq!(error.to_string(), "Change of Birth Date requires manual review");
    }

    #[test]
    fn test_authorized_change_is_accepted() {
        let decision = gate(FieldChangeRequest::new(
            SensitiveField::Gender,
            "F".to_string(),
            true,
        ));
        assert!(matches!(decision, GateDecision::Accepted(gender) if gender == "F"));
    }

    #[test]
    fn test_fields_not_requiring_authorization_pass() {
        let request = FieldChangeRequest {
            field: SensitiveField::Gender,
            proposed: "M",
            requires_authorization: false,
            authorization_present: false,
        };
        assert!(matches!(gate(request), GateDecision::Accepted("M")));
    }
}
