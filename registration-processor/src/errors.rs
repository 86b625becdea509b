use std::fmt;

use thiserror::Error;

use crate::apis::ApiError;

/// The registries and directories a payload can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    IdentifierType,
    AttributeType,
    Location,
    User,
    Concept,
    CodedValue,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKind::IdentifierType => write!(f, "identifier type with name"),
            LookupKind::AttributeType => write!(f, "person attribute type with name"),
            LookupKind::Location => write!(f, "encounter location using the id"),
            LookupKind::User => write!(f, "user using the username"),
            LookupKind::Concept => write!(f, "concept with name"),
            LookupKind::CodedValue => write!(f, "concept for value coded with id"),
        }
    }
}

/// Fields whose change needs an explicit authorization flag in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitiveField {
    BirthDate,
    Gender,
}

impl fmt::Display for SensitiveField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensitiveField::BirthDate => write!(f, "Birth Date"),
            SensitiveField::Gender => write!(f, "Gender"),
        }
    }
}

/// A single problem found while processing one queue item.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("unable to read {path}: {reason}")]
    Extraction { path: String, reason: String },
    #[error("Unable to find {kind}: {key}")]
    LookupMiss { kind: LookupKind, key: String },
    #[error("{what} can't be empty for type: {type_name}")]
    MissingValue { what: String, type_name: String },
    #[error("Found a patient with similar characteristic: uuid = {record_uuid}, identifier = {}", .identifier.as_deref().unwrap_or("<none>"))]
    DuplicateDetected {
        record_uuid: String,
        identifier: Option<String>,
    },
    #[error("Unable to uniquely identify patient for this demographic update form data")]
    Unresolved,
    #[error("Change of {0} requires manual review")]
    SensitiveFieldBlocked(SensitiveField),
    #[error("{operation} failed: {source}")]
    Collaborator {
        operation: &'static str,
        #[source]
        source: ApiError,
    },
    #[error("commit failed while trying to {operation}: {source}")]
    Commit {
        operation: &'static str,
        #[source]
        source: ApiError,
    },
    #[error("no pipeline accepts queue data with discriminator '{0}'")]
    UnknownDiscriminator(String),
}

impl ProcessingError {
    pub fn extraction(path: impl fmt::Display, reason: impl Into<String>) -> Self {
        ProcessingError::Extraction {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub fn lookup_miss(kind: LookupKind, key: impl Into<String>) -> Self {
        ProcessingError::LookupMiss {
            kind,
            key: key.into(),
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessingError::Extraction { .. } => "extraction",
            ProcessingError::LookupMiss { .. } => "lookup_miss",
            ProcessingError::MissingValue { .. } => "missing_value",
            ProcessingError::DuplicateDetected { .. } => "duplicate_detected",
            ProcessingError::Unresolved => "unresolved",
            ProcessingError::SensitiveFieldBlocked(_) => "sensitive_field_blocked",
            ProcessingError::Collaborator { .. } => "collaborator",
            ProcessingError::Commit { .. } => "commit",
            ProcessingError::UnknownDiscriminator(_) => "unknown_discriminator",
        }
    }
}

/// Every problem found while processing one queue item, in the order they were found.
///
/// A pipeline run owns its aggregate and only hands it out as the `Err` of the run, so callers see
/// either a complete success or the complete list of problems.
#[derive(Debug, Default)]
pub struct ErrorAggregate {
    errors: Vec<ProcessingError>,
}

pub type ProcessResult<T> = Result<T, ErrorAggregate>;

impl ErrorAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ProcessingError) {
        self.errors.push(error);
    }

    /// Folds another aggregate in without nesting it.
    pub fn absorb(&mut self, other: ErrorAggregate) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ProcessingError] {
        &self.errors
    }

    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn contains(&self, predicate: impl Fn(&ProcessingError) -> bool) -> bool {
        self.errors.iter().any(predicate)
    }

    /// `Ok(value)` when nothing was recorded, otherwise the whole aggregate.
    pub fn into_result<T>(self, value: T) -> ProcessResult<T> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl From<ProcessingError> for ErrorAggregate {
    fn from(error: ProcessingError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl IntoIterator for ErrorAggregate {
    type Item = ProcessingError;
    type IntoIter = std::vec::IntoIter<ProcessingError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl fmt::Display for ErrorAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) while processing queue data", self.errors.len())?;
        for (index, error) in self.errors.iter().enumerate() {
            write!(f, "\n  {}. {}", index + 1, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorAggregate {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result_is_ok_when_empty() {
        let aggregate = ErrorAggregate::new();
        assert_eq!(aggregate.into_result(5).unwrap(), 5);
    }

    #[test]
    fn test_into_result_returns_every_error() {
        let mut aggregate = ErrorAggregate::new();
        aggregate.push(ProcessingError::lookup_miss(LookupKind::IdentifierType, "Old ID"));
        aggregate.push(ProcessingError::SensitiveFieldBlocked(SensitiveField::Gender));

        let err = aggregate.into_result(()).unwrap_err();
        assert_eq!(
            err.messages(),
            vec![
                "Unable to find identifier type with name: Old ID".to_string(),
                "Change of Gender requires manual review".to_string(),
            ]
        );
    }

    #[test]
    fn test_absorb_flattens() {
        let mut outer = ErrorAggregate::from(ProcessingError::Unresolved);
        let inner = ErrorAggregate::from(ProcessingError::UnknownDiscriminator("x".to_owned()));
        outer.absorb(inner);

        assert_eq!(outer.len(), 2);
        assert!(outer.contains(|e| matches!(e, ProcessingError::UnknownDiscriminator(_))));
    }

    #[test]
    fn test_display_lists_errors() {
        let mut aggregate = ErrorAggregate::new();
        aggregate.push(ProcessingError::SensitiveFieldBlocked(SensitiveField::BirthDate));
        aggregate.push(ProcessingError::extraction("patient/patient.birth_date", "bad date"));

        let rendered = aggregate.to_string();
        assert!(rendered.starts_with("2 error(s)"));
        assert!(rendered.contains("1. Change of Birth Date requires manual review"));
        assert!(rendered.contains("2. unable to read patient/patient.birth_date: bad date"));
    }

    #[test]
    fn test_commit_error_keeps_source() {
        let error = ProcessingError::Commit {
            operation: "save record",
            source: "connection reset".into(),
        };
        assert_eq!(error.kind(), "commit");
        assert!(std::error::Error::source(&error).is_some());
    }
}
