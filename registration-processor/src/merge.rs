//! Field-level merge of a validated change set onto a stored record.
//!
//! Collections are additive: identifiers, names, addresses and attributes from the change set are
//! appended unless an identical entry is already present. Scalars are replaced only when the
//! change set carries a value.

use crate::types::{CandidateRecord, StoredRecord};

pub fn apply(mut target: StoredRecord, changes: &CandidateRecord) -> StoredRecord {
    for identifier in &changes.identifiers {
        target.add_identifier(identifier.clone());
    }

    if let Some(name) = changes.name.as_ref().filter(|name| !name.is_blank()) {
        push_unique(&mut target.names, name);
    }
    for address in changes.addresses.iter().filter(|address| !address.is_blank()) {
        push_unique(&mut target.addresses, address);
    }
    for attribute in &changes.attributes {
        push_unique(&mut target.attributes, attribute);
    }

    if let Some(gender) = &changes.gender {
        target.gender = Some(gender.clone());
    }
    if let Some(birth_date) = changes.birth_date {
        target.birth_date = Some(birth_date);
        target.birth_date_estimated = changes.birth_date_estimated;
    }
    if let Some(changed_by) = &changes.changed_by {
        target.changed_by = Some(changed_by.clone());
    }

    target
}

fn push_unique<T: Clone + PartialEq>(items: &mut Vec<T>, item: &T) {
    if !items.contains(item) {
        items.push(item.clone());
    }
}
