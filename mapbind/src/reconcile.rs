//! Reconciliation of declarative property changes onto the native entity.
//!
//! The host framework reports property changes as an [`InputChangeSet`]. Each
//! declarative field of a widget carries a [`Mutability`] policy; the whole
//! change set is checked against the policies first, and the per-field
//! appliers run only if every field passed. A rejected field therefore never
//! leaves the native entity partially updated.

use serde_json::Value;

use crate::error::BridgeError;

/// Mutability policy of one declarative field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// The field maps directly onto a native mutator call.
    Direct,
    /// The field may only change together with the named companion field in
    /// the same change set; the companion's applier consumes both values.
    RequiresCompanion(&'static str),
    /// The field is immutable once the entity exists. The declarative
    /// framework keeps the stale value; the native entity is never touched.
    Frozen,
}

/// One changed declarative property.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Declarative property name.
    pub field: String,
    /// Value before the change.
    pub previous: Value,
    /// Value after the change.
    pub current: Value,
}

/// A set of property changes produced by one change-detection pass of the
/// host framework. Field order is preserved and significant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputChangeSet {
    changes: Vec<FieldChange>,
}

impl InputChangeSet {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a change, keeping insertion order.
    pub fn push(&mut self, field: impl Into<String>, previous: Value, current: Value) {
        self.changes.push(FieldChange {
            field: field.into(),
            previous,
            current,
        });
    }

    /// Builder-style [`InputChangeSet::push`].
    pub fn with(mut self, field: impl Into<String>, previous: Value, current: Value) -> Self {
        self.push(field, previous, current);
        self
    }

    /// The change of the given field, if it is part of this set.
    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    /// Whether the given field changed in this set.
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Iterates the changes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }

    /// Whether the set contains no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changed fields.
    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// Applier translating one field change into native mutator calls.
///
/// The full change set is passed alongside so that an applier can pick up
/// companion values (e.g. a position change accompanied by a mode change is
/// applied as one native move call).
pub type ApplyFn<E> = fn(&E, &FieldChange, &InputChangeSet) -> Result<(), BridgeError>;

/// Value validation of one field change, run during the policy phase.
pub type CheckFn = fn(&FieldChange, &InputChangeSet) -> Result<(), BridgeError>;

/// Static binding of one declarative field to its policy and applier.
pub struct FieldRule<E> {
    /// Declarative property name.
    pub field: &'static str,
    /// Mutability policy.
    pub mutability: Mutability,
    /// Optional value validation (e.g. parsing the new value), run before
    /// any applier. A rejection here leaves the entity untouched; applier
    /// errors are reserved for failures of the native call itself.
    pub check: Option<CheckFn>,
    /// Applier invoked when the whole change set passed the checks.
    pub apply: ApplyFn<E>,
}

/// Applier for fields that produce no native call of their own (frozen
/// fields and companion fields consumed by their anchor's applier).
pub fn apply_nothing<E>(
    _entity: &E,
    _change: &FieldChange,
    _set: &InputChangeSet,
) -> Result<(), BridgeError> {
    Ok(())
}

/// Applies a change set to the entity under the given field rules.
///
/// Runs in two phases: every field of the set is checked first (mutability
/// policy, then the rule's value check), and only if all of them passed are
/// the appliers invoked, in change-set order. Unknown fields are rejected;
/// the declarative surface of a widget is closed.
pub fn apply_change_set<E>(
    entity: &E,
    rules: &[FieldRule<E>],
    set: &InputChangeSet,
) -> Result<(), BridgeError> {
    for change in set.iter() {
        let rule = rule_for(rules, &change.field)?;
        match rule.mutability {
            Mutability::Direct => {}
            Mutability::RequiresCompanion(companion) => {
                if !set.contains(companion) {
                    return Err(BridgeError::unsupported_mutation(
                        &change.field,
                        format!("can only change together with `{companion}`"),
                    ));
                }
            }
            Mutability::Frozen => {
                return Err(BridgeError::unsupported_mutation(
                    &change.field,
                    "immutable after construction",
                ));
            }
        }
        if let Some(check) = rule.check {
            check(change, set)?;
        }
    }

    for change in set.iter() {
        let rule = rule_for(rules, &change.field)?;
        (rule.apply)(entity, change, set)?;
    }

    Ok(())
}

fn rule_for<'a, E>(
    rules: &'a [FieldRule<E>],
    field: &str,
) -> Result<&'a FieldRule<E>, BridgeError> {
    rules.iter().find(|r| r.field == field).ok_or_else(|| {
        BridgeError::unsupported_mutation(field, "unknown declarative property")
    })
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    fn record(entity: &Recorder, change: &FieldChange, _set: &InputChangeSet) -> Result<(), BridgeError> {
        entity.calls.lock().push(change.field.clone());
        Ok(())
    }

    fn rules() -> Vec<FieldRule<Recorder>> {
        vec![
            FieldRule {
                field: "point",
                mutability: Mutability::Direct,
                check: None,
                apply: record,
            },
            FieldRule {
                field: "mode",
                mutability: Mutability::RequiresCompanion("point"),
                check: None,
                apply: apply_nothing,
            },
            FieldRule {
                field: "options",
                mutability: Mutability::Frozen,
                check: None,
                apply: apply_nothing,
            },
        ]
    }

    #[test]
    fn direct_field_is_applied() {
        let entity = Recorder::default();
        let set = InputChangeSet::new().with("point", json!([0.0, 0.0]), json!([1.0, 1.0]));

        apply_change_set(&entity, &rules(), &set).expect("reconciliation failed");
        assert_eq!(*entity.calls.lock(), vec!["point"]);
    }

    #[test]
    fn frozen_field_rejects_and_applies_nothing() {
        let entity = Recorder::default();
        let set = InputChangeSet::new()
            .with("options", json!({}), json!({ "controls": [] }))
            .with("point", json!([0.0, 0.0]), json!([1.0, 1.0]));

        let err = apply_change_set(&entity, &rules(), &set).expect_err("must reject");
        assert!(matches!(err, BridgeError::UnsupportedMutation { field, .. } if field == "options"));
        // The point change, though valid on its own, must not have been
        // applied: the set is a single unit.
        assert!(entity.calls.lock().is_empty());
    }

    #[test]
    fn companion_field_requires_co_occurrence() {
        let entity = Recorder::default();
        let set = InputChangeSet::new().with("mode", json!(null), json!("air"));

        let err = apply_change_set(&entity, &rules(), &set).expect_err("must reject");
        assert!(matches!(err, BridgeError::UnsupportedMutation { field, .. } if field == "mode"));
        assert!(entity.calls.lock().is_empty());

        let set = InputChangeSet::new()
            .with("point", json!([0.0, 0.0]), json!([1.0, 1.0]))
            .with("mode", json!(null), json!("air"));
        apply_change_set(&entity, &rules(), &set).expect("reconciliation failed");
        // One native call: the anchor applier consumes the companion too.
        assert_eq!(*entity.calls.lock(), vec!["point"]);
    }

    #[test]
    fn unknown_field_rejects() {
        let entity = Recorder::default();
        let set = InputChangeSet::new().with("zoom", json!(1), json!(2));

        let err = apply_change_set(&entity, &rules(), &set).expect_err("must reject");
        assert!(matches!(err, BridgeError::UnsupportedMutation { field, .. } if field == "zoom"));
    }

    #[test]
    fn appliers_run_in_change_set_order() {
        let mut rules = rules();
        rules.push(FieldRule {
            field: "marker",
            mutability: Mutability::Direct,
            check: None,
            apply: record,
        });

        let entity = Recorder::default();
        let set = InputChangeSet::new()
            .with("marker", json!(null), json!("a"))
            .with("point", json!([0.0, 0.0]), json!([1.0, 1.0]));

        apply_change_set(&entity, &rules, &set).expect("reconciliation failed");
        assert_eq!(*entity.calls.lock(), vec!["marker", "point"]);
    }

    #[test]
    fn failing_value_check_applies_nothing() {
        fn reject(change: &FieldChange, _set: &InputChangeSet) -> Result<(), BridgeError> {
            Err(BridgeError::unsupported_mutation(
                change.field.as_str(),
                "malformed value",
            ))
        }

        let mut rules = rules();
        rules.push(FieldRule {
            field: "marker",
            mutability: Mutability::Direct,
            check: Some(reject),
            apply: record,
        });

        // The invalid field comes second: the first field's applier must not
        // have run by the time the rejection is detected.
        let entity = Recorder::default();
        let set = InputChangeSet::new()
            .with("point", json!([0.0, 0.0]), json!([1.0, 1.0]))
            .with("marker", json!(null), json!("bogus"));

        let err = apply_change_set(&entity, &rules, &set).expect_err("must reject");
        assert!(matches!(err, BridgeError::UnsupportedMutation { field, .. } if field == "marker"));
        assert!(entity.calls.lock().is_empty());
    }
}
