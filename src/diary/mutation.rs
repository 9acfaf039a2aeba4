use std::fmt;

use super::dto::{DiaryRecord, MealId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Add,
    Update,
    Remove,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Update => f.write_str("update"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

type Compensation = Box<dyn FnOnce(&mut Vec<DiaryRecord>) + Send>;

/// A local change that has already been applied, carrying the closure that
/// undoes it. Compensations locate records by id only, never by position,
/// since other mutations may have run in between.
pub(crate) struct Mutation {
    pub kind: MutationKind,
    pub id: MealId,
    compensation: Option<Compensation>,
}

impl Mutation {
    /// Prepends `record`; undo removes that id.
    pub fn add(records: &mut Vec<DiaryRecord>, record: DiaryRecord) -> Self {
        let id = record.id.clone();
        records.insert(0, record);
        let target = id.clone();
        Self {
            kind: MutationKind::Add,
            id,
            compensation: Some(Box::new(move |records| {
                records.retain(|r| r.id != target);
            })),
        }
    }

    /// Replaces the record with the same id. Not compensated: the new value
    /// stays visible even if persistence fails.
    pub fn update(records: &mut [DiaryRecord], record: DiaryRecord) -> Option<Self> {
        let slot = records.iter_mut().find(|r| r.id == record.id)?;
        let id = record.id.clone();
        *slot = record;
        Some(Self {
            kind: MutationKind::Update,
            id,
            compensation: None,
        })
    }

    /// Takes the record out. Undo puts it back right after the nearest
    /// record that preceded it and still exists, else right before the
    /// nearest surviving successor, else at the end. Skipped when a record
    /// with that id has reappeared meanwhile.
    pub fn remove(records: &mut Vec<DiaryRecord>, id: &MealId) -> Option<Self> {
        let index = records.iter().position(|r| &r.id == id)?;
        let before: Vec<MealId> = records[..index].iter().rev().map(|r| r.id.clone()).collect();
        let after: Vec<MealId> = records[index + 1..].iter().map(|r| r.id.clone()).collect();
        let removed = records.remove(index);
        Some(Self {
            kind: MutationKind::Remove,
            id: id.clone(),
            compensation: Some(Box::new(move |records| {
                if records.iter().any(|r| r.id == removed.id) {
                    return;
                }
                let position_of = |target: &MealId| records.iter().position(|r| &r.id == target);
                let at = before
                    .iter()
                    .find_map(|prev| position_of(prev).map(|i| i + 1))
                    .or_else(|| after.iter().find_map(&position_of))
                    .unwrap_or(records.len());
                records.insert(at, removed);
            })),
        })
    }

    pub fn is_compensated(&self) -> bool {
        self.compensation.is_some()
    }

    /// Returns whether anything was undone.
    pub fn compensate(self, records: &mut Vec<DiaryRecord>) -> bool {
        match self.compensation {
            Some(undo) => {
                undo(records);
                true
            }
            None => false,
        }
    }
}
