//! Geordnetes ID-Set mit Batch-Scopes.
//!
//! Mutationen innerhalb eines Batches sammeln sich, der sortierte Snapshot
//! wird erst beim Verlassen des äußersten Batches neu aufgebaut und es gibt
//! genau eine Änderungsmeldung pro Batch.

use super::{IdOrdering, ObjectId};
use indexmap::IndexSet;

/// ID-Set für Sichtbarkeit und Selektion.
#[derive(Debug, Clone)]
pub struct FreezableIdSet {
    ordering: IdOrdering,
    members: IndexSet<ObjectId>,
    frozen: Vec<ObjectId>,
    batch_depth: u32,
    changed: bool,
    generation: u64,
}

impl FreezableIdSet {
    /// Erstellt ein leeres Set mit der gegebenen Ordnung.
    pub fn new(ordering: IdOrdering) -> Self {
        Self {
            ordering,
            members: IndexSet::new(),
            frozen: Vec::new(),
            batch_depth: 0,
            changed: false,
            generation: 0,
        }
    }

    /// Die Ordnung, nach der der Snapshot sortiert ist.
    pub fn ordering(&self) -> IdOrdering {
        self.ordering
    }

    /// Fügt eine ID hinzu. Gibt `true` zurück, wenn sie neu war.
    pub fn insert(&mut self, id: ObjectId) -> bool {
        let inserted = self.members.insert(id);
        if inserted {
            self.mark_changed();
        }
        inserted
    }

    /// Entfernt eine ID. Gibt `true` zurück, wenn sie enthalten war.
    pub fn remove(&mut self, id: &ObjectId) -> bool {
        let removed = self.members.shift_remove(id);
        if removed {
            self.mark_changed();
        }
        removed
    }

    /// Entfernt alle IDs.
    pub fn clear(&mut self) {
        if !self.members.is_empty() {
            self.members.clear();
            self.mark_changed();
        }
    }

    /// Prüft die Mitgliedschaft.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.members.contains(id)
    }

    /// Anzahl der IDs.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// `true`, wenn das Set leer ist.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// IDs in Einfüge-Reihenfolge.
    pub fn iter(&self) -> impl Iterator<Item = &ObjectId> {
        self.members.iter()
    }

    /// Kopie der IDs in Einfüge-Reihenfolge.
    pub fn to_vec(&self) -> Vec<ObjectId> {
        self.members.iter().cloned().collect()
    }

    /// Sortierter Snapshot gemäß der Ordnung.
    ///
    /// Innerhalb eines Batches ist das der Stand vor Batch-Beginn.
    pub fn sorted(&self) -> &[ObjectId] {
        &self.frozen
    }

    /// Zähler, der pro abgeschlossener Änderung (bzw. pro Batch) steigt.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `true`, solange ein Batch offen ist.
    pub fn in_batch(&self) -> bool {
        self.batch_depth > 0
    }

    /// Öffnet einen (ggf. verschachtelten) Batch.
    pub fn begin_batch(&mut self) {
        if self.batch_depth == 0 {
            self.changed = false;
        }
        self.batch_depth += 1;
    }

    /// Schließt einen Batch.
    ///
    /// Gibt nur beim äußersten Batch `true` zurück, und nur wenn sich das
    /// Set tatsächlich geändert hat.
    pub fn end_batch(&mut self) -> bool {
        if self.batch_depth == 0 {
            log::warn!("end_batch ohne offenen Batch");
            return false;
        }
        self.batch_depth -= 1;
        if self.batch_depth > 0 || !self.changed {
            return false;
        }
        self.changed = false;
        self.rebuild();
        true
    }

    /// Führt `f` in einem Batch aus.
    ///
    /// Liefert das Ergebnis von `f` und ob sich das Set geändert hat.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> (R, bool) {
        self.begin_batch();
        let result = f(self);
        let changed = self.end_batch();
        (result, changed)
    }

    fn mark_changed(&mut self) {
        if self.batch_depth > 0 {
            self.changed = true;
        } else {
            self.rebuild();
        }
    }

    fn rebuild(&mut self) {
        self.frozen = self.members.iter().cloned().collect();
        self.ordering.sort(&mut self.frozen);
        self.generation += 1;
    }
}

impl Default for FreezableIdSet {
    fn default() -> Self {
        Self::new(IdOrdering::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(values: &[i64]) -> Vec<ObjectId> {
        values.iter().map(|v| ObjectId::Numeric(*v)).collect()
    }

    #[test]
    fn batch_coalesces_into_one_generation() {
        let mut set = FreezableIdSet::new(IdOrdering::Numeric);
        let (_, changed) = set.batch(|s| {
            s.insert(3.into());
            s.insert(1.into());
            s.insert(2.into());
        });

        assert!(changed);
        assert_eq!(set.generation(), 1);
        assert_eq!(set.sorted(), numeric(&[1, 2, 3]).as_slice());
    }

    #[test]
    fn snapshot_is_frozen_during_batch() {
        let mut set = FreezableIdSet::new(IdOrdering::Numeric);
        set.insert(5.into());
        set.begin_batch();
        set.insert(4.into());
        assert_eq!(set.sorted(), numeric(&[5]).as_slice());
        assert!(set.contains(&4.into()));
        assert!(set.end_batch());
        assert_eq!(set.sorted(), numeric(&[4, 5]).as_slice());
    }

    #[test]
    fn nested_batches_report_once() {
        let mut set = FreezableIdSet::new(IdOrdering::Numeric);
        set.begin_batch();
        set.begin_batch();
        set.insert(1.into());
        assert!(!set.end_batch());
        assert!(set.end_batch());
    }

    #[test]
    fn batch_without_effect_reports_no_change() {
        let mut set = FreezableIdSet::new(IdOrdering::Numeric);
        set.insert(1.into());
        let (_, changed) = set.batch(|s| {
            s.insert(1.into());
            s.remove(&ObjectId::Numeric(2));
        });
        assert!(!changed);
    }

    #[test]
    fn lexicographic_snapshot() {
        let mut set = FreezableIdSet::new(IdOrdering::Lexicographic);
        set.batch(|s| {
            for id in ["b", "a10", "a9"] {
                s.insert(id.into());
            }
        });
        let sorted: Vec<String> = set.sorted().iter().map(|id| id.to_string()).collect();
        assert_eq!(sorted, vec!["a10", "a9", "b"]);
    }
}
