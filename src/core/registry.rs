//! Geordneter Index Objekt-ID → besitzende Buffer.

use super::{IdOrdering, ObjectId};
use std::cmp::Ordering;

/// Sortierter Index von Objekt-IDs auf ihre Besitzer.
///
/// Normalerweise hat jede ID genau einen Besitzer. Während eines
/// farbbedingten Buffer-Splits kommt vorübergehend ein zweiter hinzu.
#[derive(Debug, Clone)]
pub struct UniqueIdRegistry<T> {
    ordering: IdOrdering,
    entries: Vec<(ObjectId, Vec<T>)>,
}

impl<T: Copy + PartialEq> UniqueIdRegistry<T> {
    /// Erstellt einen leeren Index mit der gegebenen Ordnung.
    pub fn new(ordering: IdOrdering) -> Self {
        Self {
            ordering,
            entries: Vec::new(),
        }
    }

    fn search(&self, id: &ObjectId) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|(key, _)| self.ordering.compare(key, id))
    }

    /// Hängt `owner` an die Besitzerliste von `id` an.
    pub fn insert(&mut self, id: ObjectId, owner: T) {
        match self.search(&id) {
            Ok(index) => {
                let owners = &mut self.entries[index].1;
                if !owners.contains(&owner) {
                    owners.push(owner);
                }
            }
            Err(index) => self.entries.insert(index, (id, vec![owner])),
        }
    }

    /// Registriert viele IDs auf einmal.
    ///
    /// Der Batch wird sortiert und in einem Durchlauf mit den bestehenden
    /// Einträgen gemischt.
    pub fn insert_batch(&mut self, items: impl IntoIterator<Item = (ObjectId, T)>) {
        let ordering = self.ordering;
        let mut batch: Vec<(ObjectId, T)> = items.into_iter().collect();
        if batch.is_empty() {
            return;
        }
        // Stabil sortieren, damit Besitzer in Einfüge-Reihenfolge bleiben
        batch.sort_by(|a, b| ordering.compare(&a.0, &b.0));

        let mut merged: Vec<(ObjectId, Vec<T>)> =
            Vec::with_capacity(self.entries.len() + batch.len());
        let mut existing = std::mem::take(&mut self.entries).into_iter().peekable();
        for (id, owner) in batch {
            while let Some(entry) =
                existing.next_if(|(key, _)| ordering.compare(key, &id) != Ordering::Greater)
            {
                merged.push(entry);
            }
            match merged.last_mut() {
                Some((last, owners)) if ordering.compare(last, &id) == Ordering::Equal => {
                    if !owners.contains(&owner) {
                        owners.push(owner);
                    }
                }
                _ => merged.push((id, vec![owner])),
            }
        }
        merged.extend(existing);
        self.entries = merged;
    }

    /// Besitzer einer ID.
    pub fn get(&self, id: &ObjectId) -> Option<&[T]> {
        self.search(id).ok().map(|index| self.entries[index].1.as_slice())
    }

    /// Erster (primärer) Besitzer einer ID.
    pub fn primary(&self, id: &ObjectId) -> Option<T> {
        self.get(id).and_then(|owners| owners.first().copied())
    }

    /// Ersetzt den primären Besitzer und gibt den alten zurück.
    pub fn replace_primary(&mut self, id: &ObjectId, owner: T) -> Option<T> {
        let index = self.search(id).ok()?;
        let first = self.entries[index].1.first_mut()?;
        Some(std::mem::replace(first, owner))
    }

    /// Entfernt einen bestimmten Besitzer einer ID.
    ///
    /// Bleibt danach kein Besitzer übrig, verschwindet der Eintrag.
    pub fn remove_owner(&mut self, id: &ObjectId, owner: T) -> bool {
        let Ok(index) = self.search(id) else {
            return false;
        };
        let owners = &mut self.entries[index].1;
        let before = owners.len();
        owners.retain(|o| *o != owner);
        let removed = owners.len() != before;
        if owners.is_empty() {
            self.entries.remove(index);
        }
        removed
    }

    /// Entfernt eine ID komplett.
    pub fn remove(&mut self, id: &ObjectId) -> Option<Vec<T>> {
        let index = self.search(id).ok()?;
        Some(self.entries.remove(index).1)
    }

    /// Alle Einträge mit `from <= id <= to` in Ordnung.
    pub fn range<'a>(
        &'a self,
        from: &ObjectId,
        to: &ObjectId,
    ) -> impl Iterator<Item = (&'a ObjectId, &'a [T])> + 'a {
        let start = match self.search(from) {
            Ok(i) | Err(i) => i,
        };
        let end = match self.search(to) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        self.entries[start..end.max(start)]
            .iter()
            .map(|(id, owners)| (id, owners.as_slice()))
    }

    /// Alle Einträge in Ordnung.
    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &[T])> {
        self.entries
            .iter()
            .map(|(id, owners)| (id, owners.as_slice()))
    }

    /// Anzahl registrierter IDs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true`, wenn keine IDs registriert sind.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entfernt alle Einträge.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_entries_sorted() {
        let mut registry = UniqueIdRegistry::new(IdOrdering::Numeric);
        for (id, owner) in [(30, 'c'), (10, 'a'), (20, 'b')] {
            registry.insert(ObjectId::Numeric(id), owner);
        }
        let ids: Vec<i64> = registry
            .iter()
            .filter_map(|(id, _)| id.numeric_value())
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert_eq!(registry.primary(&ObjectId::Numeric(20)), Some('b'));
    }

    #[test]
    fn batch_insert_merges_owners() {
        let mut registry = UniqueIdRegistry::new(IdOrdering::Numeric);
        registry.insert_batch([
            (ObjectId::Numeric(2), 1u32),
            (ObjectId::Numeric(1), 1),
            (ObjectId::Numeric(2), 7),
        ]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&ObjectId::Numeric(2)), Some(&[1, 7][..]));
    }

    #[test]
    fn batch_interleaves_with_existing_entries() {
        let mut registry = UniqueIdRegistry::new(IdOrdering::Numeric);
        registry.insert_batch([2, 6, 10].map(|i| (ObjectId::Numeric(i), 1u32)));
        registry.insert_batch([12, 6, 1, 7].map(|i| (ObjectId::Numeric(i), 2u32)));

        let ids: Vec<i64> = registry
            .iter()
            .filter_map(|(id, _)| id.numeric_value())
            .collect();
        assert_eq!(ids, vec![1, 2, 6, 7, 10, 12]);
        assert_eq!(registry.get(&ObjectId::Numeric(6)), Some(&[1, 2][..]));
        assert_eq!(registry.get(&ObjectId::Numeric(10)), Some(&[1][..]));
        assert_eq!(registry.primary(&ObjectId::Numeric(12)), Some(2));
    }

    #[test]
    fn replace_and_remove_owner() {
        let mut registry = UniqueIdRegistry::new(IdOrdering::Numeric);
        let id = ObjectId::Numeric(5);
        registry.insert(id.clone(), 1u32);
        registry.insert(id.clone(), 2);

        assert_eq!(registry.replace_primary(&id, 9), Some(1));
        assert!(registry.remove_owner(&id, 2));
        assert_eq!(registry.get(&id), Some(&[9][..]));
        assert!(registry.remove_owner(&id, 9));
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn range_is_inclusive() {
        let mut registry = UniqueIdRegistry::new(IdOrdering::Numeric);
        registry.insert_batch((1..=10).map(|i| (ObjectId::Numeric(i), i as u32)));
        let owners: Vec<u32> = registry
            .range(&ObjectId::Numeric(3), &ObjectId::Numeric(5))
            .map(|(_, o)| o[0])
            .collect();
        assert_eq!(owners, vec![3, 4, 5]);
    }
}
