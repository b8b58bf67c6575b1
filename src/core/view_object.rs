//! Logische Objekt-Handles und der Pick-ID-Index.

use super::{Aabb, ObjectId};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Dichte Pick-ID (1..=N), 0 steht für "kein Objekt".
pub type PickId = u32;

/// Logisches Handle für ein renderbares Modellelement.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewObject {
    /// Domänen-ID
    pub unique_id: ObjectId,
    /// Vom Viewer vergebene Pick-ID (0 bis zur Registrierung)
    pub pick_id: PickId,
    /// Typ-Tag (z.B. `IfcWall`)
    pub type_name: String,
    /// Globalisierte Bounding-Box in Weltkoordinaten
    pub aabb: Option<Aabb>,
}

impl ViewObject {
    /// Erstellt ein noch nicht registriertes Objekt.
    pub fn new(unique_id: impl Into<ObjectId>, type_name: impl Into<String>, aabb: Option<Aabb>) -> Self {
        Self {
            unique_id: unique_id.into(),
            pick_id: 0,
            type_name: type_name.into(),
            aabb,
        }
    }
}

/// Kodiert eine Pick-ID als 4 Farb-Bytes (little-endian).
pub fn encode_pick_color(pick_id: PickId) -> [u8; 4] {
    pick_id.to_le_bytes()
}

/// Dekodiert 4 Farb-Bytes (little-endian) zu einer Pick-ID.
pub fn decode_pick_color(bytes: [u8; 4]) -> PickId {
    u32::from_le_bytes(bytes)
}

/// Index über alle registrierten ViewObjects.
///
/// Die Pick-IDs bilden ein lückenloses Array, daher ist die Auflösung
/// Pick-ID → Objekt ein direkter Array-Zugriff.
#[derive(Debug, Default)]
pub struct ObjectIndex {
    by_pick_id: Vec<ViewObject>,
    by_id: HashMap<ObjectId, PickId>,
    by_type: IndexMap<String, Vec<PickId>>,
}

impl ObjectIndex {
    /// Erstellt einen leeren Index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registriert ein Objekt und vergibt die nächste Pick-ID.
    ///
    /// Ist die ID bereits bekannt, bleibt die bestehende Pick-ID erhalten.
    pub fn add(&mut self, mut object: ViewObject) -> PickId {
        if let Some(&existing) = self.by_id.get(&object.unique_id) {
            log::warn!(
                "ViewObject {} bereits registriert (pick_id {})",
                object.unique_id,
                existing
            );
            return existing;
        }

        let pick_id = self.by_pick_id.len() as PickId + 1;
        object.pick_id = pick_id;
        self.by_id.insert(object.unique_id.clone(), pick_id);
        self.by_type
            .entry(object.type_name.clone())
            .or_default()
            .push(pick_id);
        self.by_pick_id.push(object);
        pick_id
    }

    /// Löst eine Pick-ID in O(1) auf.
    pub fn by_pick_id(&self, pick_id: PickId) -> Option<&ViewObject> {
        let index = (pick_id as usize).checked_sub(1)?;
        self.by_pick_id.get(index)
    }

    /// Sucht ein Objekt nach Domänen-ID.
    pub fn get(&self, id: &ObjectId) -> Option<&ViewObject> {
        self.by_id.get(id).and_then(|&pick_id| self.by_pick_id(pick_id))
    }

    /// Alle IDs der angegebenen Typen (in Registrierungsreihenfolge).
    pub fn ids_of_types(&self, types: &[&str]) -> Vec<ObjectId> {
        types
            .iter()
            .filter_map(|t| self.by_type.get(*t))
            .flatten()
            .filter_map(|&pick_id| self.by_pick_id(pick_id))
            .map(|o| o.unique_id.clone())
            .collect()
    }

    /// Anzahl registrierter Objekte.
    pub fn len(&self) -> usize {
        self.by_pick_id.len()
    }

    /// `true`, wenn keine Objekte registriert sind.
    pub fn is_empty(&self) -> bool {
        self.by_pick_id.is_empty()
    }

    /// Iteriert über alle Objekte in Pick-ID-Reihenfolge.
    pub fn iter(&self) -> impl Iterator<Item = &ViewObject> {
        self.by_pick_id.iter()
    }

    /// Entfernt alle Objekte (Viewer-Teardown).
    pub fn clear(&mut self) {
        self.by_pick_id.clear();
        self.by_id.clear();
        self.by_type.clear();
    }
}
