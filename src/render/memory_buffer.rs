//! CPU-seitiger Geometrie-Buffer.
//!
//! Hält Index-Bereiche und Farben pro Objekt im Speicher. Dient als
//! Referenz-Implementierung des Buffer-Vertrags und als Staging-Buffer,
//! bevor Layer ihre Daten auf die GPU laden.

use super::buffer::{
    BufferChannel, ColorWrite, EditBounds, GeometryBuffer, IdRange, InstanceRecord,
    TransparencyClass,
};
use crate::core::{ObjectId, Rgba};
use crate::error::ViewerError;
use glam::Mat4;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq)]
struct MemoryObject {
    range: IdRange,
    color: Rgba,
}

/// Geometrie-Buffer im Hauptspeicher.
#[derive(Debug, Clone)]
pub struct MemoryBuffer {
    transparency: TransparencyClass,
    frozen: bool,
    objects: IndexMap<ObjectId, MemoryObject>,
    instances: Vec<InstanceRecord>,
    next_index: u32,
    editing: Option<Option<EditBounds>>,
    edit_count: usize,
}

impl MemoryBuffer {
    /// Leerer, veränderbarer Buffer.
    pub fn new(transparency: TransparencyClass) -> Self {
        Self {
            transparency,
            frozen: false,
            objects: IndexMap::new(),
            instances: Vec::new(),
            next_index: 0,
            editing: None,
            edit_count: 0,
        }
    }

    /// Leerer, eingefrorener (instanzierter) Buffer.
    pub fn frozen(transparency: TransparencyClass) -> Self {
        Self {
            frozen: true,
            ..Self::new(transparency)
        }
    }

    /// Hängt die Geometrie eines Objekts an.
    pub fn push_object(&mut self, id: ObjectId, index_count: u32, color: Rgba) {
        let range = IdRange {
            start: self.next_index,
            end: self.next_index + index_count,
        };
        self.next_index = range.end;
        self.objects.insert(id, MemoryObject { range, color });
    }

    /// Hängt einen Instanz-Eintrag an (eingefrorene Buffer).
    pub fn push_instance(&mut self, id: ObjectId, transform: Mat4) {
        self.instances.push(InstanceRecord { id, transform });
    }

    /// `true`, solange ein Edit-Scope offen ist.
    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    /// Anzahl abgeschlossener Edit-Scopes.
    pub fn edit_count(&self) -> usize {
        self.edit_count
    }

    /// Anzahl Indizes über alle Objekte.
    pub fn index_count(&self) -> u32 {
        self.next_index
    }
}

impl GeometryBuffer for MemoryBuffer {
    fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn transparency(&self) -> TransparencyClass {
        self.transparency
    }

    fn set_transparency(&mut self, class: TransparencyClass) {
        self.transparency = class;
    }

    fn id_ranges(&self, ids: &[ObjectId]) -> Vec<IdRange> {
        ids.iter()
            .filter_map(|id| self.objects.get(id).map(|o| o.range))
            .collect()
    }

    fn begin_edit(
        &mut self,
        channels: &[BufferChannel],
        bounds: Option<EditBounds>,
    ) -> Result<(), ViewerError> {
        if self.editing.is_some() {
            return Err(ViewerError::BufferEdit(
                "Buffer ist bereits gemappt".to_string(),
            ));
        }
        log::trace!("MemoryBuffer: map {:?} über {:?}", channels, bounds);
        self.editing = Some(bounds);
        Ok(())
    }

    fn end_edit(&mut self) {
        if self.editing.take().is_some() {
            self.edit_count += 1;
        }
    }

    fn set_color(&mut self, id: &ObjectId, rgba: Rgba) -> ColorWrite {
        if TransparencyClass::of(&rgba) != self.transparency {
            return ColorWrite::ClassMismatch;
        }
        match self.objects.get_mut(id) {
            Some(object) => {
                let previous = object.color;
                object.color = rgba;
                ColorWrite::Applied { previous }
            }
            None => ColorWrite::NotFound,
        }
    }

    fn color_of(&self, id: &ObjectId) -> Option<Rgba> {
        if let Some(object) = self.objects.get(id) {
            return Some(object.color);
        }
        // Instanzen zeigen die Farbe der geteilten Geometrie
        let is_instance = self.frozen && self.instances.iter().any(|r| &r.id == id);
        if is_instance {
            self.objects.values().next().map(|o| o.color)
        } else {
            None
        }
    }

    fn copy(&self, id: &ObjectId) -> Box<dyn GeometryBuffer> {
        let mut copy = MemoryBuffer {
            frozen: self.frozen,
            ..MemoryBuffer::new(self.transparency)
        };
        if self.frozen {
            // Geteilte Geometrie komplett, Instanzen setzt der Aufrufer
            for (key, object) in &self.objects {
                copy.push_object(key.clone(), object.range.end - object.range.start, object.color);
            }
        } else if let Some(object) = self.objects.get(id) {
            copy.push_object(id.clone(), object.range.end - object.range.start, object.color);
        }
        Box::new(copy)
    }

    fn fill_color(&mut self, rgba: Rgba) {
        for object in self.objects.values_mut() {
            object.color = rgba;
        }
    }

    fn objects(&self) -> &[InstanceRecord] {
        &self.instances
    }

    fn set_objects(&mut self, objects: Vec<InstanceRecord>) {
        self.instances = objects;
    }

    fn ids(&self) -> Vec<ObjectId> {
        if self.frozen {
            self.instances.iter().map(|r| r.id.clone()).collect()
        } else {
            self.objects.keys().cloned().collect()
        }
    }
}
