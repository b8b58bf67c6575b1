//! Farb-Overrides pro Objekt.
//!
//! Passt die neue Farbe zur Transparenzklasse des Buffers, wird sie in-place
//! geschrieben. Sonst wird das Objekt in einen eigenen Buffer kopiert und
//! die Quelle ausgeblendet (Split). Instanzen eingefrorener Buffer teilen
//! ihre Geometrie und wandern daher immer in einen eigenen Buffer
//! (Migration), unabhängig von der Klasse.

use super::{MigratedInstance, Viewer};
use crate::core::{ObjectId, Rgba, ViewerEvent};
use crate::error::ViewerError;
use crate::render::{
    BufferId, ColorWrite, DirtyLevel, GeometryBuffer, GpuContext, InstanceRecord,
    TransparencyClass, COLOR_EDIT_CHANNELS,
};
use indexmap::IndexMap;

/// Im Edit-Scope vorbereiteter Override-Buffer, der erst nach dem
/// Freigeben der Quelle registriert wird.
enum PendingOverride {
    Split {
        id: ObjectId,
        buffer: Box<dyn GeometryBuffer>,
    },
    Migrated {
        id: ObjectId,
        record: InstanceRecord,
        buffer: Box<dyn GeometryBuffer>,
    },
}

impl<G: GpuContext> Viewer<G> {
    /// Gruppiert IDs nach ihrem primären Buffer (Reihenfolge bleibt erhalten).
    fn group_by_owner(&self, ids: &[ObjectId]) -> IndexMap<BufferId, Vec<ObjectId>> {
        let mut groups: IndexMap<BufferId, Vec<ObjectId>> = IndexMap::new();
        for id in ids {
            match self.registry.primary(id) {
                Some(owner) => groups.entry(owner).or_default().push(id.clone()),
                None => log::warn!("Kein Buffer für Objekt {}", id),
            }
        }
        groups
    }

    /// Setzt eine Override-Farbe für alle IDs.
    pub fn set_color(&mut self, ids: &[ObjectId], rgba: Rgba) -> Result<(), ViewerError> {
        self.invisible.begin_batch();
        let result = self
            .reset_color_batched(ids)
            .and_then(|()| self.set_color_batched(ids, rgba));
        self.invisible.end_batch();
        result?;

        self.mark_dirty(DirtyLevel::Hard);
        self.events.publish(ViewerEvent::ColorChanged {
            ids: ids.to_vec(),
            rgba,
        });
        Ok(())
    }

    fn set_color_batched(&mut self, ids: &[ObjectId], rgba: Rgba) -> Result<(), ViewerError> {
        for (buffer_id, group) in self.group_by_owner(ids) {
            let bounds = match self.buffers.get(buffer_id) {
                Some(buffer) => buffer.bounds(&buffer.id_ranges(&group)),
                None => return Err(ViewerError::UnknownBuffer(buffer_id)),
            };

            let mut pending = Vec::new();
            {
                let mut scope = self.buffers.edit(buffer_id, &COLOR_EDIT_CHANNELS, bounds)?;
                for id in group {
                    if scope.is_frozen() {
                        let (moved, kept): (Vec<_>, Vec<_>) = scope
                            .objects()
                            .iter()
                            .cloned()
                            .partition(|record| record.id == id);
                        let Some(record) = moved.into_iter().next() else {
                            log::warn!("Instanz {} nicht im Buffer {:?}", id, buffer_id);
                            continue;
                        };
                        let mut copy = scope.copy(&id);
                        copy.fill_color(rgba);
                        copy.set_transparency(TransparencyClass::of(&rgba));
                        scope.set_objects(kept);
                        copy.set_objects(vec![record.clone()]);
                        pending.push(PendingOverride::Migrated {
                            id,
                            record,
                            buffer: copy,
                        });
                        continue;
                    }

                    match scope.set_color(&id, rgba) {
                        ColorWrite::Applied { previous } => {
                            self.in_place.insert(id, previous);
                        }
                        ColorWrite::ClassMismatch => {
                            let mut copy = scope.copy(&id);
                            copy.fill_color(rgba);
                            copy.set_transparency(scope.transparency().flipped());
                            // Quelle ausblenden, sonst doppelt gezeichnet
                            self.invisible.insert(id.clone());
                            pending.push(PendingOverride::Split { id, buffer: copy });
                        }
                        ColorWrite::NotFound => {
                            log::warn!("Objekt {} ohne Geometrie in Buffer {:?}", id, buffer_id);
                        }
                    }
                }
            }

            for item in pending {
                match item {
                    PendingOverride::Split { id, buffer } => {
                        let hidden_as = self.ordering.override_counterpart(&id);
                        let created = self.buffers.insert_derived(buffer_id, buffer, Some(hidden_as))?;
                        self.registry.insert(id.clone(), created);
                        self.split.insert(id, created);
                    }
                    PendingOverride::Migrated { id, record, buffer } => {
                        let created = self.buffers.insert_derived(buffer_id, buffer, None)?;
                        self.registry.replace_primary(&id, created);
                        self.instance_migrated.insert(
                            id,
                            MigratedInstance {
                                record,
                                source: buffer_id,
                                override_buffer: created,
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Nimmt Overrides zurück. IDs ohne Override werden ignoriert.
    pub fn reset_color(&mut self, ids: &[ObjectId]) -> Result<(), ViewerError> {
        self.invisible.begin_batch();
        let result = self.reset_color_batched(ids);
        self.invisible.end_batch();
        result?;
        self.mark_dirty(DirtyLevel::Hard);
        Ok(())
    }

    /// Nimmt alle aktiven Overrides zurück.
    pub fn reset_colors(&mut self) -> Result<(), ViewerError> {
        let ids: Vec<ObjectId> = self
            .split
            .keys()
            .chain(self.in_place.keys())
            .chain(self.instance_migrated.keys())
            .cloned()
            .collect();
        self.reset_color(&ids)
    }

    fn reset_color_batched(&mut self, ids: &[ObjectId]) -> Result<(), ViewerError> {
        for (buffer_id, group) in self.group_by_owner(ids) {
            let bounds = match self.buffers.get(buffer_id) {
                Some(buffer) => buffer.bounds(&buffer.id_ranges(&group)),
                None => return Err(ViewerError::UnknownBuffer(buffer_id)),
            };

            let mut removed_splits = Vec::new();
            let mut migrated_back = Vec::new();
            {
                let mut scope = self.buffers.edit(buffer_id, &COLOR_EDIT_CHANNELS, bounds)?;
                for id in group {
                    if let Some(override_buffer) = self.split.remove(&id) {
                        self.invisible.remove(&id);
                        removed_splits.push((id, override_buffer));
                    } else if let Some(previous) = self.in_place.remove(&id) {
                        scope.set_color(&id, previous);
                    } else if let Some(migrated) = self.instance_migrated.remove(&id) {
                        migrated_back.push((id, migrated));
                    }
                }
            }

            for (id, override_buffer) in removed_splits {
                self.buffers.remove(override_buffer);
                self.registry.remove_owner(&id, override_buffer);
            }
            for (id, migrated) in migrated_back {
                self.buffers.remove(migrated.override_buffer);
                match self.buffers.get_mut(migrated.source) {
                    Some(source) => {
                        let mut objects = source.objects().to_vec();
                        objects.push(migrated.record);
                        source.set_objects(objects);
                    }
                    None => log::warn!("Quell-Buffer {:?} existiert nicht mehr", migrated.source),
                }
                self.registry.replace_primary(&id, migrated.source);
            }
        }
        Ok(())
    }

    /// Aktive Override-Farbe eines Objekts, falls vorhanden.
    pub fn override_of(&self, id: &ObjectId) -> Option<OverrideKind> {
        if self.in_place.contains_key(id) {
            Some(OverrideKind::InPlace)
        } else if self.split.contains_key(id) {
            Some(OverrideKind::Split)
        } else if self.instance_migrated.contains_key(id) {
            Some(OverrideKind::InstanceMigrated)
        } else {
            None
        }
    }
}

/// Wie ein Farb-Override umgesetzt ist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideKind {
    /// Farbe im ursprünglichen Buffer geschrieben
    InPlace,
    /// Kopie in eigenem Buffer, Quelle ausgeblendet
    Split,
    /// Instanz in eigenen Buffer verschoben
    InstanceMigrated,
}
