//! Sichtbarkeit und Selektion.

use super::Viewer;
use crate::core::{FreezableIdSet, ObjectId, ViewObject, ViewerEvent};
use crate::render::{DirtyLevel, GpuContext};

impl<G: GpuContext> Viewer<G> {
    /// Blendet IDs ein oder aus.
    ///
    /// Das Override-Gegenstück jeder ID wird mitgeschaltet, auch wenn es
    /// noch nicht existiert. Quellen von Split-Overrides bleiben immer
    /// ausgeblendet.
    pub fn set_visibility(&mut self, mut ids: Vec<ObjectId>, visible: bool) {
        self.ordering.sort(&mut ids);
        let ordering = self.ordering;
        let split = &self.split;

        self.invisible.batch(|set| {
            for id in &ids {
                let counterpart = ordering.override_counterpart(id);
                if visible {
                    set.remove(id);
                    set.remove(&counterpart);
                } else {
                    set.insert(id.clone());
                    set.insert(counterpart);
                }
            }
            for id in split.keys() {
                set.insert(id.clone());
            }
        });

        log::debug!("Sichtbarkeit {} für {} IDs", visible, ids.len());
        self.mark_dirty(DirtyLevel::Hard);
        self.events
            .publish(ViewerEvent::VisibilityChanged { ids, visible });
    }

    /// Blendet alles wieder ein (außer Split-Override-Quellen).
    pub fn reset_visibility(&mut self) {
        let ids = self.invisible.to_vec();
        self.set_visibility(ids, true);
    }

    /// Setzt den Selektionszustand, optional nach vorherigem Leeren.
    pub fn set_selection_state(&mut self, ids: Vec<ObjectId>, selected: bool, clear: bool) {
        self.selected.batch(|set| {
            if clear {
                set.clear();
            }
            for id in &ids {
                if selected {
                    set.insert(id.clone());
                } else {
                    set.remove(id);
                }
            }
        });

        self.mark_dirty(DirtyLevel::Hard);
        self.events
            .publish(ViewerEvent::SelectionStateChanged { ids, selected });
    }

    /// ViewObjects der Selektion (unbekannte IDs fehlen).
    pub fn selected(&self) -> Vec<&ViewObject> {
        self.selected
            .iter()
            .filter_map(|id| self.objects.get(id))
            .collect()
    }

    /// Das Selektions-Set.
    pub fn selection(&self) -> &FreezableIdSet {
        &self.selected
    }
}
