//! Vertrag der Render-Layer und der Selektoren, mit denen der Viewer
//! Teilmengen der Geometrie anfordert.

use super::buffer::{BufferEntry, BufferId, BufferStore};
use super::gpu::GpuContext;
use crate::core::{CameraMatrices, FreezableIdSet, ObjectId};
use glam::Vec3;

/// Index eines Layers im Viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub usize);

/// Dirty-Level des Viewers; zugleich der Grund für ein Neuzeichnen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DirtyLevel {
    /// Nichts zu tun
    #[default]
    Clean,
    /// Neuzeichnen, aber höchstens alle `soft_repaint_interval_ms`
    Soft,
    /// Im nächsten Frame neuzeichnen
    Hard,
}

/// Pass, für den ein Selektor gilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorPass {
    /// Normale Farbausgabe
    Color,
    /// Pick-IDs, Normalen und Tiefe ins Pick-Target
    Pick,
    /// Nur Stencil (Silhouette für Outlines)
    Stencil,
}

/// Ob die ID-Menge aus- oder eingeschlossen wird.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorMode {
    /// Alles außer den IDs
    Exclude,
    /// Nur die IDs
    Include,
}

/// Auswahl der zu zeichnenden Objekte.
#[derive(Debug, Clone, Copy)]
pub struct RenderSelector<'a> {
    /// ID-Menge
    pub ids: &'a FreezableIdSet,
    /// Aus- oder Einschluss
    pub mode: SelectorMode,
    /// Ziel-Pass
    pub pass: SelectorPass,
}

impl<'a> RenderSelector<'a> {
    /// Alles außer `ids` in Farbe.
    pub fn exclude(ids: &'a FreezableIdSet) -> Self {
        Self {
            ids,
            mode: SelectorMode::Exclude,
            pass: SelectorPass::Color,
        }
    }

    /// Nur `ids` im gegebenen Pass.
    pub fn include(ids: &'a FreezableIdSet, pass: SelectorPass) -> Self {
        Self {
            ids,
            mode: SelectorMode::Include,
            pass,
        }
    }

    /// Alles außer `ids` ins Pick-Target.
    pub fn pick(ids: &'a FreezableIdSet) -> Self {
        Self {
            ids,
            mode: SelectorMode::Exclude,
            pass: SelectorPass::Pick,
        }
    }

    /// Ob ein Objekt gezeichnet wird.
    pub fn admits(&self, id: &ObjectId) -> bool {
        match self.mode {
            SelectorMode::Exclude => !self.ids.contains(id),
            SelectorMode::Include => self.ids.contains(id),
        }
    }

    /// Ob ein Buffer überhaupt in Frage kommt.
    ///
    /// Override-Buffer werden über ihre augmentierte ID ausgeblendet.
    pub fn admits_buffer(&self, entry: &BufferEntry) -> bool {
        match (self.mode, entry.hidden_as()) {
            (SelectorMode::Exclude, Some(hidden_as)) => !self.ids.contains(hidden_as),
            _ => true,
        }
    }

    /// Ob ein Objekt innerhalb eines zugelassenen Buffers gezeichnet wird.
    ///
    /// Override-Buffer filtern nur als Ganzes: ihre Objekt-ID steht im
    /// Invisible-Set, weil die Quelle ausgeblendet ist.
    pub fn admits_in(&self, entry: &BufferEntry, id: &ObjectId) -> bool {
        match (self.mode, entry.hidden_as()) {
            (SelectorMode::Exclude, Some(_)) => true,
            _ => self.admits(id),
        }
    }
}

/// Pro Frame konstante Daten für alle Layer.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    /// Eingefrorene Kamera-Matrizen
    pub camera: &'a CameraMatrices,
    /// Augenposition
    pub eye: Vec3,
    /// Viewport-Breite in Pixeln
    pub width: u32,
    /// Viewport-Höhe in Pixeln
    pub height: u32,
}

/// Sicht eines Layers auf die eigenen Buffer.
#[derive(Debug, Clone, Copy)]
pub struct LayerBuffers<'a> {
    store: &'a BufferStore,
    layer: LayerId,
}

impl<'a> LayerBuffers<'a> {
    /// Erstellt die Sicht für `layer`.
    pub fn new(store: &'a BufferStore, layer: LayerId) -> Self {
        Self { store, layer }
    }

    /// Buffer des Layers in Registrierungsreihenfolge.
    pub fn iter(&self) -> impl Iterator<Item = (BufferId, &'a BufferEntry)> + 'a {
        self.store.iter_layer(self.layer)
    }

    /// Buffer des Layers, die zum Selektor und zur Transparenzklasse passen.
    pub fn selected<'s>(
        &self,
        selector: &'s RenderSelector<'s>,
        transparent: bool,
    ) -> impl Iterator<Item = (BufferId, &'a BufferEntry)> + 's
    where
        'a: 's,
    {
        self.iter().filter(move |(_, entry)| {
            entry.buffer().transparency().is_transparent() == transparent
                && selector.admits_buffer(entry)
        })
    }

    /// Layer dieser Sicht.
    pub fn layer(&self) -> LayerId {
        self.layer
    }
}

/// Ein Layer zeichnet eine benannte Teilmenge der Geometrie.
///
/// Der Viewer setzt vor jedem Aufruf den Raster-Zustand über den
/// `GpuContext`; Layer ändern ihn nicht.
pub trait RenderLayer<G: GpuContext> {
    /// Vorbereitung vor dem Frame (z.B. LOD-Auswahl).
    fn prepare_render(&mut self, reason: DirtyLevel);

    /// Kanten und Linien, vor aktiviertem Face-Culling.
    fn render_lines(&mut self, gpu: &mut G, frame: &FrameContext<'_>);

    /// Flächen eines Transparenz-Passes, gefiltert durch `selector`.
    fn render(
        &mut self,
        gpu: &mut G,
        frame: &FrameContext<'_>,
        buffers: LayerBuffers<'_>,
        transparent: bool,
        selector: &RenderSelector<'_>,
    );

    /// Outlines der selektierten Objekte.
    fn render_selection_outlines(
        &mut self,
        gpu: &mut G,
        frame: &FrameContext<'_>,
        buffers: LayerBuffers<'_>,
        selected: &FreezableIdSet,
        width_offset: f32,
    );

    /// Optionale Kachel-Ränder.
    fn render_tile_borders(&mut self, _gpu: &mut G, _frame: &FrameContext<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::IdOrdering;

    #[test]
    fn selector_modes() {
        let mut ids = FreezableIdSet::new(IdOrdering::Numeric);
        ids.insert(ObjectId::Numeric(1));

        let exclude = RenderSelector::exclude(&ids);
        assert!(!exclude.admits(&ObjectId::Numeric(1)));
        assert!(exclude.admits(&ObjectId::Numeric(2)));

        let include = RenderSelector::include(&ids, SelectorPass::Stencil);
        assert!(include.admits(&ObjectId::Numeric(1)));
        assert!(!include.admits(&ObjectId::Numeric(2)));
        assert_eq!(RenderSelector::pick(&ids).pass, SelectorPass::Pick);
    }

    #[test]
    fn dirty_levels_are_ordered() {
        assert!(DirtyLevel::Hard > DirtyLevel::Soft);
        assert!(DirtyLevel::Soft > DirtyLevel::Clean);
        assert_eq!(DirtyLevel::Soft.max(DirtyLevel::Hard), DirtyLevel::Hard);
    }
}
