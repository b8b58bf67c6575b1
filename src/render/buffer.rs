//! Buffer-Vertrag und die Buffer-Verwaltung des Viewers.
//!
//! Ein Buffer ist ein GPU-residenter Batch mit den Vertex-Attributen eines
//! oder mehrerer Objekte. Der Viewer kennt ihn nur über `GeometryBuffer`.

use super::LayerId;
use crate::core::{ObjectId, Rgba};
use crate::error::ViewerError;
use glam::Mat4;
use indexmap::IndexMap;
use std::ops::{Deref, DerefMut};

/// Handle eines Buffers im `BufferStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Transparenzklasse: opake und geblendete Geometrie liegen in getrennten
/// Buffern und werden in getrennten Pässen gezeichnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransparencyClass {
    /// Alpha == 1
    Opaque,
    /// Alpha < 1
    Blended,
}

impl TransparencyClass {
    /// Klasse einer Farbe.
    pub fn of(rgba: &Rgba) -> Self {
        if rgba[3] < 1.0 {
            TransparencyClass::Blended
        } else {
            TransparencyClass::Opaque
        }
    }

    /// Die jeweils andere Klasse.
    pub fn flipped(self) -> Self {
        match self {
            TransparencyClass::Opaque => TransparencyClass::Blended,
            TransparencyClass::Blended => TransparencyClass::Opaque,
        }
    }

    /// `true` für `Blended`.
    pub fn is_transparent(self) -> bool {
        self == TransparencyClass::Blended
    }
}

/// Vertex-Kanal eines Buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferChannel {
    /// Positionen
    Position,
    /// Normalen
    Normal,
    /// Farben
    Color,
    /// Pick-Farben
    PickColor,
}

/// Kanäle, die bei Farb-Edits gemeinsam gemappt werden.
pub const COLOR_EDIT_CHANNELS: [BufferChannel; 4] = [
    BufferChannel::Position,
    BufferChannel::Normal,
    BufferChannel::Color,
    BufferChannel::PickColor,
];

/// Index-Bereich eines Objekts innerhalb eines Buffers (halboffen).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    /// Erster Index
    pub start: u32,
    /// Index hinter dem letzten
    pub end: u32,
}

/// Fenster über dem Buffer, das für einen Edit gemappt wird.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditBounds {
    /// Erster Index
    pub start: u32,
    /// Index hinter dem letzten
    pub end: u32,
}

impl EditBounds {
    /// Kleinstes Fenster, das alle Bereiche abdeckt.
    pub fn covering(ranges: &[IdRange]) -> Option<Self> {
        let start = ranges.iter().map(|r| r.start).min()?;
        let end = ranges.iter().map(|r| r.end).max()?;
        Some(Self { start, end })
    }
}

/// Ergebnis eines Farb-Writes für eine einzelne ID.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorWrite {
    /// Farbe geschrieben, vorherige Farbe zur Wiederherstellung
    Applied { previous: Rgba },
    /// Neue Farbe gehört in die andere Transparenzklasse
    ClassMismatch,
    /// ID hat keine eigene Geometrie im Buffer (z.B. Instanz)
    NotFound,
}

/// Instanz-Eintrag eines eingefrorenen (wiederverwendeten) Buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    /// Objekt, zu dem die Instanz gehört
    pub id: ObjectId,
    /// Objekt-Transformation
    pub transform: Mat4,
}

/// Vertrag eines Geometrie-Buffers.
pub trait GeometryBuffer {
    /// `true` für eingefrorene (instanzierte/wiederverwendete) Buffer.
    fn is_frozen(&self) -> bool;

    /// Transparenzklasse des Buffers.
    fn transparency(&self) -> TransparencyClass;

    /// Setzt die Transparenzklasse (nur für frisch kopierte Buffer).
    fn set_transparency(&mut self, class: TransparencyClass);

    /// Index-Bereiche der gegebenen IDs (unbekannte IDs werden übersprungen).
    fn id_ranges(&self, ids: &[ObjectId]) -> Vec<IdRange>;

    /// Abdeckendes Fenster über die Bereiche.
    fn bounds(&self, ranges: &[IdRange]) -> Option<EditBounds> {
        EditBounds::covering(ranges)
    }

    /// Mappt die Kanäle im Fenster für einen Edit.
    fn begin_edit(
        &mut self,
        channels: &[BufferChannel],
        bounds: Option<EditBounds>,
    ) -> Result<(), ViewerError>;

    /// Schreibt zurück und gibt das Mapping frei.
    fn end_edit(&mut self);

    /// Schreibt eine Farbe für eine ID.
    fn set_color(&mut self, id: &ObjectId, rgba: Rgba) -> ColorWrite;

    /// Aktuelle Farbe einer ID.
    fn color_of(&self, id: &ObjectId) -> Option<Rgba>;

    /// Kopiert die Daten einer einzelnen ID in einen neuen Buffer.
    fn copy(&self, id: &ObjectId) -> Box<dyn GeometryBuffer>;

    /// Setzt die Farbe aller Vertices.
    fn fill_color(&mut self, rgba: Rgba);

    /// Instanz-Einträge (leer bei nicht eingefrorenen Buffern).
    fn objects(&self) -> &[InstanceRecord];

    /// Ersetzt die Instanz-Einträge.
    fn set_objects(&mut self, objects: Vec<InstanceRecord>);

    /// IDs, deren Geometrie in diesem Buffer liegt.
    fn ids(&self) -> Vec<ObjectId>;
}

/// Eintrag im `BufferStore`.
pub struct BufferEntry {
    buffer: Box<dyn GeometryBuffer>,
    layer: LayerId,
    hidden_as: Option<ObjectId>,
}

impl BufferEntry {
    /// Der Buffer selbst.
    pub fn buffer(&self) -> &dyn GeometryBuffer {
        self.buffer.as_ref()
    }

    /// Layer, der den Buffer zeichnet.
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// ID, unter der der ganze Buffer ein-/ausgeblendet wird.
    ///
    /// Gesetzt für Override-Buffer nach einem Split.
    pub fn hidden_as(&self) -> Option<&ObjectId> {
        self.hidden_as.as_ref()
    }
}

impl std::fmt::Debug for BufferEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferEntry")
            .field("layer", &self.layer)
            .field("frozen", &self.buffer.is_frozen())
            .field("transparency", &self.buffer.transparency())
            .field("hidden_as", &self.hidden_as)
            .finish()
    }
}

/// Verwaltet alle Buffer des Viewers.
#[derive(Debug, Default)]
pub struct BufferStore {
    next_id: u64,
    entries: IndexMap<BufferId, BufferEntry>,
}

impl BufferStore {
    /// Erstellt einen leeren Store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registriert einen Buffer für einen Layer.
    pub fn insert(&mut self, layer: LayerId, buffer: Box<dyn GeometryBuffer>) -> BufferId {
        self.next_id += 1;
        let id = BufferId(self.next_id);
        self.entries.insert(
            id,
            BufferEntry {
                buffer,
                layer,
                hidden_as: None,
            },
        );
        id
    }

    /// Registriert einen aus `source` abgeleiteten Buffer im selben Layer.
    pub fn insert_derived(
        &mut self,
        source: BufferId,
        buffer: Box<dyn GeometryBuffer>,
        hidden_as: Option<ObjectId>,
    ) -> Result<BufferId, ViewerError> {
        let layer = self
            .entries
            .get(&source)
            .map(|e| e.layer)
            .ok_or(ViewerError::UnknownBuffer(source))?;
        let id = self.insert(layer, buffer);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.hidden_as = hidden_as;
        }
        Ok(id)
    }

    /// Entfernt einen Buffer (GPU-Ressourcen werden mit ihm freigegeben).
    pub fn remove(&mut self, id: BufferId) -> Option<Box<dyn GeometryBuffer>> {
        self.entries.shift_remove(&id).map(|e| e.buffer)
    }

    /// Eintrag eines Buffers.
    pub fn entry(&self, id: BufferId) -> Option<&BufferEntry> {
        self.entries.get(&id)
    }

    /// Lesezugriff auf einen Buffer.
    pub fn get(&self, id: BufferId) -> Option<&dyn GeometryBuffer> {
        self.entries.get(&id).map(|e| e.buffer.as_ref())
    }

    /// Schreibzugriff auf einen Buffer außerhalb eines Edit-Scopes.
    pub fn get_mut(&mut self, id: BufferId) -> Option<&mut (dyn GeometryBuffer + 'static)> {
        self.entries.get_mut(&id).map(|e| e.buffer.as_mut())
    }

    /// Öffnet einen Edit-Scope über `bounds`.
    ///
    /// Das Mapping wird freigegeben, sobald der Scope fällt.
    pub fn edit(
        &mut self,
        id: BufferId,
        channels: &[BufferChannel],
        bounds: Option<EditBounds>,
    ) -> Result<EditScope<'_>, ViewerError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(ViewerError::UnknownBuffer(id))?;
        entry.buffer.begin_edit(channels, bounds)?;
        Ok(EditScope {
            buffer: entry.buffer.as_mut(),
        })
    }

    /// Buffer eines Layers in Registrierungsreihenfolge.
    pub fn iter_layer(&self, layer: LayerId) -> impl Iterator<Item = (BufferId, &BufferEntry)> {
        self.entries
            .iter()
            .filter(move |(_, e)| e.layer == layer)
            .map(|(id, e)| (*id, e))
    }

    /// Alle Buffer.
    pub fn iter(&self) -> impl Iterator<Item = (BufferId, &BufferEntry)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    /// Anzahl der Buffer.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true`, wenn keine Buffer registriert sind.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entfernt alle Buffer.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Gemappter Zugriff auf einen Buffer.
///
/// Ruft beim Drop `end_edit` auf, auch bei frühem Rücksprung.
pub struct EditScope<'a> {
    buffer: &'a mut (dyn GeometryBuffer + 'static),
}

impl<'a> Deref for EditScope<'a> {
    type Target = dyn GeometryBuffer + 'static;

    fn deref(&self) -> &Self::Target {
        self.buffer
    }
}

impl<'a> DerefMut for EditScope<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer
    }
}

impl Drop for EditScope<'_> {
    fn drop(&mut self) {
        self.buffer.end_edit();
    }
}
