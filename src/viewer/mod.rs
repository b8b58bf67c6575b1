//! Der Viewer: Kamera, Picking, Sichtbarkeit/Selektion, Farb-Overrides,
//! Schnittebene und Frame-Loop über einem `GpuContext`.
//!
//! Alle Operationen laufen auf dem Thread, der den Viewer besitzt.
//! Geometrie zeichnen die registrierten Render-Layer.

mod color;
mod draw;
mod frame_loop;
mod picking;
mod section;
mod visibility;

pub use color::OverrideKind;
pub use frame_loop::{FpsReport, FrameOutcome};
pub use picking::{PickRequest, PickResult};

use crate::core::{
    Aabb, Camera3D, EventBus, FreezableIdSet, IdOrdering, ObjectId, ObjectIndex, PickId, Rgba,
    SectionPlaneHelper, SectionPlaneWidget, SubscriptionId, UniqueIdRegistry, ViewObject,
    ViewerEvent, DISABLED_PLANE,
};
use crate::error::ViewerError;
use crate::render::{
    BufferId, BufferStore, DirtyLevel, GeometryBuffer, GpuContext, InstanceRecord, LayerId,
    RenderLayer,
};
use crate::shared::ViewerOptions;
use glam::{Vec2, Vec4};
use std::collections::HashMap;

/// Tastatur-Kürzel des Viewers (ohne DOM-Bindung).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerShortcut {
    /// Alles wieder einblenden
    ShowAll,
    /// Selektion ausblenden und Selektion aufheben
    HideSelected,
    /// Alle Farb-Overrides zurücksetzen
    ResetColors,
    /// Selektion einfärben und Selektion aufheben
    ColorSelected(Rgba),
}

/// Instanz, die für einen Farb-Override in einen eigenen Buffer umgezogen ist.
#[derive(Debug, Clone, PartialEq)]
pub struct MigratedInstance {
    /// Der verschobene Instanz-Eintrag
    pub record: InstanceRecord,
    /// Ursprünglicher (eingefrorener) Buffer
    pub source: BufferId,
    /// Neuer Buffer mit der Override-Farbe
    pub override_buffer: BufferId,
}

/// Zustand der Schnittebene.
#[derive(Debug, Clone, Copy)]
struct SectionState {
    /// Arbeitsebene `(n, d)`, wird bei jedem Frame in den Kontext geladen
    plane: Vec4,
    enabled: bool,
    /// Eye-Tiefe des Picks, mit dem die Ebene aktiviert wurde
    pick_depth: f32,
    initial_d: f32,
    /// Normierte Canvas-Position beim Aktivieren
    down_at: Vec2,
    /// Abstand Auge-Ebene des letzten Frames
    last_adjustment: f32,
}

impl Default for SectionState {
    fn default() -> Self {
        Self {
            plane: DISABLED_PLANE,
            enabled: false,
            pick_depth: 0.0,
            initial_d: 0.0,
            down_at: Vec2::ZERO,
            last_adjustment: 0.0,
        }
    }
}

/// Zeitstempel des Frame-Loops.
#[derive(Debug, Clone, Copy, Default)]
struct FrameTiming {
    /// Sekunden des letzten Frames
    then: f64,
    /// Millisekunden des letzten Redraws
    last_repaint: f64,
    /// Beginn des FPS-Fensters (Sekunden)
    window_start: f64,
    frames: u32,
    redraws: u32,
}

type AnimationListener = Box<dyn FnMut(f32)>;

/// Render- und Objektzustands-Engine eines geladenen Modells.
pub struct Viewer<G: GpuContext> {
    gpu: G,
    options: ViewerOptions,
    ordering: IdOrdering,
    width: u32,
    height: u32,

    camera: Camera3D,
    camera_set: bool,
    model_bounds: Option<Aabb>,

    objects: ObjectIndex,
    registry: UniqueIdRegistry<BufferId>,
    buffers: BufferStore,
    layers: Vec<Box<dyn RenderLayer<G>>>,

    invisible: FreezableIdSet,
    selected: FreezableIdSet,

    // Farb-Overrides, eine ID steht in höchstens einer Map
    in_place: HashMap<ObjectId, Rgba>,
    split: HashMap<ObjectId, BufferId>,
    instance_migrated: HashMap<ObjectId, MigratedInstance>,

    section: SectionState,
    helper: SectionPlaneHelper,
    widget: Option<SectionPlaneWidget>,

    dirty: DirtyLevel,
    timing: FrameTiming,
    events: EventBus,
    animation_listeners: Vec<AnimationListener>,
}

impl<G: GpuContext> Viewer<G> {
    /// Erstellt einen Viewer auf einem fertig initialisierten GPU-Kontext.
    ///
    /// Ein fehlender Kontext fällt bereits bei dessen Erstellung auf
    /// (`ViewerError::GpuUnavailable`), der Viewer startet nie ohne.
    pub fn new(mut gpu: G, options: ViewerOptions) -> Self {
        let ordering = options.id_ordering();
        let width = options.viewport_width.max(1);
        let height = options.viewport_height.max(1);
        gpu.set_viewport(width, height);
        log::info!(
            "Viewer erstellt: {}x{}, OIT={}, Ordnung={:?}",
            width,
            height,
            options.order_independent_transparency,
            ordering
        );

        Self {
            gpu,
            ordering,
            width,
            height,
            camera: Camera3D::new(width as f32, height as f32),
            camera_set: false,
            model_bounds: None,
            objects: ObjectIndex::new(),
            registry: UniqueIdRegistry::new(ordering),
            buffers: BufferStore::new(),
            layers: Vec::new(),
            invisible: FreezableIdSet::new(ordering),
            selected: FreezableIdSet::new(ordering),
            in_place: HashMap::new(),
            split: HashMap::new(),
            instance_migrated: HashMap::new(),
            section: SectionState::default(),
            helper: SectionPlaneHelper::new(),
            widget: None,
            dirty: DirtyLevel::Hard,
            timing: FrameTiming::default(),
            events: EventBus::new(),
            animation_listeners: Vec::new(),
            options,
        }
    }

    // ── Zugriff ─────────────────────────────────────────────────────

    /// Der GPU-Kontext.
    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    /// Schreibzugriff auf den GPU-Kontext.
    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    /// Aktive Optionen.
    pub fn options(&self) -> &ViewerOptions {
        &self.options
    }

    /// Die Kamera.
    pub fn camera(&self) -> &Camera3D {
        &self.camera
    }

    /// Schreibzugriff auf die Kamera (Kamera-Steuerung); markiert Hard-Dirty.
    pub fn camera_mut(&mut self) -> &mut Camera3D {
        self.mark_dirty(DirtyLevel::Hard);
        &mut self.camera
    }

    /// Die ID-Ordnung von Sets und Registry.
    pub fn ordering(&self) -> IdOrdering {
        self.ordering
    }

    /// Aktuelle Modell-Bounds (vereinigt über alle `set_model_bounds`).
    pub fn model_bounds(&self) -> Option<Aabb> {
        self.model_bounds
    }

    /// Viewport-Größe in Pixeln.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Aktueller Dirty-Level.
    pub fn dirty(&self) -> DirtyLevel {
        self.dirty
    }

    /// Ausgeblendete IDs.
    pub fn invisible(&self) -> &FreezableIdSet {
        &self.invisible
    }

    /// Alle Buffer.
    pub fn buffers(&self) -> &BufferStore {
        &self.buffers
    }

    /// Besitzende Buffer einer ID.
    pub fn owners_of(&self, id: &ObjectId) -> Option<&[BufferId]> {
        self.registry.get(id)
    }

    /// Anzahl registrierter Layer.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    // ── Registrierung ───────────────────────────────────────────────

    /// Hängt einen Render-Layer an. Layer zeichnen in Registrierungsreihenfolge.
    pub fn add_layer(&mut self, layer: Box<dyn RenderLayer<G>>) -> LayerId {
        let id = LayerId(self.layers.len());
        self.layers.push(layer);
        self.mark_dirty(DirtyLevel::Hard);
        id
    }

    /// Registriert ein ViewObject und vergibt seine Pick-ID.
    pub fn add_view_object(&mut self, object: ViewObject) -> PickId {
        self.objects.add(object)
    }

    /// ViewObject zu einer ID.
    pub fn get_view_object(&self, id: &ObjectId) -> Option<&ViewObject> {
        self.objects.get(id)
    }

    /// Alle registrierten ViewObjects.
    pub fn view_objects(&self) -> &ObjectIndex {
        &self.objects
    }

    /// Registriert einen geladenen Buffer und trägt seine IDs in die Registry ein.
    pub fn register_buffer(&mut self, layer: LayerId, buffer: Box<dyn GeometryBuffer>) -> BufferId {
        let ids = buffer.ids();
        let id = self.buffers.insert(layer, buffer);
        self.registry.insert_batch(ids.into_iter().map(|oid| (oid, id)));
        self.mark_dirty(DirtyLevel::Soft);
        id
    }

    /// Pick-Farbe (4 Bytes little-endian) eines Objekts.
    pub fn pick_color(&self, id: &ObjectId) -> Option<[u8; 4]> {
        match self.objects.get(id) {
            Some(object) => Some(crate::core::encode_pick_color(object.pick_id)),
            None => {
                log::error!("Kein ViewObject für {}", id);
                None
            }
        }
    }

    /// IDs aller Objekte der angegebenen Typen.
    pub fn ids_of_types(&self, types: &[&str]) -> Vec<ObjectId> {
        self.objects.ids_of_types(types)
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Meldet einen Event-Listener an.
    pub fn subscribe(&mut self, listener: impl FnMut(&ViewerEvent) + 'static) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    /// Meldet einen Event-Listener ab.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Listener, der nach jedem Frame die Delta-Zeit in Sekunden erhält.
    pub fn add_animation_listener(&mut self, listener: impl FnMut(f32) + 'static) {
        self.animation_listeners.push(Box::new(listener));
    }

    // ── Dirty / Kamera / Bounds ─────────────────────────────────────

    /// Hebt den Dirty-Level an (nie herab).
    pub fn mark_dirty(&mut self, level: DirtyLevel) {
        self.dirty = self.dirty.max(level);
    }

    /// Neue Canvas-Größe.
    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.camera.set_viewport(self.width as f32, self.height as f32);
        self.gpu.set_viewport(self.width, self.height);
        self.mark_dirty(DirtyLevel::Hard);
    }

    /// Vereinigt neue Modell-Bounds mit den bekannten.
    pub fn set_model_bounds(&mut self, bounds: Aabb) {
        let merged = match self.model_bounds {
            Some(existing) => existing.union(&bounds),
            None => bounds,
        };
        log::info!("Modell-Bounds: {:?}", merged.to_array());
        self.model_bounds = Some(merged);
        self.camera.set_model_bounds(&merged);
        self.helper.set_model_bounds(merged);
        self.mark_dirty(DirtyLevel::Hard);
    }

    /// Richtet die Kamera auf die Bounding-Boxen der Objekte aus.
    pub fn view_fit(&mut self, ids: &[ObjectId]) -> Result<(), ViewerError> {
        let aabb = ids
            .iter()
            .filter_map(|id| self.objects.get(id))
            .filter_map(|object| object.aabb)
            .fold(Aabb::empty(), |acc, aabb| acc.union(&aabb));
        if aabb.is_empty() {
            log::error!("Keine AABB für Objekte {:?}", ids);
            return Err(ViewerError::NoBoundingBoxes(ids.to_vec()));
        }
        self.camera.view_fit(&aabb);
        self.mark_dirty(DirtyLevel::Hard);
        Ok(())
    }

    /// Erzwingt erneutes Auto-Fit im nächsten Frame.
    pub fn reset_camera(&mut self) {
        self.camera_set = false;
        self.mark_dirty(DirtyLevel::Hard);
    }

    /// Signal des Loaders, dass alle Layer geladen sind.
    pub fn loading_done(&mut self) {
        log::info!(
            "Laden abgeschlossen: {} Objekte, {} Buffer",
            self.objects.len(),
            self.buffers.len()
        );
        self.mark_dirty(DirtyLevel::Hard);
    }

    // ── Kürzel ──────────────────────────────────────────────────────

    /// Führt ein Tastatur-Kürzel aus.
    pub fn apply_shortcut(&mut self, shortcut: ViewerShortcut) -> Result<(), ViewerError> {
        match shortcut {
            ViewerShortcut::ShowAll => self.reset_visibility(),
            ViewerShortcut::HideSelected => {
                let ids = self.selected.to_vec();
                self.set_visibility(ids, false);
                self.selected.clear();
            }
            ViewerShortcut::ResetColors => self.reset_colors()?,
            ViewerShortcut::ColorSelected(rgba) => {
                let ids = self.selected.to_vec();
                self.set_color(&ids, rgba)?;
                self.selected.clear();
            }
        }
        Ok(())
    }
}

impl<G: GpuContext> std::fmt::Debug for Viewer<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("objects", &self.objects.len())
            .field("buffers", &self.buffers.len())
            .field("layers", &self.layers.len())
            .field("dirty", &self.dirty)
            .field("section_enabled", &self.section.enabled)
            .finish()
    }
}
