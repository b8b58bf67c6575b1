//! GPU-Picking: Pick-Pass ins Offscreen-Target, Read-back und Unprojektion.

use super::draw::render_layers;
use super::Viewer;
use crate::core::{decode_pick_color, ViewObject, ViewerEvent};
use crate::error::ViewerError;
use crate::render::{
    ClearRequest, DirtyLevel, FrameContext, GpuContext, RasterState, RenderSelector, RenderTarget,
};
use glam::Vec3;

/// Anfrage für einen Pick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickRequest {
    /// Canvas-Position in Pixeln (Pflicht)
    pub canvas_pos: Option<[f32; 2]>,
    /// Selektion anhand des Treffers ändern
    pub select: bool,
    /// Modifier-Taste: Selektion nie leeren, nur umschalten
    pub additive: bool,
}

impl PickRequest {
    /// Pick mit Selektion an einer Canvas-Position.
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            canvas_pos: Some([x, y]),
            select: true,
            additive: false,
        }
    }

    /// Pick ohne Selektionsänderung.
    pub fn inspect(x: f32, y: f32) -> Self {
        Self {
            select: false,
            ..Self::at(x, y)
        }
    }

    /// Mit gedrückter Modifier-Taste.
    pub fn with_modifier(self) -> Self {
        Self {
            additive: true,
            ..self
        }
    }
}

impl Default for PickRequest {
    fn default() -> Self {
        Self {
            canvas_pos: None,
            select: true,
            additive: false,
        }
    }
}

/// Ergebnis eines Picks.
#[derive(Debug, Clone, PartialEq)]
pub struct PickResult {
    /// Getroffenes Objekt (`None` bei Hintergrund)
    pub object: Option<ViewObject>,
    /// Normale am Pixel
    pub normal: Vec3,
    /// Unprojizierter Weltpunkt
    pub coordinates: Vec3,
    /// Abstand Auge → Oberfläche (negiertes View-Space-Z)
    pub depth: f32,
}

/// Pixel unter der gerundeten Canvas-Position, `None` außerhalb des Viewports.
fn viewport_pixel(x: f32, y: f32, width: u32, height: u32) -> Option<(u32, u32)> {
    let inside = |v: f32, extent: u32| v >= 0.0 && v < extent as f32;
    (inside(x, width) && inside(y, height)).then(|| (x as u32, y as u32))
}

impl<G: GpuContext> Viewer<G> {
    /// Pickt das Objekt unter der Canvas-Position.
    ///
    /// Ohne Treffer wird die Selektion geleert (falls `select`) und ein
    /// Ergebnis ohne Objekt, aber mit Weltpunkt auf der Far-Plane geliefert.
    /// Positionen außerhalb des Viewports gelten als Fehlgriff ohne Read-back.
    pub fn pick(&mut self, request: PickRequest) -> Result<PickResult, ViewerError> {
        let [canvas_x, canvas_y] = request
            .canvas_pos
            .ok_or(ViewerError::MissingPickCoordinates)?;

        let mut plane = self.section.plane;
        if self.section.enabled && self.options.pick_plane_adjustment {
            plane.w -= self.options.section_plane_epsilon * self.section.last_adjustment;
        }

        let matrices = *self.camera.matrices();
        let frame = FrameContext {
            camera: &matrices,
            eye: matrices.view_inverse.w_axis.truncate(),
            width: self.width,
            height: self.height,
        };

        let gpu = &mut self.gpu;
        gpu.set_clip_plane(plane);
        gpu.bind_target(RenderTarget::Pick);
        gpu.apply_state(RasterState::DEFAULT);
        gpu.clear(ClearRequest {
            color: Some([0.0; 4]),
            depth: true,
            stencil: false,
        });

        let selector = RenderSelector::pick(&self.invisible);
        render_layers(
            &mut self.layers,
            gpu,
            &frame,
            &self.buffers,
            &[false, true],
            &selector,
        );

        let (px, py) = (canvas_x.round(), canvas_y.round());
        let pixel = viewport_pixel(px, py, self.width, self.height);

        // Außerhalb des Viewports ist nichts zu treffen
        let (hit, normal, raw_depth) = match pixel {
            Some((x, y)) => {
                let color = gpu.read_pick_color(x, y);
                let normal = gpu.read_pick_normal(x, y);
                let hit = match &color {
                    Ok(bytes) => self.objects.by_pick_id(decode_pick_color(*bytes)).cloned(),
                    Err(_) => None,
                };
                // Tiefe nur bei Treffer, sonst Far-Plane
                let raw_depth = match hit {
                    Some(_) => Some(gpu.read_pick_depth(x, y)),
                    None => None,
                };
                gpu.bind_target(RenderTarget::Main);
                color?;
                (hit, normal?, raw_depth)
            }
            None => {
                gpu.bind_target(RenderTarget::Main);
                (None, Vec3::ZERO, None)
            }
        };

        let z = match raw_depth {
            Some(depth) => depth? * 2.0 - 1.0,
            None => 1.0,
        };

        let ndc = Vec3::new(
            px / self.width as f32 * 2.0 - 1.0,
            -py / self.height as f32 * 2.0 + 1.0,
            z,
        );
        let view_space = matrices.projection_inverse.project_point3(ndc);
        let depth = -view_space.z;
        let coordinates = matrices.view_inverse.transform_point3(view_space);
        log::debug!(
            "Pick @ ({}, {}): {:?} bei {:?}",
            px,
            py,
            hit.as_ref().map(|o| &o.unique_id),
            coordinates
        );

        if request.select {
            match &hit {
                Some(object) => self.toggle_picked(object, request.additive),
                None => {
                    self.clear_selection_after_pick();
                }
            }
        }

        Ok(PickResult {
            object: hit,
            normal,
            coordinates,
            depth,
        })
    }

    fn toggle_picked(&mut self, object: &ViewObject, additive: bool) {
        let id = object.unique_id.clone();
        // Vor dem Leeren abfragen, sonst wäre ein Re-Pick immer "neu"
        let was_selected = self.selected.contains(&id);
        let cleared = !additive && self.clear_selection_after_pick();

        if was_selected {
            if !cleared {
                self.selected.remove(&id);
                self.events.publish(ViewerEvent::SelectionStateChanged {
                    ids: vec![id],
                    selected: false,
                });
            }
        } else {
            self.selected.insert(id.clone());
            self.events.publish(ViewerEvent::SelectionStateChanged {
                ids: vec![id],
                selected: true,
            });
        }
        self.mark_dirty(DirtyLevel::Hard);
    }

    /// Leert die Selektion mit einem Event. `true`, wenn etwas selektiert war.
    fn clear_selection_after_pick(&mut self) -> bool {
        if self.selected.is_empty() {
            return false;
        }
        let ids = self.selected.to_vec();
        self.selected.clear();
        self.events.publish(ViewerEvent::SelectionStateChanged {
            ids,
            selected: false,
        });
        self.mark_dirty(DirtyLevel::Hard);
        true
    }
}
