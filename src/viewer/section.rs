//! Schnittebene: Aktivieren per Pick, Ziehen, Widget-Positionierung.

use super::{PickRequest, Viewer};
use crate::core::{SectionAxis, SectionPlaneWidget, DISABLED_PLANE};
use crate::error::ViewerError;
use crate::render::{DirtyLevel, GpuContext};
use glam::{Vec2, Vec3, Vec4};

impl<G: GpuContext> Viewer<G> {
    /// Normierte Canvas-Position wie beim Ziehen verwendet (`y` nach oben).
    fn normalized_canvas(&self, canvas_pos: [f32; 2]) -> Vec2 {
        Vec2::new(
            canvas_pos[0] / self.width as f32,
            -canvas_pos[1] / self.height as f32,
        )
    }

    /// Aktiviert die Schnittebene an der Oberfläche unter `canvas_pos`.
    ///
    /// Liefert `false`, wenn dort kein Objekt liegt.
    pub fn enable_section_plane(&mut self, canvas_pos: [f32; 2]) -> Result<bool, ViewerError> {
        let picked = self.pick(PickRequest::inspect(canvas_pos[0], canvas_pos[1]))?;
        if picked.object.is_none() {
            return Ok(false);
        }

        let normal = self.helper.normal_section_plane(picked.normal);
        self.helper.save_last_normal(normal);
        let depth = match self.helper.axis().index() {
            None => picked.coordinates.dot(normal),
            Some(index) => match &self.widget {
                Some(widget) => widget.corners[0][index],
                None => self
                    .helper
                    .default_coordinate(Some(picked.coordinates[index]), index),
            },
        };

        self.section.plane = normal.extend(depth);
        self.section.initial_d = depth;
        self.section.enabled = true;
        self.section.pick_depth = picked.depth;
        self.section.down_at = self.normalized_canvas(canvas_pos);
        log::info!("Schnittebene aktiviert: {:?}", self.section.plane);
        self.mark_dirty(DirtyLevel::Hard);
        Ok(true)
    }

    /// Verschiebt die Ebene entlang ihrer Normalen entsprechend der
    /// Mausbewegung seit dem Aktivieren.
    pub fn move_section_plane(&mut self, canvas_pos: [f32; 2]) {
        if !self.section.enabled {
            log::debug!("move_section_plane ohne aktive Schnittebene");
            return;
        }
        let normal = self.section.plane.truncate();
        let direction = self.camera.matrices().view_projection * normal.extend(0.0);
        let delta = self.normalized_canvas(canvas_pos) - self.section.down_at;
        let aspect = self.width as f32 / self.height as f32;
        let screen_direction = Vec2::new(direction.x, direction.y / aspect);
        let offset = screen_direction.dot(delta) * self.section.pick_depth;

        let coordinate = self.section.initial_d + offset;
        self.section.plane.w = coordinate;
        self.helper.set_moving(true);
        self.move_section_plane_widget(coordinate);
        self.mark_dirty(DirtyLevel::Hard);
    }

    /// Schiebt das Widget auf die Ebenen-Koordinate `coordinate`.
    pub fn move_section_plane_widget(&mut self, coordinate: f32) {
        match self.helper.axis().index() {
            Some(index) => {
                let normal = self.helper.axis().unit().unwrap_or(Vec3::Z);
                let mut center = Vec3::ZERO;
                center[index] = self.helper.default_coordinate(Some(coordinate), index);
                self.position_widget(normal, center);
            }
            None => {
                let Some(widget) = self.widget else {
                    return;
                };
                let normal = self.section.plane.truncate();
                let center = self.helper.create_center(&widget, normal, coordinate);
                self.position_widget(normal, center);
            }
        }
    }

    /// Vorschau: Widget an der Oberfläche unter `canvas_pos` platzieren.
    pub fn position_section_plane_widget(
        &mut self,
        canvas_pos: [f32; 2],
    ) -> Result<bool, ViewerError> {
        let picked = self.pick(PickRequest::inspect(canvas_pos[0], canvas_pos[1]))?;
        if picked.object.is_none() {
            return Ok(false);
        }
        let normal = self.helper.normal_section_plane(picked.normal);
        let center = self.helper.coordinates_section_plane(picked.coordinates);
        self.position_widget(normal, center);
        Ok(true)
    }

    fn position_widget(&mut self, normal: Vec3, center: Vec3) {
        self.widget = Some(SectionPlaneWidget::position(&self.helper, normal, center));
    }

    /// Schaltet die Schnittebene ab und vergisst die freie Normale.
    pub fn disable_section_plane(&mut self) {
        self.section.plane = DISABLED_PLANE;
        self.section.enabled = false;
        self.helper.disable();
        log::info!("Schnittebene deaktiviert");
        self.mark_dirty(DirtyLevel::Hard);
    }

    /// Entfernt das Widget.
    pub fn remove_section_plane_widget(&mut self) {
        self.widget = None;
    }

    /// Achsen-Modus der Schnittebene.
    pub fn set_section_axis(&mut self, axis: SectionAxis) {
        self.helper.set_axis(axis);
    }

    /// Aktueller Achsen-Modus.
    pub fn section_axis(&self) -> SectionAxis {
        self.helper.axis()
    }

    /// Aktuelles Widget, falls positioniert.
    pub fn section_plane_widget(&self) -> Option<&SectionPlaneWidget> {
        self.widget.as_ref()
    }

    /// Aktive Ebene `(n, d)` mit `n · p = d`, `None` wenn abgeschaltet.
    pub fn section_plane(&self) -> Option<Vec4> {
        self.section.enabled.then_some(self.section.plane)
    }

    /// `true`, während die Ebene gezogen wird.
    pub fn is_section_plane_moving(&self) -> bool {
        self.helper.is_moving()
    }
}
