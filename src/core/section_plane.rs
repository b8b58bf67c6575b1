//! Geometrie-Helfer für die Schnittebene und ihr Widget.
//!
//! Reine Funktionen über explizitem Zustand: aktive Achse, Modell-Bounds
//! und die zuletzt gepickte freie Normale.

use super::Aabb;
use glam::{Vec3, Vec4};

/// Ebenenwerte einer deaktivierten Schnittebene (clippt nichts).
pub const DISABLED_PLANE: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

/// Zuschlag auf die Modell-Ausdehnung bei achsparalleler Ebene.
const AXIS_SCALE_MARGIN: f32 = 0.1;
/// Anteil der dominanten Ausdehnung im freien Modus.
const FREE_SCALE_FACTOR: f32 = 0.15;
/// Widget-Größe, wenn die Normale keine dominante Achse hat.
const FALLBACK_SCALE: f32 = 500.0;
/// Schwelle, ab der Normale und Referenzachse als fast parallel gelten.
const REF_PARALLEL_LIMIT: f32 = 0.9;

/// Aktive Achse der Schnittebene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SectionAxis {
    /// Ebene senkrecht zu X
    X,
    /// Ebene senkrecht zu Y
    Y,
    /// Ebene senkrecht zu Z
    Z,
    /// Normale aus dem Pick übernommen
    #[default]
    Free,
}

impl SectionAxis {
    /// Komponenten-Index der Achse (`None` im freien Modus).
    pub fn index(self) -> Option<usize> {
        match self {
            SectionAxis::X => Some(0),
            SectionAxis::Y => Some(1),
            SectionAxis::Z => Some(2),
            SectionAxis::Free => None,
        }
    }

    /// Einheitsvektor der Achse (`None` im freien Modus).
    pub fn unit(self) -> Option<Vec3> {
        self.index().map(|i| {
            let mut v = Vec3::ZERO;
            v[i] = 1.0;
            v
        })
    }
}

/// Halbe Kantenlängen des Widget-Quads entlang U und V.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionScale {
    /// Ausdehnung entlang U
    pub u: f32,
    /// Ausdehnung entlang V
    pub v: f32,
}

/// Zustand und Mathematik für die Platzierung des Schnittebenen-Widgets.
#[derive(Debug, Clone, Default)]
pub struct SectionPlaneHelper {
    axis: SectionAxis,
    model_bounds: Option<Aabb>,
    last_normal: Option<Vec3>,
    moving: bool,
}

impl SectionPlaneHelper {
    /// Erstellt einen Helper im freien Modus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Übernimmt die (gemergten) Modell-Bounds.
    pub fn set_model_bounds(&mut self, bounds: Aabb) {
        self.model_bounds = Some(bounds);
    }

    /// Aktive Achse.
    pub fn axis(&self) -> SectionAxis {
        self.axis
    }

    /// Wechselt die aktive Achse.
    pub fn set_axis(&mut self, axis: SectionAxis) {
        self.axis = axis;
    }

    /// `true` im freien Modus.
    pub fn is_free(&self) -> bool {
        self.axis == SectionAxis::Free
    }

    /// `true`, während die Ebene gezogen wird.
    pub fn is_moving(&self) -> bool {
        self.moving
    }

    /// Markiert den Beginn einer Zieh-Interaktion.
    pub fn set_moving(&mut self, moving: bool) {
        self.moving = moving;
    }

    /// Zuletzt gemerkte freie Normale.
    pub fn last_normal(&self) -> Option<Vec3> {
        self.last_normal
    }

    /// Betrag der Modell-Bounds-Komponente einer Achse (0 ohne Bounds).
    fn extent(&self, index: usize) -> f32 {
        self.model_bounds
            .map(|b| b.min[index].abs())
            .unwrap_or(0.0)
    }

    /// Klemmt `value` auf `[-|bounds[axis]|, +|bounds[axis]|]`.
    ///
    /// Fehlt der Wert oder ist er 0, wird die obere Grenze geliefert.
    pub fn default_coordinate(&self, value: Option<f32>, index: usize) -> f32 {
        let max = self.extent(index);
        match value {
            None => max,
            Some(v) if v == 0.0 || v.is_nan() => max,
            Some(v) => v.clamp(-max, max),
        }
    }

    /// Nullt im achsparallelen Modus alle Komponenten außer der aktiven.
    pub fn coordinates_section_plane(&self, coordinates: Vec3) -> Vec3 {
        match self.axis.index() {
            Some(index) => {
                let mut result = Vec3::ZERO;
                result[index] = coordinates[index];
                result
            }
            None => coordinates,
        }
    }

    /// Normale passend zum Modus.
    ///
    /// Achsparallel: Einheitsvektor der Achse. Frei: die gemerkte Normale,
    /// sonst die gepickte.
    pub fn normal_section_plane(&self, normal: Vec3) -> Vec3 {
        match self.axis.unit() {
            Some(unit) => unit,
            None => self.last_normal.unwrap_or(normal),
        }
    }

    /// Merkt sich die erste freie Normale bis zum nächsten `disable`.
    pub fn save_last_normal(&mut self, normal: Vec3) {
        if self.is_free() && self.last_normal.is_none() {
            self.last_normal = Some(normal);
        }
    }

    /// Referenzachse für die In-Ebenen-Basis (nie fast parallel zur Normalen).
    pub fn ref_section_plane(&self, normal: Vec3) -> Vec3 {
        match self.axis {
            SectionAxis::X | SectionAxis::Y => Vec3::Z,
            SectionAxis::Z => Vec3::X,
            SectionAxis::Free => {
                if normal.dot(Vec3::Z).abs() < REF_PARALLEL_LIMIT {
                    Vec3::Z
                } else {
                    Vec3::X
                }
            }
        }
    }

    /// Größe des Widget-Quads.
    ///
    /// Im freien Modus wählt die betragsgrößte Komponente der Normalen die
    /// Achse, unabhängig vom Vorzeichen. Nur eine Null-Normale fällt auf
    /// die feste Größe zurück.
    pub fn scale_section_plane(&self, normal: Vec3) -> SectionScale {
        let (lx, ly, lz) = (self.extent(0), self.extent(1), self.extent(2));
        let grow = |s: f32| s + s * AXIS_SCALE_MARGIN;

        match self.axis {
            SectionAxis::X => SectionScale { u: grow(ly), v: grow(lz) },
            SectionAxis::Y => SectionScale { u: grow(lx), v: grow(lz) },
            SectionAxis::Z => SectionScale { u: grow(ly), v: grow(lx) },
            SectionAxis::Free => match dominant_axis(normal) {
                Some(0) => SectionScale {
                    u: ly * FREE_SCALE_FACTOR,
                    v: lz * FREE_SCALE_FACTOR,
                },
                Some(1) => SectionScale {
                    u: lx * FREE_SCALE_FACTOR,
                    v: lz * FREE_SCALE_FACTOR,
                },
                Some(_) => SectionScale {
                    u: ly * FREE_SCALE_FACTOR,
                    v: lx * FREE_SCALE_FACTOR,
                },
                None => SectionScale {
                    u: FALLBACK_SCALE,
                    v: FALLBACK_SCALE,
                },
            },
        }
    }

    /// Zentriert das Quad neu, sodass es entlang der dominanten Achse der
    /// Normalen auf `offset` liegt (unter Beachtung des Vorzeichens).
    pub fn create_center(&self, widget: &SectionPlaneWidget, normal: Vec3, offset: f32) -> Vec3 {
        let mut center = (widget.corners[0] + widget.corners[3]) * 0.5;
        if let Some(index) = dominant_axis(normal) {
            let sign = if normal[index] > 0.0 { 1.0 } else { -1.0 };
            center[index] = offset * sign;
        }
        center
    }

    /// Setzt den Interaktionszustand zurück und vergisst die freie Normale.
    pub fn disable(&mut self) {
        self.moving = false;
        self.last_normal = None;
    }
}

/// Index der betragsmäßig größten Komponente (`None` bei Null-/NaN-Vektor).
pub fn dominant_axis(v: Vec3) -> Option<usize> {
    let abs = v.abs();
    let max = abs.max_element();
    if max.is_nan() || max <= 0.0 {
        return None;
    }
    (0..3).find(|&i| abs[i] == max)
}

/// Sichtbares Quad der Schnittebene.
///
/// Einmal pro Interaktion berechnet und per Referenz geteilt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionPlaneWidget {
    /// Ecken A (+U+V), B (+U−V), C (−U+V), D (−U−V)
    pub corners: [Vec3; 4],
    /// Normale, mit der das Quad berechnet wurde
    pub normal: Vec3,
    /// Mittelpunkt
    pub center: Vec3,
}

impl SectionPlaneWidget {
    /// Berechnet die vier Ecken um `center` in der Ebene mit Normale `normal`.
    pub fn position(helper: &SectionPlaneHelper, normal: Vec3, center: Vec3) -> Self {
        let scale = helper.scale_section_plane(normal);
        let reference = helper.ref_section_plane(normal);
        let u_dir = normal.cross(reference);
        let v_dir = normal.cross(u_dir);
        let u = u_dir * scale.u;
        let v = v_dir * scale.v;

        Self {
            corners: [
                center + u + v,
                center + u - v,
                center - u + v,
                center - u - v,
            ],
            normal,
            center,
        }
    }

    /// Geschlossener Umriss A → B → D → C → A.
    pub fn polyline(&self) -> [Vec3; 5] {
        let [a, b, c, d] = self.corners;
        [a, b, d, c, a]
    }
}

/// Quad in der Ebene `plane`, das die Modell-Bounds vollständig abdeckt.
///
/// Wird zum Füllen der Schnittfläche (Stencil-Maske) gezeichnet.
pub fn cap_quad(bounds: &Aabb, plane: Vec4) -> [Vec3; 4] {
    let normal = plane.truncate().try_normalize().unwrap_or(Vec3::Z);
    let center = bounds.center();
    let on_plane = center - normal * (normal.dot(center) - plane.w);
    let reference = if normal.dot(Vec3::Z).abs() < REF_PARALLEL_LIMIT {
        Vec3::Z
    } else {
        Vec3::X
    };
    let radius = bounds.diagonal().max(1.0);
    let u = normal.cross(reference).normalize_or_zero() * radius;
    let v = normal.cross(u).normalize_or_zero() * radius;
    [
        on_plane + u + v,
        on_plane + u - v,
        on_plane - u + v,
        on_plane - u - v,
    ]
}
