//! Perspektivische 3D-Kamera mit Frame-Lock und View-Fit.

use super::Aabb;
use glam::{Mat4, Vec3};

/// Gecachte Matrizen einer Kamera-Pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMatrices {
    /// View-Matrix (Welt → Auge)
    pub view: Mat4,
    /// Inverse View-Matrix
    pub view_inverse: Mat4,
    /// Projektions-Matrix (GL-Konvention, NDC-z in [-1, 1])
    pub projection: Mat4,
    /// Inverse Projektions-Matrix
    pub projection_inverse: Mat4,
    /// `projection * view`
    pub view_projection: Mat4,
}

/// Perspektivische Kamera.
///
/// Solange die Kamera gesperrt ist, bleiben die Matrizen eingefroren.
/// Pose-Änderungen werden übernommen, die Matrizen aber erst beim
/// Entsperren neu berechnet.
#[derive(Debug, Clone)]
pub struct Camera3D {
    eye: Vec3,
    target: Vec3,
    up: Vec3,
    fov_y: f32,
    near: f32,
    far: f32,
    width: f32,
    height: f32,
    locked: bool,
    stale: bool,
    matrices: CameraMatrices,
}

impl Camera3D {
    /// Standard-Öffnungswinkel (vertikal, Radiant).
    pub const DEFAULT_FOV_Y: f32 = std::f32::consts::FRAC_PI_4;
    /// Standard-Near-Plane.
    pub const DEFAULT_NEAR: f32 = 0.1;
    /// Standard-Far-Plane.
    pub const DEFAULT_FAR: f32 = 100_000.0;

    /// Erstellt eine Kamera für die gegebene Viewport-Größe.
    pub fn new(width: f32, height: f32) -> Self {
        let mut camera = Self {
            eye: Vec3::new(0.0, 1.0, 0.0),
            target: Vec3::ZERO,
            up: Vec3::Z,
            fov_y: Self::DEFAULT_FOV_Y,
            near: Self::DEFAULT_NEAR,
            far: Self::DEFAULT_FAR,
            width: width.max(1.0),
            height: height.max(1.0),
            locked: false,
            stale: true,
            matrices: CameraMatrices {
                view: Mat4::IDENTITY,
                view_inverse: Mat4::IDENTITY,
                projection: Mat4::IDENTITY,
                projection_inverse: Mat4::IDENTITY,
                view_projection: Mat4::IDENTITY,
            },
        };
        camera.refresh();
        camera
    }

    /// Augenposition.
    pub fn eye(&self) -> Vec3 {
        self.eye
    }

    /// Zielpunkt.
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Viewport-Breite in Pixeln.
    pub fn width(&self) -> f32 {
        self.width
    }

    /// Viewport-Höhe in Pixeln.
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Seitenverhältnis Breite / Höhe.
    pub fn aspect(&self) -> f32 {
        self.width / self.height
    }

    /// Setzt Auge, Ziel und Up-Vektor.
    pub fn set_pose(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        self.eye = eye;
        self.target = target;
        self.up = up;
        self.refresh();
    }

    /// Setzt die Viewport-Größe.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.width = width.max(1.0);
        self.height = height.max(1.0);
        self.refresh();
    }

    /// Setzt Near- und Far-Plane.
    pub fn set_clip_range(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far.max(near * 2.0);
        self.refresh();
    }

    /// Friert die Matrizen für die Dauer eines Frames ein.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Gibt die Matrizen wieder frei und übernimmt aufgelaufene Änderungen.
    pub fn unlock(&mut self) {
        self.locked = false;
        if self.stale {
            self.refresh();
        }
    }

    /// `true`, solange die Kamera gesperrt ist.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Aktuell gültige Matrizen.
    pub fn matrices(&self) -> &CameraMatrices {
        &self.matrices
    }

    /// Richtet die Kamera so aus, dass die Box vollständig sichtbar ist.
    ///
    /// Die Blickrichtung bleibt erhalten, nur Abstand und Ziel ändern sich.
    pub fn view_fit(&mut self, aabb: &Aabb) {
        let center = aabb.center();
        let radius = (aabb.diagonal() * 0.5).max(f32::EPSILON);
        let direction = (self.target - self.eye).try_normalize().unwrap_or(Vec3::NEG_Y);
        let half_fov_y = self.fov_y * 0.5;
        let half_fov_x = (half_fov_y.tan() * self.aspect()).atan();
        let half_fov = half_fov_y.min(half_fov_x).max(0.01);
        let distance = radius / half_fov.sin();

        self.eye = center - direction * distance;
        self.target = center;
        self.near = (distance - radius).max(radius * 1e-3);
        self.far = distance + radius * 2.0;
        log::debug!(
            "Kamera View-Fit: center={:?}, distance={:.2}",
            center,
            distance
        );
        self.refresh();
    }

    /// Passt Near/Far an die Modell-Ausdehnung an.
    pub fn set_model_bounds(&mut self, bounds: &Aabb) {
        if bounds.is_empty() {
            return;
        }
        let diagonal = bounds.diagonal().max(1.0);
        self.far = diagonal * 4.0;
        self.near = self.far * 1e-5;
        self.refresh();
    }

    /// Setzt die Pose auf den Ursprung zurück (Blick entlang -Y, Z oben).
    pub fn reset_to_origin(&mut self) {
        self.set_pose(Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO, Vec3::Z);
    }

    fn refresh(&mut self) {
        if self.locked {
            self.stale = true;
            return;
        }
        let view = Mat4::look_at_rh(self.eye, self.target, self.up);
        let projection = Mat4::perspective_rh_gl(self.fov_y, self.aspect(), self.near, self.far);
        self.matrices = CameraMatrices {
            view,
            view_inverse: view.inverse(),
            projection,
            projection_inverse: projection.inverse(),
            view_projection: projection * view,
        };
        self.stale = false;
    }
}

impl Default for Camera3D {
    fn default() -> Self {
        Self::new(800.0, 600.0)
    }
}
