//! Achsen-ausgerichtete Bounding-Boxen in Weltkoordinaten.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Achsen-ausgerichtete Bounding-Box (AABB).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimale Ecke
    pub min: Vec3,
    /// Maximale Ecke
    pub max: Vec3,
}

impl Aabb {
    /// Erstellt eine AABB aus zwei Ecken.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Leere AABB (neutrales Element für `union`).
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Erstellt eine AABB aus `[min_x, min_y, min_z, max_x, max_y, max_z]`.
    pub fn from_array(bounds: [f32; 6]) -> Self {
        Self {
            min: Vec3::new(bounds[0], bounds[1], bounds[2]),
            max: Vec3::new(bounds[3], bounds[4], bounds[5]),
        }
    }

    /// Gibt die Box als `[min_x, min_y, min_z, max_x, max_y, max_z]` zurück.
    pub fn to_array(&self) -> [f32; 6] {
        [
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z,
        ]
    }

    /// `true`, wenn die Box keinen Punkt enthält.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Vereinigung zweier Boxen.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Mittelpunkt der Box.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Länge der Raumdiagonale.
    pub fn diagonal(&self) -> f32 {
        (self.max - self.min).length()
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}
