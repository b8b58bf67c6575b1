//! Aufrufe des Geometrie-Dienstes.
//!
//! Das Transportprotokoll liegt beim Implementierer von `GeometryService`;
//! hier stehen nur Anfrage-Typen, der JSON-Umschlag und die Antwort-Typen.

use crate::core::Aabb;
use anyhow::{Context, Result};
use glam::Vec3;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Interface-Name im Aufruf-Umschlag.
pub const SERVICE_INTERFACE: &str = "ServiceInterface";

/// Eine Anfrage an den Geometrie-Dienst.
///
/// Serialisiert als `{"method": ..., "parameters": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "method",
    content = "parameters",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServiceRequest {
    /// Bounding-Boxen der Revisionen
    ListBoundingBoxes { roids: Vec<i64> },
    /// Dichte, bei der `nr_triangles` Dreiecke unterhalb liegen
    GetDensityThreshold {
        roid: i64,
        nr_triangles: u64,
        excluded_types: Vec<String>,
    },
    /// Revisions-Metadaten
    GetRevision { roid: i64 },
    /// Gesamt-Bounds (transformiert)
    GetTotalBounds { roids: Vec<i64> },
    /// Gesamt-Bounds (untransformiert)
    GetTotalUntransformedBounds { roids: Vec<i64> },
    /// Geometrie-IDs, die instanziert wiederverwendet werden
    GetGeometryDataToReuse {
        roids: Vec<i64>,
        excluded_types: Vec<String>,
        triangles_to_save: u64,
    },
    /// Bounds einer konkreten Revision (untransformiert)
    GetModelBoundsUntransformedForConcreteRevision { croid: i64 },
    /// Bounds einer konkreten Revision
    GetModelBoundsForConcreteRevision { croid: i64 },
    /// OID zu einer GlobalId
    GetOidByGuid { roid: i64, guid: String },
}

impl ServiceRequest {
    /// Vollständiger Aufruf-Umschlag inklusive Interface-Name.
    pub fn envelope(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self).context("Anfrage nicht serialisierbar")?;
        if let serde_json::Value::Object(map) = &mut value {
            map.insert(
                "interface".to_string(),
                serde_json::Value::from(SERVICE_INTERFACE),
            );
        }
        Ok(value)
    }
}

/// Rohe JSON-Antwort eines Aufrufs.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse(pub serde_json::Value);

impl ServiceResponse {
    /// Deserialisiert die Antwort in den erwarteten Typ.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T> {
        let type_name = std::any::type_name::<T>();
        serde_json::from_value(self.0)
            .with_context(|| format!("Antwort passt nicht zu {}", type_name))
    }
}

/// Geometrie-Dienst: ein Aufruf pro Anfrage, optional gebündelt.
pub trait GeometryService {
    /// Führt eine Anfrage aus.
    fn call(&self, request: &ServiceRequest) -> Result<ServiceResponse>;

    /// Führt mehrere Anfragen aus, Antworten in Anfrage-Reihenfolge.
    fn multi_call(&self, requests: &[ServiceRequest]) -> Result<Vec<ServiceResponse>> {
        requests.iter().map(|request| self.call(request)).collect()
    }
}

/// Punkt im Antwortformat des Dienstes.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ServiceVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl ServiceVector {
    fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }
}

/// Bounds im Antwortformat des Dienstes.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ServiceBounds {
    pub min: ServiceVector,
    pub max: ServiceVector,
}

impl ServiceBounds {
    /// Umrechnung in eine `Aabb`.
    pub fn to_aabb(&self) -> Aabb {
        Aabb::new(self.min.to_vec3(), self.max.to_vec3())
    }
}

/// Ergebnis von `getDensityThreshold`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DensityAtThreshold {
    pub density: f64,
    pub triangles_below: u64,
    pub triangles_above: u64,
}

/// Ergebnis von `getRevision`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub oid: i64,
    #[serde(default)]
    pub concrete_revisions: Vec<i64>,
}
