//! Ablauf beim Laden einer Revision.
//!
//! Bounding-Boxen → Dichte-Schwelle → Revision → gebündelte Bounds- und
//! Reuse-Abfrage → Default-Layer (parallel, bis zum Ende abgewartet) →
//! Tiling-Layer → `loading_done`.

use super::executor::{Executor, LoadJob};
use super::service::{
    DensityAtThreshold, GeometryService, RevisionInfo, ServiceBounds, ServiceRequest,
};
use crate::core::{Aabb, ObjectId, ViewObject};
use crate::render::{BufferId, GeometryBuffer, GpuContext, LayerId, RenderLayer};
use crate::shared::options::{LoaderOptions, ViewerOptions, EXCLUDED_TYPES};
use crate::viewer::Viewer;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::HashSet;

/// Ergebnis eines Lade-Jobs: neue Objekte und ihre Buffer.
pub struct LoadedBatch {
    /// Neue ViewObjects (Pick-IDs vergibt der Viewer)
    pub objects: Vec<ViewObject>,
    /// Fertige Buffer für den Layer
    pub buffers: Vec<Box<dyn GeometryBuffer + Send>>,
    /// Anzahl geladener Primitive (für den Fortschritt)
    pub primitives: u64,
}

impl std::fmt::Debug for LoadedBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedBatch")
            .field("objects", &self.objects.len())
            .field("buffers", &self.buffers.len())
            .field("primitives", &self.primitives)
            .finish()
    }
}

/// Typ-Filter einer Layer-Abfrage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeFilter {
    pub name: String,
    pub include_all_sub_types: bool,
    pub exclude: Vec<String>,
}

/// Kachel-Filter einer Layer-Abfrage (`-1` = keine Grenze).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TileFilter {
    pub ids: Vec<u32>,
    pub density_lower_threshold: f64,
    pub density_upper_threshold: f64,
    pub reuse_lower_threshold: i64,
    pub geometry_data_to_reuse: Vec<i64>,
    pub max_depth: u32,
}

/// Abfrage, mit der ein Layer seine Geometrie anfordert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerQuery {
    pub roids: Vec<i64>,
    #[serde(rename = "type")]
    pub type_filter: TypeFilter,
    pub tiles: TileFilter,
    /// Direkt übertragene Felder der GeometryData
    pub fields_direct: Vec<String>,
    pub loader_settings: LoaderOptions,
}

impl LayerQuery {
    /// Felder, die übertragen werden: Indizes, Normalen, Vertices und
    /// quantisierte Farben, sofern keine Objektfarben verwendet werden.
    pub fn fields_to_include(loader: &LoaderOptions) -> Vec<String> {
        let mut fields = vec!["indices"];
        fields.push(if loader.quantize_normals {
            "normalsQuantized"
        } else {
            "normals"
        });
        fields.push(if loader.quantize_vertices {
            "verticesQuantized"
        } else {
            "vertices"
        });
        if !loader.use_object_colors {
            fields.push("colorsQuantized");
        }
        fields.into_iter().map(String::from).collect()
    }

    fn products(roid: i64, tiles: TileFilter, loader: &LoaderOptions) -> Self {
        Self {
            roids: vec![roid],
            type_filter: TypeFilter {
                name: "IfcProduct".to_string(),
                include_all_sub_types: true,
                exclude: excluded_types(),
            },
            tiles,
            fields_direct: Self::fields_to_include(loader),
            loader_settings: loader.clone(),
        }
    }

    /// Alles oberhalb der Dichte-Schwelle in einer Kachel.
    pub fn default_layer(roid: i64, density: f64, loader: &LoaderOptions) -> Self {
        Self::products(
            roid,
            TileFilter {
                ids: vec![0],
                density_lower_threshold: density,
                density_upper_threshold: -1.0,
                reuse_lower_threshold: -1,
                geometry_data_to_reuse: Vec::new(),
                max_depth: 0,
            },
            loader,
        )
    }

    /// Der Rest, gekachelt und mit Wiederverwendung.
    pub fn tiling_layer(
        roid: i64,
        density: f64,
        reuse: &HashSet<i64>,
        loader: &LoaderOptions,
    ) -> Self {
        let mut geometry_data_to_reuse: Vec<i64> = reuse.iter().copied().collect();
        geometry_data_to_reuse.sort_unstable();
        Self::products(
            roid,
            TileFilter {
                ids: Vec::new(),
                density_lower_threshold: -1.0,
                density_upper_threshold: density,
                reuse_lower_threshold: 0,
                geometry_data_to_reuse,
                max_depth: 0,
            },
            loader,
        )
    }
}

fn excluded_types() -> Vec<String> {
    EXCLUDED_TYPES.iter().map(|t| t.to_string()).collect()
}

/// Liefert die Layer und ihre Lade-Jobs.
///
/// Geometrie-Dekodierung und LOD-Streaming liegen hier, nicht im Viewer.
pub trait LayerSource<G: GpuContext> {
    /// Layer für alles unterhalb der Dichte-Schwelle.
    fn create_default_layer(&mut self, reuse: &HashSet<i64>) -> Box<dyn RenderLayer<G>>;

    /// Jobs, die den Default-Layer befüllen.
    fn default_layer_jobs(&mut self, query: &LayerQuery) -> Result<Vec<LoadJob<LoadedBatch>>>;

    /// Gekachelter LOD-Layer für den Rest.
    fn create_tiling_layer(
        &mut self,
        reuse: &HashSet<i64>,
        bounds: &Aabb,
    ) -> Box<dyn RenderLayer<G>>;

    /// Jobs, die den Tiling-Layer befüllen.
    fn tiling_layer_jobs(&mut self, query: &LayerQuery) -> Result<Vec<LoadJob<LoadedBatch>>>;
}

/// Zusammenfassung eines abgeschlossenen Ladevorgangs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSummary {
    pub revision: i64,
    pub triangles_below: u64,
    pub triangles_above: u64,
    pub default_layer: Option<LayerId>,
    pub tiling_layer: Option<LayerId>,
    pub loaded_primitives: u64,
}

type ProgressListener = Box<dyn FnMut(f64)>;
type RegionSelector = Box<dyn FnMut(&[ServiceBounds]) -> usize>;

/// Lädt Revisionen vom Dienst in einen Viewer.
pub struct LoadOrchestrator<S: GeometryService> {
    service: S,
    options: ViewerOptions,
    revision_id: Option<i64>,
    density_threshold: f64,
    reuse: HashSet<i64>,
    progress_listener: Option<ProgressListener>,
    region_selector: Option<RegionSelector>,
}

impl<S: GeometryService> LoadOrchestrator<S> {
    /// Neuer Orchestrator über einem Dienst.
    pub fn new(service: S, options: ViewerOptions) -> Self {
        Self {
            service,
            options,
            revision_id: None,
            density_threshold: 0.0,
            reuse: HashSet::new(),
            progress_listener: None,
            region_selector: None,
        }
    }

    /// Der Dienst.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Zuletzt geladene Revision.
    pub fn revision_id(&self) -> Option<i64> {
        self.revision_id
    }

    /// Dichte-Schwelle zwischen Default- und Tiling-Layer.
    pub fn density_threshold(&self) -> f64 {
        self.density_threshold
    }

    /// Geometrie-IDs, die wiederverwendet werden.
    pub fn reused_geometry(&self) -> &HashSet<i64> {
        &self.reuse
    }

    /// Fortschritt in Prozent der Primitive des Default-Layers.
    pub fn set_progress_listener(&mut self, listener: impl FnMut(f64) + 'static) {
        self.progress_listener = Some(Box::new(listener));
    }

    /// Auswahl einer Region, falls der Dienst mehrere Bounding-Boxen liefert.
    pub fn set_region_selector(&mut self, selector: impl FnMut(&[ServiceBounds]) -> usize + 'static) {
        self.region_selector = Some(Box::new(selector));
    }

    /// Lädt die Revision `roid` in den Viewer.
    pub fn load_revision<G, L>(
        &mut self,
        viewer: &mut Viewer<G>,
        layers: &mut L,
        roid: i64,
    ) -> Result<LoadSummary>
    where
        G: GpuContext,
        L: LayerSource<G>,
    {
        log::info!("Lade Revision {}", roid);

        let boxes: Vec<ServiceBounds> = self
            .service
            .call(&ServiceRequest::ListBoundingBoxes { roids: vec![roid] })?
            .parse()
            .context("listBoundingBoxes")?;
        if boxes.len() > 1 {
            let index = match &mut self.region_selector {
                Some(select) => select(&boxes),
                None => 0,
            };
            log::info!("{} Regionen, gewählt: {}", boxes.len(), index);
        }

        let density: DensityAtThreshold = self
            .service
            .call(&ServiceRequest::GetDensityThreshold {
                roid,
                nr_triangles: self.options.triangle_threshold_default_layer,
                excluded_types: excluded_types(),
            })?
            .parse()
            .context("getDensityThreshold")?;
        self.density_threshold = density.density;
        log::info!(
            "Dreiecke unter/über Schwelle: {}/{}",
            density.triangles_below,
            density.triangles_above
        );

        let revision: RevisionInfo = self
            .service
            .call(&ServiceRequest::GetRevision { roid })?
            .parse()
            .context("getRevision")?;
        self.revision_id = Some(revision.oid);

        let bounds = self.query_bounds(&revision, &density)?;
        viewer.set_model_bounds(bounds);

        let mut summary = LoadSummary {
            revision: revision.oid,
            triangles_below: density.triangles_below,
            triangles_above: density.triangles_above,
            ..LoadSummary::default()
        };

        if self.options.default_layer_enabled && density.triangles_below > 0 {
            let layer = viewer.add_layer(layers.create_default_layer(&self.reuse));
            let query =
                LayerQuery::default_layer(revision.oid, self.density_threshold, &self.options.loader);
            let jobs = layers.default_layer_jobs(&query)?;
            summary.loaded_primitives +=
                self.run_jobs(viewer, layer, jobs, Some(density.triangles_below))?;
            summary.default_layer = Some(layer);
            log::info!("Default-Layer geladen");
        }
        viewer.mark_dirty(crate::render::DirtyLevel::Hard);

        if self.options.tiling_layer_enabled && density.triangles_above > 0 {
            let layer = viewer.add_layer(layers.create_tiling_layer(&self.reuse, &bounds));
            let query = LayerQuery::tiling_layer(
                revision.oid,
                self.density_threshold,
                &self.reuse,
                &self.options.loader,
            );
            let jobs = layers.tiling_layer_jobs(&query)?;
            summary.loaded_primitives += self.run_jobs(viewer, layer, jobs, None)?;
            summary.tiling_layer = Some(layer);
            log::info!("Tiling-Layer geladen");
        }

        viewer.loading_done();
        Ok(summary)
    }

    /// Gebündelte Abfrage von Gesamt-Bounds, Reuse-IDs und Bounds pro
    /// konkreter Revision. Liefert die transformierten Gesamt-Bounds.
    fn query_bounds(&mut self, revision: &RevisionInfo, density: &DensityAtThreshold) -> Result<Aabb> {
        let total = density.triangles_below + density.triangles_above;
        let estimated = self.options.triangles_to_bytes(total);
        let over_budget = estimated.saturating_sub(self.options.assume_gpu_memory_available);
        let triangles_to_save = self.options.bytes_to_triangles(over_budget);
        log::debug!(
            "Geschätzt {} Bytes ohne Reuse, {} Dreiecke einzusparen",
            estimated,
            triangles_to_save
        );

        let roids = vec![revision.oid];
        let mut requests = vec![
            ServiceRequest::GetTotalBounds { roids: roids.clone() },
            ServiceRequest::GetTotalUntransformedBounds { roids: roids.clone() },
            ServiceRequest::GetGeometryDataToReuse {
                roids,
                excluded_types: excluded_types(),
                triangles_to_save,
            },
        ];
        requests.extend(
            revision
                .concrete_revisions
                .iter()
                .map(|&croid| ServiceRequest::GetModelBoundsUntransformedForConcreteRevision { croid }),
        );
        requests.extend(
            revision
                .concrete_revisions
                .iter()
                .map(|&croid| ServiceRequest::GetModelBoundsForConcreteRevision { croid }),
        );

        let expected = requests.len();
        let mut responses = self.service.multi_call(&requests)?.into_iter();
        if responses.len() != expected {
            bail!(
                "multiCall lieferte {} statt {} Antworten",
                responses.len(),
                expected
            );
        }

        let mut next = || responses.next().context("Antwort fehlt");
        let total_bounds: ServiceBounds = next()?.parse().context("getTotalBounds")?;
        let _untransformed: ServiceBounds =
            next()?.parse().context("getTotalUntransformedBounds")?;
        let reuse: Vec<i64> = next()?.parse().context("getGeometryDataToReuse")?;
        for croid in &revision.concrete_revisions {
            let bounds: ServiceBounds = next()?
                .parse()
                .with_context(|| format!("Bounds (untransformiert) für {}", croid))?;
            log::debug!("Revision {} untransformiert: {:?}", croid, bounds.to_aabb().to_array());
        }
        for croid in &revision.concrete_revisions {
            let bounds: ServiceBounds = next()?
                .parse()
                .with_context(|| format!("Bounds für {}", croid))?;
            log::debug!("Revision {}: {:?}", croid, bounds.to_aabb().to_array());
        }

        self.reuse = reuse.into_iter().collect();
        log::info!("{} Geometrien werden wiederverwendet", self.reuse.len());
        Ok(total_bounds.to_aabb())
    }

    /// Führt die Jobs eines Layers aus und wendet die Ergebnisse an.
    ///
    /// Mit `progress_total` wird der Fortschritt gemeldet.
    fn run_jobs<G: GpuContext>(
        &mut self,
        viewer: &mut Viewer<G>,
        layer: LayerId,
        jobs: Vec<LoadJob<LoadedBatch>>,
        progress_total: Option<u64>,
    ) -> Result<u64> {
        let mut executor = Executor::new(self.options.executor_parallelism);
        for job in jobs {
            executor.add(job);
        }

        let mut loaded = 0u64;
        let listener = &mut self.progress_listener;
        executor.await_termination(|batch| {
            for object in batch.objects {
                viewer.add_view_object(object);
            }
            for buffer in batch.buffers {
                let buffer: Box<dyn GeometryBuffer> = buffer;
                viewer.register_buffer(layer, buffer);
            }
            loaded += batch.primitives;
            if let (Some(total), Some(listener)) = (progress_total, listener.as_mut()) {
                listener(100.0 * loaded as f64 / total as f64);
            }
            Ok(())
        })?;
        Ok(loaded)
    }

    /// Buffer, die das Element mit der GlobalId `guid` enthalten.
    pub fn find_element<G: GpuContext>(&self, viewer: &Viewer<G>, guid: &str) -> Result<Vec<BufferId>> {
        let Some(roid) = self.revision_id else {
            bail!("Keine Revision geladen");
        };
        let oid: i64 = self
            .service
            .call(&ServiceRequest::GetOidByGuid {
                roid,
                guid: guid.to_string(),
            })?
            .parse()
            .context("getOidByGuid")?;

        let owners = viewer
            .owners_of(&ObjectId::Numeric(oid))
            .map(<[BufferId]>::to_vec)
            .unwrap_or_default();
        if owners.is_empty() {
            log::warn!("Element {} (OID {}) in keinem Buffer", guid, oid);
        }
        Ok(owners)
    }
}

impl<S: GeometryService> std::fmt::Debug for LoadOrchestrator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadOrchestrator")
            .field("revision_id", &self.revision_id)
            .field("density_threshold", &self.density_threshold)
            .field("reuse", &self.reuse.len())
            .finish()
    }
}
