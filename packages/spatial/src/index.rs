//! R-tree over polygons in a single CRS.

use geo::{BoundingRect, Intersects, MultiPolygon, Rect};
use launch_risk_models::Crs;
use rstar::{AABB, RTree, RTreeObject};

use crate::compute_envelope;

/// A polygon stored in the R-tree with the position it came from.
struct IndexedGeometry {
    id: usize,
    envelope: AABB<[f64; 2]>,
    geometry: MultiPolygon<f64>,
}

impl RTreeObject for IndexedGeometry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Bulk-loaded R-tree of polygons, all in [`Self::crs`].
///
/// Ids are caller-assigned (typically positions in the source collection),
/// so query results can be joined back to per-geometry metadata.
pub struct GeometryIndex {
    crs: Crs,
    tree: RTree<IndexedGeometry>,
}

impl std::fmt::Debug for GeometryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeometryIndex")
            .field("crs", &self.crs)
            .field("len", &self.len())
            .finish()
    }
}

impl GeometryIndex {
    /// Builds the index. Empty geometries are skipped.
    #[must_use]
    pub fn build(crs: Crs, geometries: impl IntoIterator<Item = (usize, MultiPolygon<f64>)>) -> Self {
        let entries: Vec<IndexedGeometry> = geometries
            .into_iter()
            .filter(|(_, geometry)| !geometry.0.is_empty())
            .map(|(id, geometry)| IndexedGeometry {
                id,
                envelope: compute_envelope(&geometry),
                geometry,
            })
            .collect();

        log::debug!("Built {crs} index with {} geometries", entries.len());

        Self {
            crs,
            tree: RTree::bulk_load(entries),
        }
    }

    /// CRS every indexed geometry is expressed in.
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    /// Number of indexed geometries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no geometries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Geometries whose bounding box intersects `rect`, ordered by id.
    #[must_use]
    pub fn in_envelope(&self, rect: Rect<f64>) -> Vec<(usize, &MultiPolygon<f64>)> {
        let query = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        let mut hits: Vec<_> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|entry| (entry.id, &entry.geometry))
            .collect();
        hits.sort_unstable_by_key(|(id, _)| *id);
        hits
    }

    /// Geometries that actually intersect `shape`, ordered by id.
    ///
    /// The R-tree narrows by bounding box first; survivors are then tested
    /// exactly against `shape`.
    #[must_use]
    pub fn intersecting(&self, shape: &MultiPolygon<f64>) -> Vec<(usize, &MultiPolygon<f64>)> {
        let Some(rect) = shape.bounding_rect() else {
            return vec![];
        };
        self.in_envelope(rect)
            .into_iter()
            .filter(|(_, geometry)| geometry.intersects(shape))
            .collect()
    }
}
