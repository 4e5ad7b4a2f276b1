//! Land-use polygon extraction.
//!
//! The land-use source is either an OSM PBF extract, from which closed
//! ways and `type=multipolygon` relations are assembled into polygons, or a
//! `GeoJSON` feature collection whose properties are OSM tags.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use geo::{Contains as _, Coord, LineString, MultiPolygon, Polygon};
use geojson::{FeatureCollection, GeoJson};
use launch_risk_spatial::geometry_to_multipolygon;

use crate::{HazardError, TaggedPolygon};

/// Land-use source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandUseFormat {
    /// OSM protobuf extract.
    OsmPbf,
    /// `GeoJSON` feature collection.
    GeoJson,
}

impl LandUseFormat {
    /// Infers the format from a URL or file name.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
        if path.ends_with(".geojson") || path.ends_with(".json") {
            Self::GeoJson
        } else {
            Self::OsmPbf
        }
    }

    /// File name used inside the data directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::OsmPbf => "land_use.osm.pbf",
            Self::GeoJson => "land_use.geojson",
        }
    }
}

/// An OSM way carrying at least one deny-list key.
#[derive(Debug, Clone)]
pub struct OsmWay {
    /// Node ids in order.
    pub refs: Vec<i64>,
    /// Tags restricted to deny-list keys.
    pub tags: BTreeMap<String, String>,
}

/// A `type=multipolygon` relation carrying at least one deny-list key.
#[derive(Debug, Clone)]
pub struct OsmRelation {
    /// Member way ids with role `outer` (or no role).
    pub outer: Vec<i64>,
    /// Member way ids with role `inner`.
    pub inner: Vec<i64>,
    /// Tags restricted to deny-list keys.
    pub tags: BTreeMap<String, String>,
}

/// Reads land-use polygons in whichever format `path` holds.
///
/// # Errors
///
/// Returns [`HazardError`] if the file cannot be read or parsed.
pub fn read_land_use(
    path: &Path,
    format: LandUseFormat,
    keys: &BTreeSet<&str>,
) -> Result<Vec<TaggedPolygon>, HazardError> {
    match format {
        LandUseFormat::OsmPbf => read_pbf(path, keys),
        LandUseFormat::GeoJson => read_geojson(path),
    }
}

/// Extracts closed ways and multipolygon relations tagged with any of
/// `keys` from an OSM PBF file.
///
/// Relations are collected in a first pass so that their member ways can be
/// pulled in alongside the tagged ways in the second.
///
/// # Errors
///
/// Returns [`HazardError::Osm`] if the PBF file cannot be read or parsed.
pub fn read_pbf(path: &Path, keys: &BTreeSet<&str>) -> Result<Vec<TaggedPolygon>, HazardError> {
    use osmpbf::{Element, ElementReader, IndexedReader, RelMemberType};

    let osm_error = |e: osmpbf::Error| HazardError::Osm {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    log::info!("Parsing OSM PBF: {}", path.display());

    let mut relations = Vec::new();
    ElementReader::from_path(path)
        .map_err(osm_error)?
        .for_each(|element| {
            let Element::Relation(rel) = element else {
                return;
            };
            if !rel.tags().any(|(k, v)| k == "type" && v == "multipolygon") {
                return;
            }
            let tags: BTreeMap<String, String> = rel
                .tags()
                .filter(|(k, _)| keys.contains(k))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            if tags.is_empty() {
                return;
            }

            let mut relation = OsmRelation {
                outer: Vec::new(),
                inner: Vec::new(),
                tags,
            };
            for member in rel.members() {
                if !matches!(member.member_type, RelMemberType::Way) {
                    continue;
                }
                match member.role() {
                    Ok("inner") => relation.inner.push(member.member_id),
                    Ok("outer" | "") => relation.outer.push(member.member_id),
                    _ => {}
                }
            }
            relations.push(relation);
        })
        .map_err(osm_error)?;

    let members: HashSet<i64> = relations
        .iter()
        .flat_map(|r| r.outer.iter().chain(&r.inner).copied())
        .collect();

    let mut reader = IndexedReader::from_path(path).map_err(osm_error)?;
    let mut ways = Vec::new();
    let mut member_refs: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut nodes: HashMap<i64, Coord<f64>> = HashMap::new();

    reader
        .read_ways_and_deps(
            |way| members.contains(&way.id()) || way.tags().any(|(k, _)| keys.contains(k)),
            |element| match element {
                Element::Way(way) => {
                    if members.contains(&way.id()) {
                        member_refs.insert(way.id(), way.refs().collect());
                    }
                    let tags: BTreeMap<String, String> = way
                        .tags()
                        .filter(|(k, _)| keys.contains(k))
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    if !tags.is_empty() {
                        ways.push(OsmWay {
                            refs: way.refs().collect(),
                            tags,
                        });
                    }
                }
                Element::Node(node) => {
                    nodes.insert(node.id(), Coord { x: node.lon(), y: node.lat() });
                }
                Element::DenseNode(node) => {
                    nodes.insert(node.id(), Coord { x: node.lon(), y: node.lat() });
                }
                Element::Relation(_) => {}
            },
        )
        .map_err(osm_error)?;

    log::info!(
        "Read {} tagged ways, {} multipolygon relations and {} nodes from OSM PBF",
        ways.len(),
        relations.len(),
        nodes.len()
    );

    let mut polygons = assemble_ways(ways, &nodes);
    polygons.extend(assemble_relations(relations, &member_refs, &nodes));
    Ok(polygons)
}

/// Turns closed ways into polygons using resolved node positions.
///
/// Open ways, ways with fewer than four refs, and ways referencing nodes
/// missing from the extract are skipped.
#[must_use]
pub fn assemble_ways(ways: Vec<OsmWay>, nodes: &HashMap<i64, Coord<f64>>) -> Vec<TaggedPolygon> {
    let total = ways.len();
    let mut skipped_open = 0usize;
    let mut skipped_unresolved = 0usize;

    let polygons: Vec<TaggedPolygon> = ways
        .into_iter()
        .filter_map(|way| {
            let closed = way.refs.len() >= 4 && way.refs.first() == way.refs.last();
            if !closed {
                skipped_open += 1;
                return None;
            }
            let Some(coords) = way
                .refs
                .iter()
                .map(|id| nodes.get(id).copied())
                .collect::<Option<Vec<_>>>()
            else {
                skipped_unresolved += 1;
                return None;
            };
            Some(TaggedPolygon {
                tags: way.tags,
                geometry: MultiPolygon(vec![Polygon::new(LineString::new(coords), vec![])]),
            })
        })
        .collect();

    if skipped_open + skipped_unresolved > 0 {
        log::debug!(
            "Skipped {skipped_open} open and {skipped_unresolved} unresolved ways of {total}"
        );
    }

    polygons
}

/// Turns multipolygon relations into polygons.
///
/// Member ways are joined end to end into closed rings. Each inner ring
/// becomes a hole of the outer ring containing it. Relations with no closed
/// outer ring, or with member ways or nodes missing from the extract, are
/// skipped.
#[must_use]
pub fn assemble_relations(
    relations: Vec<OsmRelation>,
    way_refs: &HashMap<i64, Vec<i64>>,
    nodes: &HashMap<i64, Coord<f64>>,
) -> Vec<TaggedPolygon> {
    let total = relations.len();

    let polygons: Vec<TaggedPolygon> = relations
        .into_iter()
        .filter_map(|relation| {
            let outer = resolve_rings(&relation.outer, way_refs, nodes)?;
            let inner = resolve_rings(&relation.inner, way_refs, nodes)?;
            if outer.is_empty() {
                return None;
            }

            let mut holes: Vec<Vec<LineString<f64>>> = vec![Vec::new(); outer.len()];
            for ring in inner {
                let Some(first) = ring.0.first().copied() else {
                    continue;
                };
                if let Some(owner) = outer
                    .iter()
                    .position(|o| Polygon::new(o.clone(), vec![]).contains(&first))
                {
                    holes[owner].push(ring);
                }
            }

            let polygons = outer
                .into_iter()
                .zip(holes)
                .map(|(exterior, interiors)| Polygon::new(exterior, interiors))
                .collect();
            Some(TaggedPolygon {
                tags: relation.tags,
                geometry: MultiPolygon(polygons),
            })
        })
        .collect();

    if polygons.len() < total {
        log::debug!(
            "Skipped {} of {total} multipolygon relations with broken rings",
            total - polygons.len()
        );
    }

    polygons
}

/// Joins member ways into closed rings and resolves their coordinates.
///
/// Returns `None` if a member way or node is missing.
fn resolve_rings(
    way_ids: &[i64],
    way_refs: &HashMap<i64, Vec<i64>>,
    nodes: &HashMap<i64, Coord<f64>>,
) -> Option<Vec<LineString<f64>>> {
    let segments = way_ids
        .iter()
        .map(|id| way_refs.get(id).cloned())
        .collect::<Option<Vec<_>>>()?;

    join_rings(segments)
        .into_iter()
        .map(|ring| {
            ring.iter()
                .map(|id| nodes.get(id).copied())
                .collect::<Option<Vec<_>>>()
                .map(LineString::new)
        })
        .collect()
}

/// Joins node id sequences that share end nodes into closed rings.
///
/// Segments are reversed as needed. Chains that never close, or close with
/// fewer than four nodes, are dropped.
#[must_use]
pub fn join_rings(mut segments: Vec<Vec<i64>>) -> Vec<Vec<i64>> {
    let mut rings = Vec::new();

    while let Some(mut ring) = segments.pop() {
        while ring.len() > 1 && ring.first() != ring.last() {
            let Some(&end) = ring.last() else {
                break;
            };
            let Some(pos) = segments
                .iter()
                .position(|s| s.first() == Some(&end) || s.last() == Some(&end))
            else {
                break;
            };
            let mut next = segments.swap_remove(pos);
            if next.first() != Some(&end) {
                next.reverse();
            }
            ring.extend(next.into_iter().skip(1));
        }

        if ring.len() >= 4 && ring.first() == ring.last() {
            rings.push(ring);
        }
    }

    rings
}

/// Reads a `GeoJSON` feature collection, taking scalar properties as tags.
///
/// # Errors
///
/// Returns [`HazardError`] if the file cannot be read or is not a feature
/// collection.
pub fn read_geojson(path: &Path) -> Result<Vec<TaggedPolygon>, HazardError> {
    let collection = read_feature_collection(path)?;

    let polygons: Vec<TaggedPolygon> = collection
        .features
        .into_iter()
        .filter_map(|feature| {
            let tags = feature
                .properties
                .as_ref()
                .map(|props| {
                    props
                        .iter()
                        .filter_map(|(k, v)| property_text(v).map(|text| (k.clone(), text)))
                        .collect()
                })
                .unwrap_or_default();
            let geometry: geo::Geometry<f64> = feature.geometry?.try_into().ok()?;
            Some(TaggedPolygon {
                tags,
                geometry: geometry_to_multipolygon(geometry)?,
            })
        })
        .collect();

    log::info!("Read {} land-use polygons from {}", polygons.len(), path.display());
    Ok(polygons)
}

fn property_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Reads and parses a `GeoJSON` feature collection file.
///
/// # Errors
///
/// Returns [`HazardError::Io`] or [`HazardError::GeoJson`].
pub fn read_feature_collection(path: &Path) -> Result<FeatureCollection, HazardError> {
    let text = std::fs::read_to_string(path).map_err(|e| HazardError::io(path, e))?;
    let geojson_error = |e: geojson::Error| HazardError::GeoJson {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    let geojson: GeoJson = text.parse().map_err(geojson_error)?;
    FeatureCollection::try_from(geojson).map_err(geojson_error)
}
