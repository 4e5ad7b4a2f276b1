//! Deny-list selection of hazardous land-use polygons.

use std::collections::{BTreeMap, BTreeSet};

use geo::MultiPolygon;
use launch_risk_models::{HazardSource, MatchedTag, MissingKeysPolicy, TagRule};

use crate::HazardGeometry;

/// A land-use polygon with its OSM tags.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedPolygon {
    /// OSM tags, key to value.
    pub tags: BTreeMap<String, String>,
    /// Polygon in WGS84.
    pub geometry: MultiPolygon<f64>,
}

/// Selects hazardous polygons by tag.
///
/// Only rules whose key occurs somewhere in the dataset take part. A
/// polygon is kept when any of those rules matches one of its tags. If no
/// rule key occurs at all, the [`MissingKeysPolicy`] decides.
#[derive(Debug, Clone)]
pub struct HazardFilter {
    rules: Vec<TagRule>,
    policy: MissingKeysPolicy,
}

impl HazardFilter {
    /// Creates a filter from deny-list rules.
    #[must_use]
    pub const fn new(rules: Vec<TagRule>, policy: MissingKeysPolicy) -> Self {
        Self { rules, policy }
    }

    /// Distinct keys used by the rules. Used to skip irrelevant OSM ways
    /// before their geometry is assembled.
    #[must_use]
    pub fn rule_keys(&self) -> BTreeSet<&str> {
        self.rules.iter().map(|r| r.key.as_str()).collect()
    }

    /// Rules whose key is present in the dataset.
    #[must_use]
    pub fn active_rules(&self, present_keys: &BTreeSet<&str>) -> Vec<&TagRule> {
        self.rules
            .iter()
            .filter(|r| present_keys.contains(r.key.as_str()))
            .collect()
    }

    /// First active rule matching the polygon's tags.
    fn first_match(rules: &[&TagRule], tags: &BTreeMap<String, String>) -> Option<MatchedTag> {
        rules.iter().find_map(|rule| {
            tags.get(&rule.key)
                .filter(|value| rule.matches(&rule.key, value))
                .map(|value| MatchedTag {
                    key: rule.key.clone(),
                    value: value.clone(),
                })
        })
    }

    /// Keeps the hazardous polygons.
    #[must_use]
    pub fn apply(&self, polygons: Vec<TaggedPolygon>) -> Vec<HazardGeometry> {
        let present: BTreeSet<&str> = polygons
            .iter()
            .flat_map(|p| p.tags.keys().map(String::as_str))
            .collect();
        let active = self.active_rules(&present);

        if active.is_empty() {
            return match self.policy {
                MissingKeysPolicy::AcceptAll => {
                    log::warn!(
                        "None of the deny-list keys occur in the land-use data; \
                         keeping all {} polygons unfiltered",
                        polygons.len()
                    );
                    polygons
                        .into_iter()
                        .map(|p| HazardGeometry {
                            source: HazardSource::LandUse,
                            tag: None,
                            geometry: p.geometry,
                        })
                        .collect()
                }
                MissingKeysPolicy::RejectAll => {
                    log::warn!("None of the deny-list keys occur in the land-use data; keeping none");
                    Vec::new()
                }
            };
        }

        let total = polygons.len();
        let kept: Vec<HazardGeometry> = polygons
            .into_iter()
            .filter_map(|p| {
                Self::first_match(&active, &p.tags).map(|tag| HazardGeometry {
                    source: HazardSource::LandUse,
                    tag: Some(tag),
                    geometry: p.geometry,
                })
            })
            .collect();

        log::info!(
            "Tag filter kept {} of {total} land-use polygons ({} active rules)",
            kept.len(),
            active.len()
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    fn tagged(pairs: &[(&str, &str)]) -> TaggedPolygon {
        TaggedPolygon {
            tags: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            geometry: MultiPolygon(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 0.0),
            ]]),
        }
    }

    #[test]
    fn wildcard_and_exact_rules_select_polygons() {
        let filter = HazardFilter::new(TagRule::default_deny_list(), MissingKeysPolicy::AcceptAll);
        let kept = filter.apply(vec![
            tagged(&[("landuse", "industrial")]),
            tagged(&[("landuse", "forest")]),
            tagged(&[("building", "yes")]),
            tagged(&[("natural", "water"), ("name", "Bodom")]),
            tagged(&[("leisure", "park")]),
        ]);

        let tags: Vec<(String, String)> = kept
            .iter()
            .map(|h| {
                let tag = h.tag.clone().unwrap();
                (tag.key, tag.value)
            })
            .collect();
        assert_eq!(
            tags,
            vec![
                ("landuse".to_string(), "industrial".to_string()),
                ("building".to_string(), "yes".to_string()),
                ("natural".to_string(), "water".to_string()),
            ]
        );
        assert!(kept.iter().all(|h| h.source == HazardSource::LandUse));
    }

    #[test]
    fn only_present_keys_are_active() {
        let filter = HazardFilter::new(TagRule::default_deny_list(), MissingKeysPolicy::AcceptAll);
        let present: BTreeSet<&str> = ["landuse", "name"].into_iter().collect();
        let active = filter.active_rules(&present);
        assert_eq!(active.len(), 7);
        assert!(active.iter().all(|r| r.key == "landuse"));
    }

    #[test]
    fn missing_keys_policy_decides_when_nothing_applies() {
        let polygons = vec![tagged(&[("leisure", "park")]), tagged(&[])];

        let accept = HazardFilter::new(TagRule::default_deny_list(), MissingKeysPolicy::AcceptAll);
        let kept = accept.apply(polygons.clone());
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|h| h.tag.is_none()));

        let reject = HazardFilter::new(TagRule::default_deny_list(), MissingKeysPolicy::RejectAll);
        assert!(reject.apply(polygons).is_empty());
    }

    #[test]
    fn rule_keys_are_distinct() {
        let filter = HazardFilter::new(TagRule::default_deny_list(), MissingKeysPolicy::AcceptAll);
        let keys: Vec<&str> = filter.rule_keys().into_iter().collect();
        assert_eq!(keys, vec!["building", "landuse", "natural", "place"]);
    }
}
