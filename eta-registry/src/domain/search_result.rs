//! Transferable route search results.

use serde::{Deserialize, Serialize};

use super::coordinates::Coordinates;
use super::operator::Operator;
use super::route::{Route, RouteKey};
use super::stop::Stop;

/// A stop reference attached to a search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopInfo {
    pub stop_id: String,

    /// The stop payload; dropped by [`RouteSearchResultEntry::strip`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Stop>,

    /// Distance from the search origin in kilometres.
    pub distance: f64,

    pub operator: Operator,

    /// Position of the stop along the route branch, 1-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_index: Option<u32>,
}

/// A transient reference to a route (and optionally a stop on it) produced
/// by search and ranking queries.
///
/// Entries can be stripped to identifiers for cheap transfer across a
/// process boundary and re-hydrated from the directory on the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSearchResultEntry {
    pub route_key: RouteKey,

    /// The route payload; dropped by [`Self::strip`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,

    pub operator: Operator,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_info: Option<StopInfo>,

    /// Where the search originated, for proximity display.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Coordinates>,

    /// Whether this entry came from an interchange search.
    #[serde(default)]
    pub interchange_search: bool,
}

impl RouteSearchResultEntry {
    pub fn new(route_key: RouteKey, route: Option<Route>, operator: Operator) -> Self {
        Self {
            route_key,
            route,
            operator,
            stop_info: None,
            origin: None,
            interchange_search: false,
        }
    }

    pub fn with_stop_info(mut self, stop_info: StopInfo) -> Self {
        self.stop_info = Some(stop_info);
        self
    }

    pub fn with_origin(mut self, origin: Coordinates) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn interchange(mut self) -> Self {
        self.interchange_search = true;
        self
    }

    /// Drop the heavyweight payloads, keeping only identifiers.
    pub fn strip(&mut self) {
        self.route = None;
        if let Some(stop_info) = &mut self.stop_info {
            stop_info.data = None;
        }
    }

    /// Refill stripped payloads from directory tables.
    ///
    /// Looks the route up by key and the stop up by id; identifiers with no
    /// match in the tables are left unresolved rather than failing.
    pub fn hydrate(
        &mut self,
        route_lookup: impl Fn(&str) -> Option<Route>,
        stop_lookup: impl Fn(&str) -> Option<Stop>,
    ) {
        if self.route.is_none() {
            self.route = route_lookup(&self.route_key);
        }
        if let Some(stop_info) = &mut self.stop_info
            && stop_info.data.is_none()
        {
            stop_info.data = stop_lookup(&stop_info.stop_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BilingualText;
    use std::collections::BTreeMap;

    fn sample_entry() -> RouteSearchResultEntry {
        let route = Route {
            route_number: "2X".to_string(),
            bound: BTreeMap::from([(Operator::Kmb, "O".to_string())]),
            co: vec![Operator::Kmb],
            service_type: "1".to_string(),
            variant_id: None,
            line_id: None,
            region: None,
            circular: false,
            joint_operated: false,
            orig: BilingualText::new("甲", "A"),
            dest: BilingualText::new("乙", "B"),
            stops: BTreeMap::from([(Operator::Kmb, vec!["AAAA000000000001".to_string()])]),
        };
        let stop = Stop::new(
            Coordinates::new(22.3, 114.17),
            BilingualText::new("站", "Stop"),
        );
        RouteSearchResultEntry::new("2X+1+kmb+O".to_string(), Some(route), Operator::Kmb)
            .with_stop_info(StopInfo {
                stop_id: "AAAA000000000001".to_string(),
                data: Some(stop),
                distance: 0.12,
                operator: Operator::Kmb,
                stop_index: Some(1),
            })
            .with_origin(Coordinates::new(22.3, 114.17))
    }

    #[test]
    fn strip_drops_payloads_keeps_identifiers() {
        let mut entry = sample_entry();
        entry.strip();
        assert!(entry.route.is_none());
        let stop_info = entry.stop_info.as_ref().unwrap();
        assert!(stop_info.data.is_none());
        assert_eq!(stop_info.stop_id, "AAAA000000000001");
        assert_eq!(entry.route_key, "2X+1+kmb+O");
    }

    #[test]
    fn hydrate_refills_from_lookup() {
        let full = sample_entry();
        let route = full.route.clone().unwrap();
        let stop = full.stop_info.as_ref().unwrap().data.clone().unwrap();

        let mut stripped = full.clone();
        stripped.strip();
        stripped.hydrate(
            |key| (key == full.route_key).then(|| route.clone()),
            |id| (id == "AAAA000000000001").then(|| stop.clone()),
        );
        assert_eq!(stripped, full);
    }

    #[test]
    fn hydrate_tolerates_unknown_keys() {
        let mut stripped = sample_entry();
        stripped.strip();
        stripped.hydrate(|_| None, |_| None);
        assert!(stripped.route.is_none());
        assert!(stripped.stop_info.as_ref().unwrap().data.is_none());
    }

    #[test]
    fn serde_round_trip_stripped_and_full() {
        let full = sample_entry();
        let json = serde_json::to_string(&full).unwrap();
        assert_eq!(
            serde_json::from_str::<RouteSearchResultEntry>(&json).unwrap(),
            full
        );

        let mut stripped = full;
        stripped.strip();
        let json = serde_json::to_string(&stripped).unwrap();
        assert_eq!(
            serde_json::from_str::<RouteSearchResultEntry>(&json).unwrap(),
            stripped
        );
    }
}
