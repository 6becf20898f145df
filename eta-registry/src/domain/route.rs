//! Route value type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::bilingual::BilingualText;
use super::operator::Operator;

/// Stable identifier for one direction/branch of one route under one
/// operator. Route keys are the keys of the directory's route table and are
/// treated as opaque strings.
pub type RouteKey = String;

/// One direction/branch of a route.
///
/// A single route number may map to several `Route` values: one per
/// operator, direction, and branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// The public route number, e.g. "960" or "N171".
    pub route_number: String,

    /// Direction token per operator running this route.
    pub bound: BTreeMap<Operator, String>,

    /// Operators running this route, in listing order.
    pub co: Vec<Operator>,

    /// Branch rank; lower numeric values are the main branch.
    pub service_type: String,

    /// Operator-specific variant id keyed instead of `bound` by some
    /// operators' feeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,

    /// Operator-specific line id used by feed cross-references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_id: Option<String>,

    /// Operator-specific region the route belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Whether the route loops back to its origin.
    #[serde(default)]
    pub circular: bool,

    /// Whether this is a joint service between two operators.
    #[serde(default)]
    pub joint_operated: bool,

    pub orig: BilingualText,
    pub dest: BilingualText,

    /// Ordered stop ids per operator branch.
    pub stops: BTreeMap<Operator, Vec<String>>,
}

impl Route {
    /// The token identifying this route's direction for an operator's feed:
    /// the variant id where one exists, otherwise the bound entry.
    pub fn id_bound(&self, operator: &Operator) -> Option<&str> {
        if let Some(variant) = &self.variant_id {
            return Some(variant);
        }
        self.bound.get(operator).map(String::as_str)
    }

    /// Numeric branch rank for tie-breaking; unparsable ranks lose.
    pub fn service_type_rank(&self) -> u32 {
        self.service_type.parse().unwrap_or(u32::MAX)
    }

    /// The stop ids this route serves under an operator.
    pub fn stops_of(&self, operator: &Operator) -> &[String] {
        self.stops.get(operator).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the route serves a stop id under any of its operators.
    pub fn serves_stop(&self, stop_id: &str) -> Option<Operator> {
        self.stops
            .iter()
            .find(|(_, ids)| ids.iter().any(|id| id == stop_id))
            .map(|(op, _)| op.clone())
    }
}
