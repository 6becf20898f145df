//! Nearest-stop and nearby-route ranking.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::directory::DataSheet;
use crate::domain::{Coordinates, Operator, RouteSearchResultEntry, Stop, StopInfo};

/// Radius within which stops count as "nearby", in kilometres.
pub const NEARBY_RADIUS_KM: f64 = 0.3;

/// A stop with its distance from a query origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyStop {
    pub stop_id: String,
    pub stop: Stop,
    /// Operator identified from the stop id shape, when recognisable.
    pub operator: Option<Operator>,
    /// Distance from the query origin in kilometres.
    pub distance: f64,
}

/// Outcome of a nearby-routes query.
///
/// Either there are stops within [`NEARBY_RADIUS_KM`] and the entries list
/// every route serving them, or there are none and the caller gets the
/// single globally-closest stop to render a "nothing nearby" message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NearbyRoutesResult {
    Nearby { entries: Vec<RouteSearchResultEntry> },
    NothingNearby { closest: Option<NearbyStop> },
}

/// The minimum-distance candidate, with ties going to the earliest entry.
///
/// Returns the winning index and its distance in kilometres.
pub fn nearest_stop<T>(
    origin: &Coordinates,
    candidates: &[T],
    location: impl Fn(&T) -> &Coordinates,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let distance = origin.distance_to(location(candidate));
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, distance)),
        }
    }
    best
}

/// Rank the routes serving stops near an origin.
///
/// Scans the full stop table. Stops whose id shape no built-in operator
/// recognises are ignored, as are routes in `exclude_route_keys` and, when
/// `interchange_from` names the route number being interchanged from, every
/// branch of that number. Each surviving (number, operator, direction)
/// keeps its closest stop, with the lower `service_type` branch winning
/// equal distances. Entries come back ordered by route key.
pub fn nearby_routes(
    sheet: &DataSheet,
    origin: Coordinates,
    exclude_route_keys: &HashSet<String>,
    interchange_from: Option<&str>,
) -> NearbyRoutesResult {
    let mut closest: Option<NearbyStop> = None;
    let mut within_radius: Vec<NearbyStop> = Vec::new();

    for (stop_id, stop) in &sheet.stop_list {
        let distance = origin.distance_to(&stop.location);
        let operator = Operator::for_stop_id(stop_id);

        if closest.as_ref().is_none_or(|c| distance < c.distance) {
            closest = Some(NearbyStop {
                stop_id: stop_id.clone(),
                stop: stop.clone(),
                operator: operator.clone(),
                distance,
            });
        }

        if distance <= NEARBY_RADIUS_KM && operator.is_some() {
            within_radius.push(NearbyStop {
                stop_id: stop_id.clone(),
                stop: stop.clone(),
                operator,
                distance,
            });
        }
    }

    if within_radius.is_empty() {
        return NearbyRoutesResult::NothingNearby { closest };
    }

    // (number, operator, direction) -> best (route key, nearby stop)
    let mut best: BTreeMap<(String, String, String), (String, NearbyStop)> = BTreeMap::new();

    for nearby in &within_radius {
        let Some(refs) = sheet.stop_map.get(&nearby.stop_id) else {
            continue;
        };
        for (operator, route_key) in refs {
            if exclude_route_keys.contains(route_key) {
                continue;
            }
            let Some(route) = sheet.route(route_key) else {
                continue;
            };
            if interchange_from.is_some_and(|from| route.route_number == from) {
                continue;
            }

            let direction = route.id_bound(operator).unwrap_or_default().to_string();
            let dedup_key = (
                route.route_number.to_uppercase(),
                operator.as_str().to_string(),
                direction,
            );

            match best.get_mut(&dedup_key) {
                Some((existing_key, existing_stop)) => {
                    let replace = if nearby.distance < existing_stop.distance {
                        true
                    } else if nearby.distance > existing_stop.distance {
                        false
                    } else {
                        let existing_rank = sheet
                            .route(existing_key)
                            .map(|r| r.service_type_rank())
                            .unwrap_or(u32::MAX);
                        route.service_type_rank() < existing_rank
                    };
                    if replace {
                        *existing_key = route_key.clone();
                        *existing_stop = nearby.clone();
                    }
                }
                None => {
                    best.insert(dedup_key, (route_key.clone(), nearby.clone()));
                }
            }
        }
    }

    let mut picks: Vec<(String, NearbyStop)> = best.into_values().collect();
    picks.sort_by(|a, b| a.0.cmp(&b.0));

    let entries = picks
        .into_iter()
        .map(|(route_key, nearby)| {
            let route = sheet.route(&route_key).cloned();
            let operator = nearby.operator.clone().unwrap_or(Operator::Other(String::new()));
            let stop_index = route.as_ref().and_then(|r| {
                r.stops_of(&operator)
                    .iter()
                    .position(|id| *id == nearby.stop_id)
                    .map(|i| i as u32 + 1)
            });
            let mut entry = RouteSearchResultEntry::new(route_key, route, operator.clone())
                .with_stop_info(StopInfo {
                    stop_id: nearby.stop_id,
                    data: Some(nearby.stop),
                    distance: nearby.distance,
                    operator,
                    stop_index,
                })
                .with_origin(origin);
            if interchange_from.is_some() {
                entry = entry.interchange();
            }
            entry
        })
        .collect();

    NearbyRoutesResult::Nearby { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::mock::{sheet_from_tables, simple_route};
    use crate::domain::BilingualText;

    // Offsets chosen so distances from ORIGIN are roughly 0.11, 0.5 and
    // 2.0 km going north.
    const ORIGIN: Coordinates = Coordinates {
        lat: 22.3,
        lng: 114.17,
    };

    fn stop_at(lat_offset: f64, name: &str) -> Stop {
        Stop::new(
            Coordinates::new(ORIGIN.lat + lat_offset, ORIGIN.lng),
            BilingualText::new(name, name),
        )
    }

    fn three_stop_sheet() -> DataSheet {
        sheet_from_tables(
            vec![
                (
                    "10+1+kmb+O".to_string(),
                    simple_route("10", Operator::Kmb, &["AAAA000000000001"]),
                ),
                (
                    "20+1+kmb+O".to_string(),
                    simple_route("20", Operator::Kmb, &["AAAA000000000002"]),
                ),
                (
                    "30+1+kmb+O".to_string(),
                    simple_route("30", Operator::Kmb, &["AAAA000000000003"]),
                ),
            ],
            vec![
                ("AAAA000000000001".to_string(), stop_at(0.0010, "near")),
                ("AAAA000000000002".to_string(), stop_at(0.0045, "mid")),
                ("AAAA000000000003".to_string(), stop_at(0.0180, "far")),
            ],
        )
    }

    #[test]
    fn nearest_stop_picks_minimum_with_first_occurrence_ties() {
        let stops = [
            Coordinates::new(22.31, 114.17),
            Coordinates::new(22.301, 114.17),
            Coordinates::new(22.301, 114.17),
        ];
        let (index, distance) = nearest_stop(&ORIGIN, &stops, |c| c).unwrap();
        assert_eq!(index, 1);
        assert!(distance < 0.2);
        assert!(nearest_stop::<Coordinates>(&ORIGIN, &[], |c| c).is_none());
    }

    #[test]
    fn routes_within_radius_are_returned() {
        let sheet = three_stop_sheet();
        let result = nearby_routes(&sheet, ORIGIN, &HashSet::new(), None);

        let NearbyRoutesResult::Nearby { entries } = result else {
            panic!("expected nearby hit list");
        };
        // Only the ~0.11 km stop is inside the 0.3 km radius.
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].route_key, "10+1+kmb+O");

        let stop_info = entries[0].stop_info.as_ref().unwrap();
        assert_eq!(stop_info.stop_id, "AAAA000000000001");
        assert!(stop_info.distance < NEARBY_RADIUS_KM);
        assert_eq!(stop_info.stop_index, Some(1));
        assert_eq!(entries[0].origin, Some(ORIGIN));
    }

    #[test]
    fn nothing_within_radius_reports_single_closest_miss() {
        let mut sheet = three_stop_sheet();
        // Remove the near stop so the closest is the ~0.5 km one.
        sheet.stop_list.remove("AAAA000000000001");
        sheet.stop_map.remove("AAAA000000000001");

        let result = nearby_routes(&sheet, ORIGIN, &HashSet::new(), None);
        let NearbyRoutesResult::NothingNearby { closest } = result else {
            panic!("expected nothing-nearby outcome");
        };
        let closest = closest.unwrap();
        assert_eq!(closest.stop_id, "AAAA000000000002");
        assert!((closest.distance - 0.5).abs() < 0.1);
    }

    #[test]
    fn excluded_route_keys_are_dropped() {
        let sheet = three_stop_sheet();
        let excluded: HashSet<String> = ["10+1+kmb+O".to_string()].into();
        let result = nearby_routes(&sheet, ORIGIN, &excluded, None);

        // The only in-radius stop serves only the excluded route.
        let NearbyRoutesResult::Nearby { entries } = result else {
            panic!("expected nearby outcome");
        };
        assert!(entries.is_empty());
    }

    #[test]
    fn interchange_mode_drops_the_origin_route_number() {
        // Two routes share the near stop; interchanging from "10" should
        // only offer "11".
        let sheet = sheet_from_tables(
            vec![
                (
                    "10+1+kmb+O".to_string(),
                    simple_route("10", Operator::Kmb, &["AAAA000000000001"]),
                ),
                (
                    "11+1+kmb+O".to_string(),
                    simple_route("11", Operator::Kmb, &["AAAA000000000001"]),
                ),
            ],
            vec![("AAAA000000000001".to_string(), stop_at(0.0010, "near"))],
        );

        let result = nearby_routes(&sheet, ORIGIN, &HashSet::new(), Some("10"));
        let NearbyRoutesResult::Nearby { entries } = result else {
            panic!("expected nearby outcome");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].route_key, "11+1+kmb+O");
        assert!(entries[0].interchange_search);
    }

    #[test]
    fn each_route_keeps_its_closest_stop() {
        // Route 40 serves both the near and mid stops; the entry should
        // carry the near one.
        let sheet = sheet_from_tables(
            vec![(
                "40+1+kmb+O".to_string(),
                simple_route(
                    "40",
                    Operator::Kmb,
                    &["AAAA000000000002", "AAAA000000000001"],
                ),
            )],
            vec![
                ("AAAA000000000001".to_string(), stop_at(0.0010, "near")),
                ("AAAA000000000002".to_string(), stop_at(0.0020, "mid")),
            ],
        );

        let result = nearby_routes(&sheet, ORIGIN, &HashSet::new(), None);
        let NearbyRoutesResult::Nearby { entries } = result else {
            panic!("expected nearby outcome");
        };
        assert_eq!(entries.len(), 1);
        let stop_info = entries[0].stop_info.as_ref().unwrap();
        assert_eq!(stop_info.stop_id, "AAAA000000000001");
        // The stop keeps its position along the route, not its rank by
        // distance.
        assert_eq!(stop_info.stop_index, Some(2));
    }

    #[test]
    fn unrecognised_stop_ids_are_ignored() {
        let sheet = sheet_from_tables(
            vec![(
                "50+1+kmb+O".to_string(),
                simple_route("50", Operator::Kmb, &["weird-stop-id"]),
            )],
            vec![("weird-stop-id".to_string(), stop_at(0.0010, "near"))],
        );

        let result = nearby_routes(&sheet, ORIGIN, &HashSet::new(), None);
        let NearbyRoutesResult::NothingNearby { closest } = result else {
            panic!("expected nothing-nearby outcome");
        };
        // Still reported as the closest miss for display.
        assert_eq!(closest.unwrap().stop_id, "weird-stop-id");
    }
}
