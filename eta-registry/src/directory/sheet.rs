//! The static dataset and its immutable snapshot wrapper.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::{Operator, Route, RouteKey, Stop};
use crate::search::RouteNumberIndex;

use super::error::DirectoryError;

/// The full static dataset: holiday calendar, route table, stop table, and
/// the stop-to-routes back-reference table.
///
/// A `DataSheet` is never mutated after a successful load; refreshes build
/// a new one and swap the published [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSheet {
    /// Public holidays, used for schedule-dependent presentation.
    pub holidays: Vec<NaiveDate>,

    /// All route branches keyed by opaque route key.
    pub route_list: BTreeMap<RouteKey, Route>,

    /// All stops keyed by stop id.
    pub stop_list: BTreeMap<String, Stop>,

    /// For each stop id, the (operator, route key) pairs serving it.
    pub stop_map: BTreeMap<String, Vec<(Operator, RouteKey)>>,
}

impl DataSheet {
    /// Check referential integrity: every route key in `stop_map` must
    /// exist in `route_list`, and every stop id in `stop_map` must exist in
    /// `stop_list`.
    ///
    /// Must pass before a sheet is published; a sheet that fails here is
    /// discarded wholesale.
    pub fn validate(&self) -> Result<(), DirectoryError> {
        for (stop_id, refs) in &self.stop_map {
            if !self.stop_list.contains_key(stop_id) {
                return Err(DirectoryError::Invariant(format!(
                    "stop_map references unknown stop id {stop_id}"
                )));
            }
            for (_, route_key) in refs {
                if !self.route_list.contains_key(route_key) {
                    return Err(DirectoryError::Invariant(format!(
                        "stop_map entry for {stop_id} references unknown route key {route_key}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether a date runs the holiday timetable (weekend or listed
    /// holiday).
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun) || self.holidays.contains(&date)
    }

    /// Look up a stop by id.
    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stop_list.get(stop_id)
    }

    /// Look up a route by key.
    pub fn route(&self, route_key: &str) -> Option<&Route> {
        self.route_list.get(route_key)
    }

    /// The ordered stop sequence of a route under one operator and
    /// direction, merged across branches.
    ///
    /// Where several branches of the same route serve a stop, the branch
    /// with the lowest numeric `service_type` wins, but the stop keeps its
    /// first-seen position in the sequence.
    pub fn route_stops(
        &self,
        route_number: &str,
        operator: &Operator,
        bound_id: &str,
    ) -> Vec<RouteStopEntry> {
        let mut entries: Vec<RouteStopEntry> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for route in self.route_list.values() {
            if route.route_number != route_number
                || !route.co.contains(operator)
                || route.id_bound(operator) != Some(bound_id)
            {
                continue;
            }
            for stop_id in route.stops_of(operator) {
                let Some(stop) = self.stop_list.get(stop_id) else {
                    continue;
                };
                match positions.get(stop_id.as_str()) {
                    Some(&at) => {
                        if route.service_type_rank() < entries[at].route.service_type_rank() {
                            entries[at].route = route.clone();
                        }
                    }
                    None => {
                        positions.insert(stop_id.clone(), entries.len());
                        entries.push(RouteStopEntry {
                            stop_id: stop_id.clone(),
                            stop: stop.clone(),
                            route: route.clone(),
                        });
                    }
                }
            }
        }
        entries
    }
}

/// One stop along a route branch, paired with the branch that serves it.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteStopEntry {
    pub stop_id: String,
    pub stop: Stop,
    pub route: Route,
}

/// One published generation of the dataset.
///
/// Snapshots are immutable and shared by `Arc`; derived structures (the
/// route-number index) are built lazily and memoized on the snapshot
/// itself, so memoization is keyed on snapshot identity rather than time.
#[derive(Debug)]
pub struct Snapshot {
    generation: u64,
    sheet: DataSheet,
    index: OnceLock<RouteNumberIndex>,
}

impl Snapshot {
    pub fn new(generation: u64, sheet: DataSheet) -> Self {
        Self {
            generation,
            sheet,
            index: OnceLock::new(),
        }
    }

    /// Monotonically increasing publish counter.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn sheet(&self) -> &DataSheet {
        &self.sheet
    }

    /// The prefix index over route numbers, built on first use.
    pub fn route_index(&self) -> &RouteNumberIndex {
        self.index.get_or_init(|| RouteNumberIndex::build(&self.sheet))
    }
}
