//! Prefix search over route numbers.

use std::collections::{BTreeMap, BTreeSet};

use crate::directory::DataSheet;
use crate::domain::{BUILT_IN_OPERATORS, Operator, Route, RouteSearchResultEntry};

/// Continuations of a route-number prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextChars {
    /// Characters that extend the prefix to a prefix of some route number,
    /// in canonical case.
    pub characters: BTreeSet<char>,
    /// Whether the prefix is itself a complete route number.
    pub has_exact_match: bool,
}

/// Predicate narrowing a route search by key, route, or operator.
pub type RoutePredicate = dyn Fn(&str, &Route, &Operator) -> bool + Send + Sync;

/// Index over the distinct route numbers of one dataset snapshot.
///
/// Matching is case-insensitive; results echo the canonical case stored in
/// the dataset. Built once per snapshot and memoized there.
#[derive(Debug)]
pub struct RouteNumberIndex {
    /// Uppercased route number -> canonical-case route number.
    numbers: BTreeMap<String, String>,
}

impl RouteNumberIndex {
    pub fn build(sheet: &DataSheet) -> Self {
        let mut numbers = BTreeMap::new();
        for route in sheet.route_list.values() {
            numbers
                .entry(route.route_number.to_uppercase())
                .or_insert_with(|| route.route_number.clone());
        }
        Self { numbers }
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// What can follow `prefix` on the input keypad.
    ///
    /// The empty prefix yields the first characters of every route number.
    pub fn next_chars(&self, prefix: &str) -> NextChars {
        let prefix_upper = prefix.to_uppercase();
        let position = prefix_upper.chars().count();

        let mut characters = BTreeSet::new();
        let mut has_exact_match = false;

        for (upper, canonical) in &self.numbers {
            if !upper.starts_with(&prefix_upper) {
                continue;
            }
            match canonical.chars().nth(position) {
                Some(c) => {
                    characters.insert(c);
                }
                None => has_exact_match = true,
            }
        }

        NextChars {
            characters,
            has_exact_match,
        }
    }
}

/// Find route branches by route number.
///
/// `exact` restricts to numbers equal to `input`; otherwise any number
/// starting with `input` matches. Matching is case-insensitive. Branches
/// that collapse to the same (number, operator, direction) keep only the
/// lowest-ranked `service_type`. Results are ordered by route key so a
/// given snapshot always lists them identically.
pub fn find_routes(
    sheet: &DataSheet,
    input: &str,
    exact: bool,
    predicate: Option<&RoutePredicate>,
) -> Vec<RouteSearchResultEntry> {
    let input_upper = input.to_uppercase();

    // (number, operator, direction) -> route key of the best branch so far
    let mut best: BTreeMap<(String, String, String), &str> = BTreeMap::new();

    for (key, route) in &sheet.route_list {
        let number_upper = route.route_number.to_uppercase();
        let matches = if exact {
            number_upper == input_upper
        } else {
            number_upper.starts_with(&input_upper)
        };
        if !matches {
            continue;
        }

        let operator = primary_operator(route);
        if let Some(p) = predicate
            && !p(key, route, &operator)
        {
            continue;
        }

        let direction = route.id_bound(&operator).unwrap_or_default().to_string();
        let dedup_key = (
            number_upper,
            operator.as_str().to_string(),
            direction,
        );
        match best.get_mut(&dedup_key) {
            Some(existing) => {
                let existing_rank = sheet
                    .route(*existing)
                    .map(Route::service_type_rank)
                    .unwrap_or(u32::MAX);
                if route.service_type_rank() < existing_rank {
                    *existing = key;
                }
            }
            None => {
                best.insert(dedup_key, key);
            }
        }
    }

    let mut keys: Vec<&str> = best.into_values().collect();
    keys.sort_unstable();
    keys.into_iter()
        .map(|key| {
            let route = sheet.route(key).cloned();
            let operator = route
                .as_ref()
                .map(primary_operator)
                .unwrap_or(Operator::Other(String::new()));
            RouteSearchResultEntry::new(key.to_string(), route, operator)
        })
        .collect()
}

/// The operator a route is listed under: the first built-in operator (in
/// ordinal order) present on the route, falling back to the first listed.
pub fn primary_operator(route: &Route) -> Operator {
    BUILT_IN_OPERATORS
        .iter()
        .find(|op| route.co.contains(op))
        .cloned()
        .or_else(|| route.co.first().cloned())
        .unwrap_or(Operator::Other(String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::mock::{sample_sheet, sheet_from_tables, simple_route};

    fn chars(index: &RouteNumberIndex, prefix: &str) -> Vec<char> {
        index.next_chars(prefix).characters.into_iter().collect()
    }

    #[test]
    fn next_chars_empty_prefix_lists_first_characters() {
        let sheet = sample_sheet();
        let index = RouteNumberIndex::build(&sheet);
        assert_eq!(chars(&index, ""), ['1', '2']);
        assert!(!index.next_chars("").has_exact_match);
    }

    #[test]
    fn next_chars_reports_continuations_and_exact_match() {
        let sheet = sample_sheet();
        let index = RouteNumberIndex::build(&sheet);

        let result = index.next_chars("1");
        assert_eq!(result.characters.iter().collect::<Vec<_>>(), [&'A']);
        assert!(result.has_exact_match);

        let result = index.next_chars("1A");
        assert!(result.characters.is_empty());
        assert!(result.has_exact_match);
    }

    #[test]
    fn next_chars_dead_prefix_is_empty() {
        let sheet = sample_sheet();
        let index = RouteNumberIndex::build(&sheet);
        let result = index.next_chars("9");
        assert!(result.characters.is_empty());
        assert!(!result.has_exact_match);
    }

    #[test]
    fn next_chars_is_case_insensitive_but_echoes_canonical_case() {
        let sheet = sheet_from_tables(
            vec![(
                "N171+1+kmb+O".to_string(),
                simple_route("N171", Operator::Kmb, &[]),
            )],
            vec![],
        );
        let index = RouteNumberIndex::build(&sheet);

        let result = index.next_chars("n");
        assert_eq!(result.characters.iter().collect::<Vec<_>>(), [&'1']);

        assert!(index.next_chars("n171").has_exact_match);
    }

    #[test]
    fn find_routes_exact_excludes_longer_numbers() {
        let sheet = sample_sheet();
        let exact = find_routes(&sheet, "1", true, None);
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].route_key, "1+1+kmb+O");

        let prefix = find_routes(&sheet, "1", false, None);
        let keys: Vec<&str> = prefix.iter().map(|e| e.route_key.as_str()).collect();
        assert_eq!(keys, ["1+1+kmb+O", "1A+1+kmb+O"]);
    }

    #[test]
    fn find_routes_hydrates_route_payload() {
        let sheet = sample_sheet();
        let results = find_routes(&sheet, "2X", true, None);
        assert_eq!(results.len(), 1);
        let route = results[0].route.as_ref().unwrap();
        assert_eq!(route.route_number, "2X");
        assert_eq!(results[0].operator, Operator::Ctb);
    }

    #[test]
    fn find_routes_predicate_filters() {
        let sheet = sample_sheet();
        let only_ctb: Vec<_> = find_routes(
            &sheet,
            "",
            false,
            Some(&|_: &str, _: &Route, op: &Operator| *op == Operator::Ctb),
        );
        assert!(!only_ctb.is_empty());
        assert!(only_ctb.iter().all(|e| e.operator == Operator::Ctb));
    }

    #[test]
    fn find_routes_collapses_branches_to_main_service_type() {
        let mut main = simple_route("88", Operator::Kmb, &[]);
        main.service_type = "1".to_string();
        let mut special = simple_route("88", Operator::Kmb, &[]);
        special.service_type = "2".to_string();

        let sheet = sheet_from_tables(
            vec![
                ("88+2+kmb+O".to_string(), special),
                ("88+1+kmb+O".to_string(), main),
            ],
            vec![],
        );

        let results = find_routes(&sheet, "88", true, None);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].route_key, "88+1+kmb+O");
    }

    #[test]
    fn find_routes_is_deterministic() {
        let sheet = sample_sheet();
        let a = find_routes(&sheet, "", false, None);
        let b = find_routes(&sheet, "", false, None);
        assert_eq!(a, b);
    }
}
