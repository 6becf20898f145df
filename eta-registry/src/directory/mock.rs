//! Scripted dataset source for tests and offline development.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::BoxFuture;

use crate::domain::{BilingualText, Coordinates, Operator, Route, Stop};

use super::client::DirectorySource;
use super::error::DirectoryError;
use super::sheet::DataSheet;

/// An in-memory [`DirectorySource`] whose version and payload can be
/// rewritten mid-test, with failure injection and call counting.
pub struct MockDirectorySource {
    version: Mutex<String>,
    sheet: Mutex<DataSheet>,
    fail_version: AtomicBool,
    fail_sheet: AtomicBool,
    sheet_delay: Mutex<std::time::Duration>,
    version_calls: AtomicUsize,
    sheet_calls: AtomicUsize,
}

impl MockDirectorySource {
    pub fn new(version: impl Into<String>, sheet: DataSheet) -> Self {
        Self {
            version: Mutex::new(version.into()),
            sheet: Mutex::new(sheet),
            fail_version: AtomicBool::new(false),
            fail_sheet: AtomicBool::new(false),
            sheet_delay: Mutex::new(std::time::Duration::ZERO),
            version_calls: AtomicUsize::new(0),
            sheet_calls: AtomicUsize::new(0),
        }
    }

    /// Replace the served payload and bump the version, as a remote
    /// dataset update would.
    pub fn publish(&self, version: impl Into<String>, sheet: DataSheet) {
        *self.version.lock().unwrap() = version.into();
        *self.sheet.lock().unwrap() = sheet;
    }

    pub fn set_fail_version(&self, fail: bool) {
        self.fail_version.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_sheet(&self, fail: bool) {
        self.fail_sheet.store(fail, Ordering::SeqCst);
    }

    /// Make sheet fetches take this long, to observe mid-flight states.
    pub fn set_sheet_delay(&self, delay: std::time::Duration) {
        *self.sheet_delay.lock().unwrap() = delay;
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }

    pub fn sheet_calls(&self) -> usize {
        self.sheet_calls.load(Ordering::SeqCst)
    }
}

impl DirectorySource for MockDirectorySource {
    fn fetch_version(&self) -> BoxFuture<'_, Result<String, DirectoryError>> {
        Box::pin(async move {
            self.version_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_version.load(Ordering::SeqCst) {
                return Err(DirectoryError::Upstream {
                    status: 0,
                    message: "injected version failure".to_string(),
                });
            }
            Ok(self.version.lock().unwrap().clone())
        })
    }

    fn fetch_sheet(&self) -> BoxFuture<'_, Result<DataSheet, DirectoryError>> {
        Box::pin(async move {
            self.sheet_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.sheet_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.fail_sheet.load(Ordering::SeqCst) {
                return Err(DirectoryError::Upstream {
                    status: 500,
                    message: "injected sheet failure".to_string(),
                });
            }
            Ok(self.sheet.lock().unwrap().clone())
        })
    }
}

/// A minimal single-operator route for fixtures.
pub fn simple_route(number: &str, operator: Operator, stop_ids: &[&str]) -> Route {
    Route {
        route_number: number.to_string(),
        bound: BTreeMap::from([(operator.clone(), "O".to_string())]),
        co: vec![operator.clone()],
        service_type: "1".to_string(),
        variant_id: None,
        line_id: None,
        region: None,
        circular: false,
        joint_operated: false,
        orig: BilingualText::new("起點", "Origin"),
        dest: BilingualText::new("終點", "Destination"),
        stops: BTreeMap::from([(
            operator,
            stop_ids.iter().map(|s| s.to_string()).collect(),
        )]),
    }
}

/// Assemble a sheet from route and stop tables, deriving `stop_map` from
/// the routes' stop membership.
pub fn sheet_from_tables(
    routes: Vec<(String, Route)>,
    stops: Vec<(String, Stop)>,
) -> DataSheet {
    let mut stop_map: BTreeMap<String, Vec<(Operator, String)>> = BTreeMap::new();
    for (key, route) in &routes {
        for (operator, stop_ids) in &route.stops {
            for stop_id in stop_ids {
                stop_map
                    .entry(stop_id.clone())
                    .or_default()
                    .push((operator.clone(), key.clone()));
            }
        }
    }
    // Back-references only for stops that exist in the table.
    let stop_list: BTreeMap<String, Stop> = stops.into_iter().collect();
    stop_map.retain(|stop_id, _| stop_list.contains_key(stop_id));

    DataSheet {
        holidays: vec![chrono::NaiveDate::from_ymd_opt(2023, 7, 1).unwrap()],
        route_list: routes.into_iter().collect(),
        stop_list,
        stop_map,
    }
}

/// The standard fixture sheet used across component tests.
///
/// Route numbers {"1", "1A", "2", "2X"} with KMB and CTB stops laid out on
/// a north-south line, matching the prefix-search and geo examples in the
/// component tests.
pub fn sample_sheet() -> DataSheet {
    let stop = |lat: f64, zh: &str, en: &str| {
        Stop::new(Coordinates::new(lat, 114.17), BilingualText::new(zh, en))
    };

    let stops = vec![
        (
            "AAAA000000000001".to_string(),
            stop(22.3000, "一號站", "Stop One"),
        ),
        (
            "AAAA000000000002".to_string(),
            stop(22.3010, "二號站", "Stop Two"),
        ),
        (
            "AAAA000000000003".to_string(),
            stop(22.3100, "三號站", "Stop Three"),
        ),
        ("001234".to_string(), stop(22.3045, "四號站", "Stop Four")),
    ];

    let routes = vec![
        (
            "1+1+kmb+O".to_string(),
            simple_route(
                "1",
                Operator::Kmb,
                &[
                    "AAAA000000000001",
                    "AAAA000000000002",
                    "AAAA000000000003",
                ],
            ),
        ),
        (
            "1A+1+kmb+O".to_string(),
            simple_route("1A", Operator::Kmb, &["AAAA000000000002", "AAAA000000000003"]),
        ),
        (
            "2+1+ctb+O".to_string(),
            simple_route("2", Operator::Ctb, &["001234"]),
        ),
        (
            "2X+1+ctb+O".to_string(),
            simple_route("2X", Operator::Ctb, &["001234"]),
        ),
    ];

    sheet_from_tables(routes, stops)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_serves_and_counts() {
        let source = MockDirectorySource::new("v1", sample_sheet());
        assert_eq!(source.fetch_version().await.unwrap(), "v1");
        assert_eq!(source.version_calls(), 1);

        let sheet = source.fetch_sheet().await.unwrap();
        assert_eq!(sheet, sample_sheet());
        assert_eq!(source.sheet_calls(), 1);
    }

    #[tokio::test]
    async fn mock_failure_injection() {
        let source = MockDirectorySource::new("v1", sample_sheet());
        source.set_fail_version(true);
        assert!(source.fetch_version().await.is_err());
        source.set_fail_version(false);
        assert!(source.fetch_version().await.is_ok());
    }

    #[test]
    fn derived_stop_map_is_consistent() {
        let sheet = sample_sheet();
        sheet.validate().unwrap();
        // Stop two is served by routes 1 and 1A.
        let refs = &sheet.stop_map["AAAA000000000002"];
        assert_eq!(refs.len(), 2);
    }
}
