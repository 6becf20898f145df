//! Real-time arrival dispatcher.
//!
//! One adapter per operator translates its upstream feed into the
//! canonical [`EtaQueryResult`]; the dispatcher owns timeouts, per-key
//! request coalescing, and the conversion of upstream failures into
//! flagged results. It is strictly pull-based: callers poll on their own
//! schedule and drop the future to cancel.

mod adapter;
pub mod adapters;
mod error;
pub mod mock;
mod result;

pub use adapter::{EtaAdapter, EtaRequest};
pub use error::EtaError;
pub use result::{ETA_LINE_COUNT, EtaLine, EtaQueryResult};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;

use crate::domain::{Operator, RouteKey};

/// Cache key for one logical ETA query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EtaKey {
    pub stop_id: String,
    pub route_key: RouteKey,
    pub operator: Operator,
}

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct EtaDispatcherConfig {
    /// Hard bound on any single upstream call. Must sit comfortably below
    /// the UI polling interval.
    pub upstream_timeout: Duration,

    /// How long a fetched result keeps absorbing identical queries.
    /// Callers apply the separate 30-second staleness rule themselves.
    pub coalesce_ttl: Duration,

    /// Maximum number of cached results.
    pub max_capacity: u64,
}

impl Default for EtaDispatcherConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: Duration::from_secs(10),
            coalesce_ttl: Duration::from_secs(10),
            max_capacity: 500,
        }
    }
}

impl EtaDispatcherConfig {
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_coalesce_ttl(mut self, ttl: Duration) -> Self {
        self.coalesce_ttl = ttl;
        self
    }
}

/// Routes ETA queries to per-operator adapters.
///
/// Concurrent queries for the same (stop, route, operator) key within the
/// coalescing window share a single upstream call and receive the same
/// result; unrelated keys proceed independently. Upstream failures and
/// timeouts come back as connection-error results and are never cached, so
/// the next poll retries.
pub struct EtaDispatcher {
    adapters: HashMap<Operator, Arc<dyn EtaAdapter>>,
    cache: MokaCache<EtaKey, Arc<EtaQueryResult>>,
    upstream_timeout: Duration,
}

impl EtaDispatcher {
    pub fn new(config: EtaDispatcherConfig, adapters: Vec<Arc<dyn EtaAdapter>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.operator(), adapter))
            .collect();
        let cache = MokaCache::builder()
            .time_to_live(config.coalesce_ttl)
            .max_capacity(config.max_capacity)
            .build();
        Self {
            adapters,
            cache,
            upstream_timeout: config.upstream_timeout,
        }
    }

    /// Whether an adapter is registered for an operator.
    pub fn has_adapter(&self, operator: &Operator) -> bool {
        self.adapters.contains_key(operator)
    }

    /// The operators with registered adapters.
    pub fn operators(&self) -> Vec<Operator> {
        let mut operators: Vec<Operator> = self.adapters.keys().cloned().collect();
        operators.sort();
        operators
    }

    /// Answer one ETA query.
    ///
    /// Returns `Err` only for [`EtaError::NoAdapter`] — asking for an
    /// operator this dispatcher was not built with is a programming error.
    /// Upstream trouble of any kind yields an `Ok` result flagged
    /// `is_connection_error`.
    pub async fn query(&self, request: EtaRequest) -> Result<Arc<EtaQueryResult>, EtaError> {
        let Some(adapter) = self.adapters.get(&request.operator).cloned() else {
            return Err(EtaError::NoAdapter(request.operator.clone()));
        };

        let key = EtaKey {
            stop_id: request.stop_id.clone(),
            route_key: request.route_key.clone(),
            operator: request.operator.clone(),
        };
        let operator = request.operator.clone();
        let timeout = self.upstream_timeout;

        let outcome = self
            .cache
            .try_get_with(key.clone(), async move {
                match tokio::time::timeout(timeout, adapter.fetch(&request)).await {
                    Ok(Ok(result)) => Ok(Arc::new(result)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(EtaError::Timeout),
                }
            })
            .await;

        match outcome {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(
                    stop_id = %key.stop_id,
                    route_key = %key.route_key,
                    operator = %key.operator,
                    "eta query failed: {e}"
                );
                Ok(Arc::new(EtaQueryResult::connection_error(operator)))
            }
        }
    }

    /// Drop all coalesced results, forcing fresh upstream calls.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockEtaAdapter;
    use super::*;
    use crate::directory::mock::simple_route;
    use futures::future::join_all;
    use std::collections::BTreeMap;

    fn dispatcher_with(
        adapter: Arc<MockEtaAdapter>,
        config: EtaDispatcherConfig,
    ) -> EtaDispatcher {
        EtaDispatcher::new(config, vec![adapter])
    }

    fn request_for(operator: Operator, stop_id: &str) -> EtaRequest {
        let route = simple_route("960", operator.clone(), &[stop_id]);
        EtaRequest {
            stop_id: stop_id.to_string(),
            stop_index: 1,
            operator: operator.clone(),
            route_key: format!("960+1+{}+O", operator.as_str()),
            route,
            stop: None,
        }
    }

    #[tokio::test]
    async fn concurrent_identical_queries_coalesce_to_one_upstream_call() {
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Kmb));
        adapter.set_delay(Duration::from_millis(50));
        let dispatcher = Arc::new(dispatcher_with(adapter.clone(), EtaDispatcherConfig::default()));

        let queries = (0..8).map(|_| {
            let dispatcher = dispatcher.clone();
            async move {
                dispatcher
                    .query(request_for(Operator::Kmb, "AAAA000000000001"))
                    .await
                    .unwrap()
            }
        });
        let results = join_all(queries).await;

        assert_eq!(adapter.calls(), 1);
        for result in &results[1..] {
            assert!(Arc::ptr_eq(result, &results[0]));
        }
        assert_eq!(results[0].next_countdown_minutes(), Some(5));
    }

    #[tokio::test]
    async fn distinct_keys_do_not_share_calls() {
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Kmb));
        let dispatcher = dispatcher_with(adapter.clone(), EtaDispatcherConfig::default());

        dispatcher
            .query(request_for(Operator::Kmb, "AAAA000000000001"))
            .await
            .unwrap();
        dispatcher
            .query(request_for(Operator::Kmb, "AAAA000000000002"))
            .await
            .unwrap();

        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn cached_result_is_reused_within_the_window() {
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Kmb));
        let dispatcher = dispatcher_with(adapter.clone(), EtaDispatcherConfig::default());

        let first = dispatcher
            .query(request_for(Operator::Kmb, "AAAA000000000001"))
            .await
            .unwrap();
        let second = dispatcher
            .query(request_for(Operator::Kmb, "AAAA000000000001"))
            .await
            .unwrap();

        assert_eq!(adapter.calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn upstream_failure_becomes_connection_error_and_is_not_cached() {
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Kmb));
        adapter.set_fail(true);
        let dispatcher = dispatcher_with(adapter.clone(), EtaDispatcherConfig::default());

        let failed = dispatcher
            .query(request_for(Operator::Kmb, "AAAA000000000001"))
            .await
            .unwrap();
        assert!(failed.is_connection_error);
        assert_eq!(failed.line(1), &EtaLine::ConnectionError);

        // The failure was not cached: the next poll goes upstream again.
        adapter.set_fail(false);
        let recovered = dispatcher
            .query(request_for(Operator::Kmb, "AAAA000000000001"))
            .await
            .unwrap();
        assert!(!recovered.is_connection_error);
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn slow_upstream_times_out_into_connection_error() {
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Kmb));
        adapter.set_delay(Duration::from_millis(200));
        let config = EtaDispatcherConfig::default()
            .with_upstream_timeout(Duration::from_millis(20));
        let dispatcher = dispatcher_with(adapter.clone(), config);

        let result = dispatcher
            .query(request_for(Operator::Kmb, "AAAA000000000001"))
            .await
            .unwrap();
        assert!(result.is_connection_error);
    }

    #[tokio::test]
    async fn unknown_operator_is_a_loud_error() {
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Kmb));
        let dispatcher = dispatcher_with(adapter, EtaDispatcherConfig::default());

        let err = dispatcher
            .query(request_for(Operator::Ctb, "001234"))
            .await
            .unwrap_err();
        assert!(matches!(err, EtaError::NoAdapter(Operator::Ctb)));
    }

    #[tokio::test]
    async fn sentinel_lines_pass_through_unchanged() {
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Mtr));
        adapter.set_lines(BTreeMap::from([(1, EtaLine::EndOfLine)]));
        let dispatcher = dispatcher_with(adapter, EtaDispatcherConfig::default());

        let result = dispatcher
            .query(request_for(Operator::Mtr, "TIS"))
            .await
            .unwrap();
        assert_eq!(result.line(1), &EtaLine::EndOfLine);
        assert!(!result.is_connection_error);
    }
}
