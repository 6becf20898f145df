//! Per-operator adapter seam.

use futures::future::BoxFuture;

use crate::domain::{Operator, Route, RouteKey, Stop};

use super::error::EtaError;
use super::result::EtaQueryResult;

/// One ETA query as the adapters see it.
#[derive(Debug, Clone)]
pub struct EtaRequest {
    pub stop_id: String,
    /// Position of the stop along the route branch, 1-based.
    pub stop_index: u32,
    pub operator: Operator,
    pub route_key: RouteKey,
    pub route: Route,
    /// The stop payload when the caller has it; some feeds key on the
    /// stop's auxiliary alias id rather than the stop id itself.
    pub stop: Option<Stop>,
}

/// Fetches and normalizes one operator's real-time arrivals.
///
/// Each adapter owns the full translation from its upstream wire format
/// into [`EtaQueryResult`]; nothing operator-specific leaks past this
/// trait. Adding an operator means implementing this and registering it
/// with the dispatcher, not touching dispatch logic.
pub trait EtaAdapter: Send + Sync {
    /// The operator this adapter serves.
    fn operator(&self) -> Operator;

    /// Fetch arrivals for one (stop, route) pair.
    ///
    /// Errors are folded into a connection-error result by the dispatcher;
    /// adapters should return them rather than inventing sentinel lines
    /// for transport failures.
    fn fetch<'a>(&'a self, request: &'a EtaRequest)
    -> BoxFuture<'a, Result<EtaQueryResult, EtaError>>;
}

#[cfg(test)]
pub(crate) fn test_request(operator: Operator, route: Route, stop_id: &str) -> EtaRequest {
    let route_key = format!("{}+1+{}+O", route.route_number, operator.as_str());
    EtaRequest {
        stop_id: stop_id.to_string(),
        stop_index: 1,
        operator,
        route_key,
        route,
        stop: None,
    }
}
