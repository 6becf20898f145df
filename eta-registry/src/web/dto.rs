//! Data transfer objects for web requests and responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::directory::{DirectoryError, LoadState};
use crate::domain::RouteSearchResultEntry;
use crate::eta::{EtaError, EtaLine};
use crate::favourites::FavouriteError;
use crate::registry::RegistryError;
use crate::search::NextChars;

/// Query for keypad continuations.
#[derive(Debug, Deserialize)]
pub struct NextCharsQuery {
    /// The prefix typed so far; defaults to empty.
    pub prefix: Option<String>,
}

/// Response for keypad continuations.
#[derive(Debug, Serialize)]
pub struct NextCharsResponse {
    pub characters: Vec<char>,
    pub has_exact_match: bool,
}

impl From<NextChars> for NextCharsResponse {
    fn from(next: NextChars) -> Self {
        Self {
            characters: next.characters.into_iter().collect(),
            has_exact_match: next.has_exact_match,
        }
    }
}

/// Query for route search.
#[derive(Debug, Deserialize)]
pub struct RouteSearchQuery {
    /// Route number or prefix.
    pub q: String,
    /// Restrict to exact number matches.
    pub exact: Option<bool>,
}

/// Response for route search and entry hydration.
#[derive(Debug, Serialize)]
pub struct RouteSearchResponse {
    pub entries: Vec<RouteSearchResultEntry>,
}

/// Query for nearby routes.
#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    /// Comma-separated route keys to leave out.
    pub exclude: Option<String>,
    /// Route number being interchanged from, when set.
    pub interchange_from: Option<String>,
}

/// Query parameters accompanying an ETA path.
#[derive(Debug, Deserialize)]
pub struct EtaQuery {
    pub route_key: String,
    /// 1-based position of the stop along the route.
    pub stop_index: Option<u32>,
}

/// Response for an ETA query.
#[derive(Debug, Serialize)]
pub struct EtaResponse {
    pub operator: String,
    pub lines: Vec<EtaLine>,
    pub is_connection_error: bool,
    /// Seconds since the result was fetched upstream.
    pub age_secs: u64,
}

/// Response for the loader state probe.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: LoadState,
}

/// Error payload returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Web-layer error with an HTTP status mapping.
#[derive(Debug)]
pub enum AppError {
    BadRequest { message: String },
    NotFound { message: String },
    Unavailable { message: String },
    Internal { message: String },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest {
            message: message.into(),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match &err {
            RegistryError::UnknownRouteKey(_) => AppError::NotFound {
                message: err.to_string(),
            },
            RegistryError::Directory(
                DirectoryError::Unavailable | DirectoryError::LoadTimeout | DirectoryError::Offline,
            ) => AppError::Unavailable {
                message: err.to_string(),
            },
            RegistryError::Eta(EtaError::NoAdapter(_)) => AppError::BadRequest {
                message: err.to_string(),
            },
            RegistryError::Favourites(FavouriteError::SlotOutOfRange { .. }) => {
                AppError::BadRequest {
                    message: err.to_string(),
                }
            }
            _ => AppError::Internal {
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message),
            AppError::Unavailable { message } => (StatusCode::SERVICE_UNAVAILABLE, message),
            AppError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn next_chars_response_flattens_the_set() {
        let next = NextChars {
            characters: BTreeSet::from(['1', 'A']),
            has_exact_match: true,
        };
        let response = NextCharsResponse::from(next);
        assert_eq!(response.characters, ['1', 'A']);
        assert!(response.has_exact_match);
    }

    #[test]
    fn registry_errors_map_to_statuses() {
        let err: AppError = RegistryError::UnknownRouteKey("x".into()).into();
        assert!(matches!(err, AppError::NotFound { .. }));

        let err: AppError = RegistryError::Directory(DirectoryError::Unavailable).into();
        assert!(matches!(err, AppError::Unavailable { .. }));

        let err: AppError =
            RegistryError::Eta(EtaError::NoAdapter(crate::domain::Operator::Mtr)).into();
        assert!(matches!(err, AppError::BadRequest { .. }));
    }
}
