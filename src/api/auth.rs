//! Token authentication middleware.
//!
//! Clients send `Authorization: Token <key>` (or `Bearer <key>`). A request
//! without a recognised scheme is unauthenticated; a recognised scheme with
//! an unknown or malformed key is an invalid token. Both are 401s.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use super::AppState;
use crate::error::{ApiError, ApiResult};

/// Credential found in the `Authorization` header.
#[derive(Debug, PartialEq, Eq)]
enum Credential<'a> {
    Missing,
    Malformed,
    Key(&'a str),
}

fn parse_authorization(value: &str) -> Credential<'_> {
    let trimmed = value.trim();
    let (scheme, rest) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
    if !scheme.eq_ignore_ascii_case("token") && !scheme.eq_ignore_ascii_case("bearer") {
        return Credential::Missing;
    }
    let key = rest.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Credential::Malformed;
    }
    Credential::Key(key)
}

fn credential(headers: &HeaderMap) -> Credential<'_> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(parse_authorization)
        .unwrap_or(Credential::Missing)
}

/// Reject requests without a valid token; otherwise attach the
/// [`Principal`](crate::types::Principal) to the request extensions.
pub async fn require_token(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let key = match credential(req.headers()) {
        Credential::Missing => return Err(ApiError::NotAuthenticated),
        Credential::Malformed => return Err(ApiError::InvalidToken),
        Credential::Key(key) => key.to_string(),
    };

    let Some(principal) = state.db.authenticate(&key)? else {
        warn!(method = %req.method(), path = %req.uri().path(), "Unknown API token");
        return Err(ApiError::InvalidToken);
    };

    debug!(user = %principal.username, "Authenticated request");
    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
