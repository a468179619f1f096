//! # Bearer Token Authentication
//!
//! Every resource path requires `Authorization: Bearer <key>` (spec §4.1).
//! The middleware extracts the 8-char prefix, loads the candidate key by a
//! single indexed lookup, then verifies the full key against `key_hash`.
//! `last_used` is bumped on a detached task so it never blocks the
//! response, per §4.1's "must not block the response".

use crate::error::ApiError;
use crate::store::api_keys::{parse_scope, verify_api_key};
use crate::store::Store;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use cilo_protocol::control::Scope;
use uuid::Uuid;

const KEY_PREFIX: &str = "cilo_";
const PREFIX_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub team_id: Uuid,
    pub key_id: Uuid,
    pub scope: Scope,
}

fn extract_prefix(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let rest = value.strip_prefix("Bearer ")?;
    if rest.is_empty() {
        return None;
    }
    let body = rest.strip_prefix(KEY_PREFIX)?;
    if body.len() < PREFIX_LEN {
        return None;
    }
    Some(body[..PREFIX_LEN].to_string())
}

/// Authenticates the request and stamps [`AuthContext`] into its
/// extensions. Every failure mode — absent header, `Token xyz`, bare
/// `Bearer`, `Bearer ` with a trailing space, or an unrecognized prefix —
/// falls through to the same generic 401 (spec §4.1, §8's auth matrix).
pub async fn require_auth(
    State(store): State<Store>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(prefix) = extract_prefix(request.headers()) else {
        return Err(ApiError::Unauthenticated);
    };

    let full_key = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();

    let Some(row) = store
        .find_api_key_by_prefix(&prefix)
        .await
        .map_err(ApiError::Database)?
    else {
        return Err(ApiError::Unauthenticated);
    };

    if !verify_api_key(&full_key, &row.key_hash) {
        return Err(ApiError::Unauthenticated);
    }

    let Some(scope) = parse_scope(&row.scope) else {
        return Err(ApiError::Unauthenticated);
    };

    let ctx = AuthContext {
        team_id: row.team_id,
        key_id: row.id,
        scope,
    };
    request.extensions_mut().insert(ctx);

    let key_id = row.id;
    tokio::spawn(async move {
        if let Err(err) = store.touch_last_used(key_id).await {
            tracing::warn!(error = %err, "failed to update api key last_used");
        }
    });

    Ok(next.run(request).await)
}

/// Checked by individual handlers after `require_auth` has run, to enforce
/// the per-route scope from the routing table in spec §4.1.
pub fn require_scope(ctx: &AuthContext, required: Scope) -> Result<(), ApiError> {
    if ctx.scope.satisfies(required) {
        Ok(())
    } else {
        Err(ApiError::Forbidden {
            required: match required {
                Scope::Read => "read",
                Scope::Write => "write",
                Scope::Admin => "admin",
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(auth: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(auth).unwrap(),
        );
        h
    }

    #[test]
    fn auth_matrix_matches_spec_scenarios() {
        assert!(extract_prefix(&HeaderMap::new()).is_none());
        assert!(extract_prefix(&headers_with("Token xyz")).is_none());
        assert!(extract_prefix(&headers_with("Bearer")).is_none());
        assert!(extract_prefix(&headers_with("Bearer ")).is_none());
        assert!(extract_prefix(&headers_with("Bearer cilo_short")).is_none());
        assert!(extract_prefix(&headers_with("Bearer cilo_abcdefgh12345678")).is_some());
    }
}
