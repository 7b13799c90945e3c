//! Bearer authentication and owner resolution.
//!
//! Every protected request must carry `Authorization: Bearer <token>`. The
//! token resolves to an owner id, which handlers receive as an [`Owner`]
//! request extension. Two modes:
//! - **static**: `token=owner` pairs read **once at startup** from the env
//!   var named by `auth.tokens_env`. Only SHA-256 digests are kept and they
//!   are compared in constant time.
//! - **remote**: the token is forwarded to the hosted auth provider's user
//!   endpoint, which answers with the owner's `id`.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hb_domain::config::{AuthConfig, AuthMode};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// The authenticated owner, inserted by [`require_owner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

pub enum Authenticator {
    Static {
        /// (sha256(token), owner id)
        tokens: Vec<([u8; 32], String)>,
    },
    Remote {
        client: reqwest::Client,
        user_url: String,
    },
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

impl Authenticator {
    pub fn from_config(cfg: &AuthConfig) -> anyhow::Result<Self> {
        match cfg.mode {
            AuthMode::Static => {
                let raw = std::env::var(&cfg.tokens_env).unwrap_or_default();
                let auth = Self::from_pairs(&raw);
                match &auth {
                    Authenticator::Static { tokens } if tokens.is_empty() => tracing::warn!(
                        env = %cfg.tokens_env,
                        "no API tokens configured; every protected request will be rejected"
                    ),
                    Authenticator::Static { tokens } => {
                        tracing::info!(tokens = tokens.len(), "static bearer-token auth enabled")
                    }
                    Authenticator::Remote { .. } => {}
                }
                Ok(auth)
            }
            AuthMode::Remote => {
                let client = reqwest::Client::builder()
                    .timeout(std::time::Duration::from_secs(10))
                    .build()?;
                tracing::info!(user_url = %cfg.user_url, "remote bearer-token auth enabled");
                Ok(Authenticator::Remote {
                    client,
                    user_url: cfg.user_url.clone(),
                })
            }
        }
    }

    /// Parse `token=owner,token2=owner2`. Malformed entries are skipped.
    pub fn from_pairs(raw: &str) -> Self {
        let tokens = raw
            .split(',')
            .filter_map(|pair| {
                let (token, owner) = pair.split_once('=')?;
                let (token, owner) = (token.trim(), owner.trim());
                if token.is_empty() || owner.is_empty() {
                    return None;
                }
                Some((digest(token), owner.to_string()))
            })
            .collect();
        Authenticator::Static { tokens }
    }

    pub fn static_tokens<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Authenticator::Static {
            tokens: pairs
                .into_iter()
                .map(|(t, o)| (digest(t), o.to_string()))
                .collect(),
        }
    }

    /// The owner behind `token`, if any.
    pub async fn resolve(&self, token: &str) -> Option<String> {
        if token.is_empty() {
            return None;
        }
        match self {
            Authenticator::Static { tokens } => {
                let provided = digest(token);
                // Visit every entry so timing does not depend on position.
                let mut found = None;
                for (expected, owner) in tokens {
                    if bool::from(provided.ct_eq(expected)) {
                        found = Some(owner.clone());
                    }
                }
                found
            }
            Authenticator::Remote { client, user_url } => {
                let resp = match client.get(user_url).bearer_auth(token).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, "auth provider unreachable");
                        return None;
                    }
                };
                if !resp.status().is_success() {
                    return None;
                }
                let body: serde_json::Value = resp.json().await.ok()?;
                body.get("id")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            }
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

/// Axum middleware that enforces bearer-token authentication on protected
/// routes. Attach via `axum::middleware::from_fn_with_state`.
pub async fn require_owner(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");

    let Some(owner) = state.auth.resolve(provided).await else {
        return unauthorized();
    };
    req.extensions_mut().insert(Owner(owner));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_pairs_resolve_to_owners() {
        let auth = Authenticator::from_pairs("tok-a=owner-a, tok-b = owner-b,broken,=x");
        assert_eq!(auth.resolve("tok-a").await.as_deref(), Some("owner-a"));
        assert_eq!(auth.resolve("tok-b").await.as_deref(), Some("owner-b"));
        assert!(auth.resolve("tok-c").await.is_none());
        assert!(auth.resolve("").await.is_none());
        match auth {
            Authenticator::Static { tokens } => assert_eq!(tokens.len(), 2),
            Authenticator::Remote { .. } => panic!("expected static"),
        }
    }
}
