//! Request authentication for control-plane routes.
//!
//! Providers inspect request headers and either yield an [`AuthContext`] or an
//! [`AuthError`]. [`RequireAuth`] wraps a route handler so the handler only runs
//! for authenticated requests; everything else is answered with `401`.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION, WWW_AUTHENTICATE};
use http::HeaderMap;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::http::{Captures, HandlerError, HttpRequest, HttpResponse, RequestFailure, RouteHandler};

/// Header carrying the broker shared secret.
pub const SERVICE_TOKEN_HEADER: &str = "x-vcap-service-token";

/// Identity established by a provider. Inserted into request extensions for
/// the wrapped handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthContext {
    /// Authenticated principal (user name or service).
    pub principal: String,
    /// Name of the provider that authenticated the request.
    pub provider: &'static str,
}

/// Why a request was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    /// Credentials missing or malformed.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Credentials present but wrong.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

/// Pluggable header-based authentication.
pub trait AuthProvider: Send + Sync {
    /// Unique name of this provider.
    fn name(&self) -> &'static str;

    /// Verify the request's credentials.
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError>;

    /// `WWW-Authenticate` value sent with a `401`, if any.
    fn challenge(&self) -> Option<HeaderValue> {
        None
    }
}

/// Compare secrets without short-circuiting on the first differing byte.
pub(crate) fn secrets_match(given: &[u8], expected: &[u8]) -> bool {
    bool::from(given.ct_eq(expected))
}

/// HTTP Basic authentication against one fixed credential pair.
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password: String,
    realm: String,
}

impl BasicAuth {
    /// Accept only `username`/`password`; challenge with `realm`.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        Self { username: username.into(), password: password.into(), realm: realm.into() }
    }

    /// Realm named in the `WWW-Authenticate` challenge.
    pub fn realm(&self) -> &str {
        &self.realm
    }

    fn credentials(headers: &HeaderMap) -> Result<(String, String), AuthError> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AuthError::Unauthenticated("missing authorization header".into()))?;
        let value = value
            .to_str()
            .map_err(|_| AuthError::Unauthenticated("non-ascii authorization header".into()))?;
        let (scheme, encoded) = value
            .trim()
            .split_once(' ')
            .ok_or_else(|| AuthError::Unauthenticated("malformed authorization header".into()))?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(AuthError::Unauthenticated(format!("unsupported scheme {scheme}")));
        }
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::Unauthenticated("invalid base64 credentials".into()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| AuthError::Unauthenticated("credentials are not utf-8".into()))?;
        let (user, pass) = decoded
            .split_once(':')
            .ok_or_else(|| AuthError::Unauthenticated("credentials missing ':'".into()))?;
        Ok((user.to_string(), pass.to_string()))
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("realm", &self.realm)
            .finish_non_exhaustive()
    }
}

impl AuthProvider for BasicAuth {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let (user, pass) = Self::credentials(headers)?;
        // Evaluate both comparisons so timing does not reveal which one failed.
        let user_ok = user.as_bytes().ct_eq(self.username.as_bytes());
        let pass_ok = pass.as_bytes().ct_eq(self.password.as_bytes());
        if bool::from(user_ok & pass_ok) {
            Ok(AuthContext { principal: user, provider: self.name() })
        } else {
            Err(AuthError::Unauthorized("credential mismatch".into()))
        }
    }

    fn challenge(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&format!("Basic realm=\"{}\"", self.realm)).ok()
    }
}

/// Shared-secret header check used by the broker routes.
#[derive(Clone)]
pub struct ServiceTokenAuth {
    header: HeaderName,
    token: String,
}

impl ServiceTokenAuth {
    /// Expect `token` in the `X-VCAP-Service-Token` header.
    pub fn new(token: impl Into<String>) -> Self {
        Self { header: HeaderName::from_static(SERVICE_TOKEN_HEADER), token: token.into() }
    }
}

impl std::fmt::Debug for ServiceTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTokenAuth").field("header", &self.header).finish_non_exhaustive()
    }
}

impl AuthProvider for ServiceTokenAuth {
    fn name(&self) -> &'static str {
        "service-token"
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let given = headers
            .get(&self.header)
            .ok_or_else(|| AuthError::Unauthenticated("missing service token".into()))?;
        if secrets_match(given.as_bytes(), self.token.as_bytes()) {
            Ok(AuthContext { principal: "service-broker".into(), provider: self.name() })
        } else {
            Err(AuthError::Unauthorized("service token mismatch".into()))
        }
    }
}

/// Route handler that authenticates before delegating to `inner`.
#[derive(Clone)]
pub struct RequireAuth<H> {
    provider: Arc<dyn AuthProvider>,
    inner: H,
}

impl<H> RequireAuth<H> {
    /// Guard `inner` with `provider`.
    pub fn new(provider: Arc<dyn AuthProvider>, inner: H) -> Self {
        Self { provider, inner }
    }
}

#[async_trait]
impl<H: RouteHandler> RouteHandler for RequireAuth<H> {
    async fn handle(
        &self,
        mut request: HttpRequest,
        captures: Captures,
    ) -> Result<HttpResponse, HandlerError> {
        match self.provider.authenticate(request.headers()) {
            Ok(ctx) => {
                request.extensions_mut().insert(ctx);
                self.inner.handle(request, captures).await
            }
            Err(e) => {
                debug!(target: "switchboard::http", provider = self.provider.name(), path = %request.uri().path(), reason = %e, "rejected request");
                let mut failure = RequestFailure::unauthorized();
                if let Some(challenge) = self.provider.challenge() {
                    failure = failure.with_header(WWW_AUTHENTICATE, challenge);
                }
                Err(failure.into())
            }
        }
    }
}
