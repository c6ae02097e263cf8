//! # Authentication Gates
//!
//! Pre-auth hooks. [`BearerAuth`] verifies an HS256 JWT from the
//! `Authorization` header and stores its claims on the request;
//! [`RoleGate`] then checks those claims for required roles.

use crate::error::{DispatchError, HandlerError};
use crate::hooks::{Flow, Hook};
use crate::request::Request;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Default message for missing or invalid credentials
pub const LOGIN_REQUIRED: &str = "Login required";
/// Default message for insufficient roles
pub const MISSING_ROLES: &str = "Missing user role(s)";

/// Bearer token gate
pub struct BearerAuth {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
    message: String,
}

impl BearerAuth {
    /// Gate verifying HS256 tokens signed with `secret`
    #[must_use]
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            message: LOGIN_REQUIRED.to_string(),
        }
    }

    /// Override the 401 message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Clock skew tolerated when checking `exp`, in seconds
    #[must_use]
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.validation.leeway = seconds;
        self
    }

    /// Sign `claims` with an `exp` of now + `ttl`.
    ///
    /// # Errors
    ///
    /// Unexpected handler error when `claims` is not an object or signing fails.
    pub fn issue(&self, mut claims: Value, ttl: Duration) -> Result<String, HandlerError> {
        let object = claims
            .as_object_mut()
            .ok_or_else(|| HandlerError::unexpected(anyhow::anyhow!("token claims must be an object")))?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(HandlerError::unexpected)?;
        object.insert("exp".to_string(), Value::from((now + ttl).as_secs()));

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(HandlerError::unexpected)
    }

    /// Verify a raw token and return its claims
    fn verify(&self, token: &str) -> Option<Value> {
        match jsonwebtoken::decode::<Value>(token, &self.decoding, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!(error = %e, "Rejected bearer token");
                None
            }
        }
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Token from an `Authorization: Bearer <token>` header
fn bearer_token(req: &Request) -> Option<&str> {
    let (scheme, token) = req.header("authorization")?.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl Hook for BearerAuth {
    async fn before(&self, req: &mut Request) -> Result<Flow, DispatchError> {
        let claims = bearer_token(req)
            .and_then(|token| self.verify(token))
            .ok_or_else(|| DispatchError::unauthorized(self.message.clone()))?;
        req.set_claims(claims);
        Ok(Flow::Continue)
    }

    fn name(&self) -> &str {
        "bearer_auth"
    }
}

/// Requires every listed role in a claims field
#[derive(Debug, Clone)]
pub struct RoleGate {
    roles: Vec<String>,
    claim: String,
    message: String,
}

impl RoleGate {
    /// Gate reading roles from the `roles` claim
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            claim: "roles".to_string(),
            message: MISSING_ROLES.to_string(),
        }
    }

    /// Read roles from another claim
    #[must_use]
    pub fn claim(mut self, claim: impl Into<String>) -> Self {
        self.claim = claim.into();
        self
    }

    /// Override the 403 message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    fn satisfied_by(&self, claims: &Value) -> bool {
        let granted: Vec<&str> = match claims.get(&self.claim) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(single)) => vec![single.as_str()],
            _ => Vec::new(),
        };
        self.roles.iter().all(|role| granted.contains(&role.as_str()))
    }
}

#[async_trait]
impl Hook for RoleGate {
    async fn before(&self, req: &mut Request) -> Result<Flow, DispatchError> {
        let Some(claims) = req.claims() else {
            return Err(DispatchError::unauthorized(LOGIN_REQUIRED));
        };
        if self.satisfied_by(claims) {
            return Ok(Flow::Continue);
        }
        Err(DispatchError::Forbidden {
            message: self.message.clone(),
            required: self.roles.clone(),
        })
    }

    fn name(&self) -> &str {
        "role_gate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Method;
    use serde_json::json;

    const SECRET: &[u8] = b"test-secret";

    fn request_with(auth: Option<&str>) -> Request {
        let req = Request::new(Method::Get, "/admin");
        match auth {
            Some(value) => req.with_header("authorization", value),
            None => req,
        }
    }

    #[tokio::test]
    async fn test_valid_token_stores_claims() {
        let gate = BearerAuth::hs256(SECRET);
        let token = gate
            .issue(json!({"sub": "ann", "roles": ["admin"]}), Duration::from_secs(60))
            .unwrap();

        let mut req = request_with(Some(&format!("Bearer {token}")));
        assert!(matches!(gate.before(&mut req).await, Ok(Flow::Continue)));
        assert_eq!(req.claims().unwrap()["sub"], "ann");
    }

    #[tokio::test]
    async fn test_missing_or_bad_token() {
        let gate = BearerAuth::hs256(SECRET);

        for header in [None, Some("Bearer"), Some("Basic abc"), Some("Bearer not.a.jwt")] {
            let mut req = request_with(header);
            let err = gate.before(&mut req).await.unwrap_err();
            assert!(
                matches!(&err, DispatchError::Unauthorized { message } if message == LOGIN_REQUIRED),
                "header {header:?} gave {err:?}"
            );
            assert!(req.claims().is_none());
        }
    }

    #[tokio::test]
    async fn test_token_signed_with_other_secret() {
        let token = BearerAuth::hs256(b"other")
            .issue(json!({"sub": "eve"}), Duration::from_secs(60))
            .unwrap();

        let mut req = request_with(Some(&format!("bearer {token}")));
        let err = BearerAuth::hs256(SECRET).before(&mut req).await.unwrap_err();
        assert!(matches!(err, DispatchError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_role_gate() {
        let gate = RoleGate::new(["admin", "ops"]);

        let mut req = request_with(None);
        req.set_claims(json!({"roles": ["ops", "admin", "dev"]}));
        assert!(matches!(gate.before(&mut req).await, Ok(Flow::Continue)));

        req.set_claims(json!({"roles": ["ops"]}));
        let err = gate.before(&mut req).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Forbidden { ref message, ref required }
                if message == MISSING_ROLES && required == &["admin", "ops"]
        ));
    }

    #[tokio::test]
    async fn test_role_gate_without_claims() {
        let mut req = request_with(None);
        let err = RoleGate::new(["admin"]).before(&mut req).await.unwrap_err();
        assert!(matches!(err, DispatchError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_role_gate_custom_claim() {
        let gate = RoleGate::new(["editor"]).claim("scope");
        let mut req = request_with(None);
        req.set_claims(json!({"scope": "editor"}));
        assert!(gate.before(&mut req).await.is_ok());
    }
}
