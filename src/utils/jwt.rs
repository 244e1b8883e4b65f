//! JWT access and refresh tokens

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::time::current_time;

/// Default access token lifetime
pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 30;
/// Default refresh token lifetime (7 days)
pub const DEFAULT_REFRESH_TOKEN_MINUTES: i64 = 60 * 24 * 7;

/// JWT error
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Token has expired")]
    ExpiredToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("The data must contain the '{0}' field")]
    MissingSubject(String),
    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

/// Supported signing algorithms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum JwtAlgorithm {
    #[default]
    #[serde(rename = "HS256", alias = "hs256")]
    Hs256,
}

impl JwtAlgorithm {
    pub fn choices() -> [JwtAlgorithm; 1] {
        [Self::Hs256]
    }

    pub fn is_valid(value: &str) -> bool {
        value.parse::<Self>().is_ok()
    }

    fn as_jsonwebtoken(&self) -> Algorithm {
        match self {
            Self::Hs256 => Algorithm::HS256,
        }
    }
}

impl FromStr for JwtAlgorithm {
    type Err = JwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HS256" => Ok(Self::Hs256),
            _ => Err(JwtError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for JwtAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hs256 => write!(f, "HS256"),
        }
    }
}

/// Token variant, determines the lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Decoded token payload. Claims other than `sub`, `iat` and `exp` are kept
/// in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenPayload {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Claim selection when building a token
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter<'a> {
    /// Include only these fields
    pub include: Option<&'a [&'a str]>,
    /// Exclude these fields (ignored when `include` is set)
    pub exclude: Option<&'a [&'a str]>,
}

impl<'a> ClaimFilter<'a> {
    pub fn include(fields: &'a [&'a str]) -> Self {
        Self { include: Some(fields), exclude: None }
    }

    pub fn exclude(fields: &'a [&'a str]) -> Self {
        Self { include: None, exclude: Some(fields) }
    }

    fn apply(&self, data: &Map<String, Value>) -> Map<String, Value> {
        if let Some(include) = self.include {
            data.iter()
                .filter(|(k, _)| include.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else if let Some(exclude) = self.exclude {
            data.iter()
                .filter(|(k, _)| !exclude.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            data.clone()
        }
    }
}

/// Issues and verifies signed tokens
#[derive(Clone)]
pub struct JwtHandler {
    algorithm: JwtAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expire_minutes: i64,
    refresh_token_expire_minutes: i64,
}

impl fmt::Debug for JwtHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtHandler")
            .field("algorithm", &self.algorithm)
            .field("access_token_expire_minutes", &self.access_token_expire_minutes)
            .field("refresh_token_expire_minutes", &self.refresh_token_expire_minutes)
            .finish_non_exhaustive()
    }
}

impl JwtHandler {
    /// Create a handler with the default lifetimes
    pub fn new(secret: &str, algorithm: JwtAlgorithm) -> Self {
        Self::with_lifetimes(
            secret,
            algorithm,
            DEFAULT_ACCESS_TOKEN_MINUTES,
            DEFAULT_REFRESH_TOKEN_MINUTES,
        )
    }

    /// Create a handler with explicit lifetimes in minutes
    pub fn with_lifetimes(
        secret: &str,
        algorithm: JwtAlgorithm,
        access_token_expire_minutes: i64,
        refresh_token_expire_minutes: i64,
    ) -> Self {
        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expire_minutes,
            refresh_token_expire_minutes,
        }
    }

    /// Create a handler from an algorithm name
    pub fn from_algorithm_name(secret: &str, algorithm: &str) -> Result<Self, JwtError> {
        Ok(Self::new(secret, algorithm.parse()?))
    }

    pub fn algorithm(&self) -> JwtAlgorithm {
        self.algorithm
    }

    fn encode(&self, mut claims: Map<String, Value>, delta_minutes: i64) -> Result<String, JwtError> {
        if !claims.contains_key("sub") {
            return Err(JwtError::MissingSubject("sub".to_string()));
        }

        let now = current_time();
        let exp = now + Duration::minutes(delta_minutes);
        claims.insert("iat".to_string(), Value::from(now.timestamp()));
        claims.insert("exp".to_string(), Value::from(exp.timestamp()));

        jsonwebtoken::encode(
            &Header::new(self.algorithm.as_jsonwebtoken()),
            &claims,
            &self.encoding_key,
        )
        .map_err(|e| JwtError::Encoding(e.to_string()))
    }

    /// Create a token of the given kind.
    ///
    /// When the filtered claims carry no `sub`, it is taken from
    /// `sub_field` of the original data.
    pub fn create_token(
        &self,
        data: &Map<String, Value>,
        kind: TokenKind,
        sub_field: &str,
        filter: ClaimFilter<'_>,
    ) -> Result<String, JwtError> {
        let mut claims = filter.apply(data);

        if !claims.contains_key("sub") {
            let subject = data
                .get(sub_field)
                .ok_or_else(|| JwtError::MissingSubject(sub_field.to_string()))?;
            let subject = match subject {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            claims.insert("sub".to_string(), Value::String(subject));
        }

        let minutes = match kind {
            TokenKind::Access => self.access_token_expire_minutes,
            TokenKind::Refresh => self.refresh_token_expire_minutes,
        };

        self.encode(claims, minutes)
    }

    /// Create an access token
    pub fn create_access_token(
        &self,
        data: &Map<String, Value>,
        sub_field: &str,
        filter: ClaimFilter<'_>,
    ) -> Result<String, JwtError> {
        self.create_token(data, TokenKind::Access, sub_field, filter)
    }

    /// Create a refresh token
    pub fn create_refresh_token(
        &self,
        data: &Map<String, Value>,
        sub_field: &str,
        filter: ClaimFilter<'_>,
    ) -> Result<String, JwtError> {
        self.create_token(data, TokenKind::Refresh, sub_field, filter)
    }

    /// Verify a token and return its payload
    pub fn decode_token(&self, token: &str) -> Result<TokenPayload, JwtError> {
        let mut validation = Validation::new(self.algorithm.as_jsonwebtoken());
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        let data = jsonwebtoken::decode::<TokenPayload>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
                _ => {
                    tracing::debug!("Rejected token: {}", e);
                    JwtError::InvalidToken
                }
            })?;

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> Map<String, Value> {
        json!({"id": "user-1", "email": "a@example.com", "role": "admin"})
            .as_object()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_access_token_round_trip() {
        let handler = JwtHandler::new("secret", JwtAlgorithm::Hs256);
        let token = handler.create_access_token(&user(), "id", ClaimFilter::default()).unwrap();

        let payload = handler.decode_token(&token).unwrap();
        assert_eq!(payload.sub, "user-1");
        assert_eq!(payload.exp - payload.iat, 30 * 60);
        assert_eq!(payload.extra.get("email"), Some(&json!("a@example.com")));
    }

    #[test]
    fn test_refresh_token_lifetime() {
        let handler = JwtHandler::new("secret", JwtAlgorithm::Hs256);
        let token = handler.create_refresh_token(&user(), "id", ClaimFilter::default()).unwrap();

        let payload = handler.decode_token(&token).unwrap();
        assert_eq!(payload.exp - payload.iat, DEFAULT_REFRESH_TOKEN_MINUTES * 60);
    }

    #[test]
    fn test_claim_filters() {
        let handler = JwtHandler::new("secret", JwtAlgorithm::Hs256);

        let token = handler
            .create_access_token(&user(), "id", ClaimFilter::include(&["email"]))
            .unwrap();
        let payload = handler.decode_token(&token).unwrap();
        assert_eq!(payload.sub, "user-1");
        assert!(payload.extra.contains_key("email"));
        assert!(!payload.extra.contains_key("role"));
        assert!(!payload.extra.contains_key("id"));

        let token = handler
            .create_access_token(&user(), "id", ClaimFilter::exclude(&["role"]))
            .unwrap();
        let payload = handler.decode_token(&token).unwrap();
        assert!(payload.extra.contains_key("id"));
        assert!(!payload.extra.contains_key("role"));
    }

    #[test]
    fn test_numeric_subject() {
        let handler = JwtHandler::new("secret", JwtAlgorithm::Hs256);
        let data = json!({"pk": 42}).as_object().unwrap().clone();

        let token = handler.create_access_token(&data, "pk", ClaimFilter::default()).unwrap();
        assert_eq!(handler.decode_token(&token).unwrap().sub, "42");
    }

    #[test]
    fn test_missing_subject() {
        let handler = JwtHandler::new("secret", JwtAlgorithm::Hs256);
        let data = json!({"email": "x"}).as_object().unwrap().clone();

        let result = handler.create_access_token(&data, "id", ClaimFilter::default());
        assert!(matches!(result, Err(JwtError::MissingSubject(field)) if field == "id"));
    }

    #[test]
    fn test_expired_token() {
        let handler = JwtHandler::with_lifetimes("secret", JwtAlgorithm::Hs256, -5, -5);
        let token = handler.create_access_token(&user(), "id", ClaimFilter::default()).unwrap();

        assert!(matches!(handler.decode_token(&token), Err(JwtError::ExpiredToken)));
    }

    #[test]
    fn test_invalid_tokens() {
        let handler = JwtHandler::new("secret", JwtAlgorithm::Hs256);
        let other = JwtHandler::new("other-secret", JwtAlgorithm::Hs256);
        let token = other.create_access_token(&user(), "id", ClaimFilter::default()).unwrap();

        assert!(matches!(handler.decode_token(&token), Err(JwtError::InvalidToken)));
        assert!(matches!(handler.decode_token("not.a.token"), Err(JwtError::InvalidToken)));
    }

    #[test]
    fn test_algorithm_parsing() {
        assert!(JwtAlgorithm::is_valid("HS256"));
        assert!(JwtAlgorithm::is_valid("hs256"));
        assert!(!JwtAlgorithm::is_valid("RS256"));
        assert!(matches!(
            JwtHandler::from_algorithm_name("secret", "none"),
            Err(JwtError::UnsupportedAlgorithm(_))
        ));
    }
}
