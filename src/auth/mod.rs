use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};


/// Role carried by a verified token.
///
/// Closed set, matched exhaustively — a new role is a compile error at every
/// branch point, never a silent fall-through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "MASTER")]
    Master,
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "AGENT")]
    Agent,
}

/// JWT claims expected in agent/dashboard bearer tokens.
///
/// Token issuance lives in the admin subsystem; this service only verifies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the agent (or admin) id
    pub sub: String,
    pub role: Role,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(rename = "firstName", default)]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", default)]
    pub last_name: Option<String>,
    /// Expiry, seconds since Unix epoch
    pub exp: i64,
}

/// Identity derived from a verified token at handshake time.
#[derive(Clone, Debug, PartialEq)]
pub struct Identity {
    pub agent_id: String,
    pub role: Role,
    pub mobile: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            agent_id: claims.sub,
            role: claims.role,
            mobile: claims.mobile,
            first_name: claims.first_name,
            last_name: claims.last_name,
        }
    }
}

/// Token verification collaborator.
///
/// The gateway resolves every connection's identity through this trait; no
/// handler ever trusts client-asserted identity fields.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, VerifyError>;
}

/// HS256 JWT verifier (signature + expiry).
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| VerifyError::InvalidToken(e.to_string()))?;
        Ok(Identity::from(data.claims))
    }
}

/// Token verification errors
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyError {
    /// Bad signature, malformed token, or expired
    InvalidToken(String),
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::InvalidToken(msg) => write!(f, "invalid token: {}", msg),
        }
    }
}

impl std::error::Error for VerifyError {}

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// Returns the token string if present and valid.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Parse bearer token from Authorization header value
fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    if parts[0].to_lowercase() != "bearer" {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();

    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// Authorization header not present
    Missing,
    /// Invalid format (not "Bearer <token>")
    InvalidFormat,
    /// Token is empty string
    Empty,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Authorization token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for TokenError {}
