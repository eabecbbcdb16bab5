use std::str::FromStr;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use custody_types::{PartyDirectory, PartyId, Role};

use crate::error::{ServerError, ServerResult};
use crate::router::AppState;

pub const PARTY_HEADER: &str = "x-custody-party";
pub const ROLE_HEADER: &str = "x-custody-role";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// The party a request acts as.
///
/// Headers identify the caller; they do not authenticate it. Deployments
/// put an authenticating proxy in front of the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub party: PartyId,
    /// Role the party is registered under, if any.
    pub role: Option<Role>,
}

impl Caller {
    /// Resolve the caller from request headers. An explicit party wins over
    /// a role.
    pub fn from_headers(headers: &HeaderMap, parties: &PartyDirectory) -> ServerResult<Self> {
        if let Some(party) = header_str(headers, PARTY_HEADER)? {
            let party = PartyId::new(party);
            let role = parties.role_of(&party);
            return Ok(Self { party, role });
        }
        if let Some(role) = header_str(headers, ROLE_HEADER)? {
            let role = Role::from_str(role).map_err(|e| ServerError::BadRequest(e.to_string()))?;
            let party = parties
                .resolve(role)
                .cloned()
                .ok_or_else(|| ServerError::UnmappedRole(role.to_string()))?;
            return Ok(Self {
                party,
                role: Some(role),
            });
        }
        Err(ServerError::MissingIdentity)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Caller::from_headers(&parts.headers, state.parties())
    }
}

/// Resolve a transfer target given either a role name or a party id.
pub fn resolve_party(value: &str, parties: &PartyDirectory) -> ServerResult<PartyId> {
    let value = value.trim();
    match Role::from_str(value) {
        Ok(role) => parties
            .resolve(role)
            .cloned()
            .ok_or_else(|| ServerError::UnmappedRole(role.to_string())),
        Err(_) => Ok(PartyId::new(value)),
    }
}

/// Non-blank header value, trimmed.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> ServerResult<Option<&'a str>> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| ServerError::BadRequest(format!("{name} header is not valid text")))?
                .trim();
            Ok((!value.is_empty()).then_some(value))
        }
    }
}
