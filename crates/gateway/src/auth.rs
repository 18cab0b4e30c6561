use crate::{GatewayError, GatewayState};
use axum::http::HeaderMap;
use objs::{ApiKeyClaims, GatewayClaims, IdpClaims, API_KEY_PREFIX};
use services::RevocationCache;

/// Authenticates the incoming request and produces the claims for a fresh
/// gateway token: `user_id` for API keys, `external_id` (+email) for IdP
/// JWTs.
pub async fn authenticate(
  state: &GatewayState,
  headers: &HeaderMap,
) -> Result<GatewayClaims, GatewayError> {
  let bearer = headers
    .get(axum::http::header::AUTHORIZATION)
    .ok_or(GatewayError::MissingCredentials)?
    .to_str()
    .map_err(|_| GatewayError::InvalidCredentials("header is not valid utf-8".to_string()))?
    .strip_prefix("Bearer ")
    .ok_or_else(|| {
      GatewayError::InvalidCredentials("authorization header is malformed".to_string())
    })?
    .trim();
  if bearer.is_empty() {
    return Err(GatewayError::MissingCredentials);
  }

  let now = state.time_service.utc_now();
  if let Some(jwt) = bearer.strip_prefix(API_KEY_PREFIX) {
    let claims = verify_api_key(state, jwt).await?;
    Ok(GatewayClaims::for_user_id(claims.sub, now))
  } else {
    let claims = verify_idp_jwt(state, bearer).await?;
    Ok(GatewayClaims::for_external_id(claims.sub, claims.email, now))
  }
}

/// API-key path: signature via the local JWKS, then a revocation check
/// against the api_keys table; a positive check is remembered by the
/// revocation cache for its TTL.
async fn verify_api_key(
  state: &GatewayState,
  jwt: &str,
) -> Result<ApiKeyClaims, GatewayError> {
  let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::EdDSA);
  validation.validate_aud = false;
  // keys without an expiry are legal; expiring ones are still checked
  validation.required_spec_claims.clear();
  let claims: ApiKeyClaims = state
    .key_service
    .verify(jwt, &validation)
    .map_err(|e| GatewayError::InvalidCredentials(e.to_string()))?;

  if !state.revocation_cache.is_valid(&claims.kid) {
    use services::db::ApiKeyRepository;
    let row = state
      .db_service
      .get_api_key_by_id(&claims.kid)
      .await
      .map_err(|e| GatewayError::Internal(e.to_string()))?
      .ok_or(GatewayError::KeyRevoked)?;
    let now = state.time_service.utc_now();
    if row.expires_at.is_some_and(|at| at <= now) {
      return Err(GatewayError::KeyExpired);
    }
    state.revocation_cache.mark_valid(&claims.kid);

    // last_used_at is best effort, off the request path
    let db_service = state.db_service.clone();
    let key_id = claims.kid.clone();
    tokio::spawn(async move {
      if let Err(err) = db_service.touch_api_key_last_used(&key_id, now).await {
        tracing::debug!(error = %err, "failed to update api key last_used_at");
      }
    });
  }
  Ok(claims)
}

/// IdP path: resolve the decoding key by `kid` from the cached IdP JWKS and
/// enforce the configured issuer.
async fn verify_idp_jwt(state: &GatewayState, jwt: &str) -> Result<IdpClaims, GatewayError> {
  let header = jsonwebtoken::decode_header(jwt)
    .map_err(|e| GatewayError::InvalidCredentials(e.to_string()))?;
  let kid = header
    .kid
    .ok_or_else(|| GatewayError::InvalidCredentials("token header has no kid".to_string()))?;
  let (key, alg) = state
    .idp_jwks
    .decoding_key(&kid)
    .await
    .map_err(|e| GatewayError::InvalidCredentials(e.to_string()))?;

  let mut validation = jsonwebtoken::Validation::new(alg);
  validation.validate_aud = false;
  validation.set_issuer(&[state.setting_service.idp_issuer()]);
  let claims = jsonwebtoken::decode::<IdpClaims>(jwt, &key, &validation)
    .map_err(|e| GatewayError::InvalidCredentials(e.to_string()))?
    .claims;
  Ok(claims)
}

/// Mints the 30-second gateway token carried on the second hop.
pub fn mint_gateway_token(
  state: &GatewayState,
  claims: &GatewayClaims,
) -> Result<String, GatewayError> {
  state
    .key_service
    .sign(claims)
    .map_err(|e| GatewayError::Internal(e.to_string()))
}
