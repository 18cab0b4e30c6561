use axum::{
  extract::{Request, State},
  middleware::Next,
  response::Response,
};
use objs::{
  AccountStatus, ApiError, AppError, AuthzError, ErrorType, GatewayClaims, GATEWAY_TOKEN_ISSUER,
};
use server_core::RouterState;
use services::{generate_request_id, AppService, KeyServiceError, UserServiceError};
use std::sync::Arc;

pub const HEADER_GATEWAY_TOKEN: &str = "X-Gateway-Token";
pub const HEADER_REQUEST_ID: &str = "X-Request-ID";

/// Clock skew tolerated when validating gateway-token timestamps.
const GATEWAY_TOKEN_LEEWAY_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
  #[error("gateway token header is missing")]
  MissingGatewayToken,
  #[error("gateway token is invalid")]
  InvalidGatewayToken(String),
  #[error(transparent)]
  Authz(#[from] AuthzError),
  #[error(transparent)]
  User(#[from] UserServiceError),
}

impl AppError for AuthError {
  fn error_type(&self) -> ErrorType {
    match self {
      AuthError::MissingGatewayToken | AuthError::InvalidGatewayToken(_) => {
        ErrorType::Authentication
      }
      AuthError::Authz(e) => e.error_type(),
      AuthError::User(e) => e.error_type(),
    }
  }

  fn code(&self) -> String {
    match self {
      AuthError::MissingGatewayToken => "MISSING_GATEWAY_TOKEN".to_string(),
      AuthError::InvalidGatewayToken(_) => "INVALID_GATEWAY_TOKEN".to_string(),
      AuthError::Authz(e) => e.code(),
      AuthError::User(e) => e.code(),
    }
  }
}

impl From<KeyServiceError> for AuthError {
  fn from(value: KeyServiceError) -> Self {
    AuthError::InvalidGatewayToken(value.to_string())
  }
}

/// Authorizer middleware in front of every protocol-server route. The gateway
/// token is the only accepted identity; `Authorization` headers never reach
/// this process in production configuration.
pub async fn authz_middleware(
  State(state): State<Arc<dyn RouterState>>,
  mut req: Request,
  next: Next,
) -> Result<Response, ApiError> {
  let app_service = state.app_service();

  let token = req
    .headers()
    .get(HEADER_GATEWAY_TOKEN)
    .ok_or(AuthError::MissingGatewayToken)?
    .to_str()
    .map_err(|_| AuthError::InvalidGatewayToken("header is not valid utf-8".to_string()))?
    .trim()
    .to_string();

  let claims = match verify_gateway_token(&state, &token).await {
    Ok(claims) => claims,
    Err(err) => {
      tracing::warn!(
        security_event = true,
        error = %err,
        "gateway token verification failed"
      );
      return Err(AuthError::InvalidGatewayToken(err.to_string()).into());
    }
  };

  let request_id = req
    .headers()
    .get(HEADER_REQUEST_ID)
    .and_then(|v| v.to_str().ok())
    .map(ToString::to_string)
    .unwrap_or_else(generate_request_id);

  let user_service = app_service.user_service();
  let user_id = user_service
    .resolve_user_id(&claims)
    .await
    .map_err(AuthError::from)?;
  let ctx = user_service
    .load_user_context(&user_id, &request_id)
    .await
    .map_err(AuthError::from)?;

  if ctx.account_status != AccountStatus::Active {
    return Err(AuthError::from(AuthzError::AccountNotActive(ctx.account_status)).into());
  }

  req.extensions_mut().insert(ctx);
  Ok(next.run(req).await)
}

async fn verify_gateway_token(
  state: &Arc<dyn RouterState>,
  token: &str,
) -> Result<GatewayClaims, AuthError> {
  let header = jsonwebtoken::decode_header(token)
    .map_err(|e| AuthError::InvalidGatewayToken(e.to_string()))?;
  let kid = header
    .kid
    .ok_or_else(|| AuthError::InvalidGatewayToken("token header has no kid".to_string()))?;

  let (key, alg) = state.app_service().gateway_jwks().decoding_key(&kid).await?;
  let mut validation = jsonwebtoken::Validation::new(alg);
  validation.leeway = GATEWAY_TOKEN_LEEWAY_SECS;
  validation.validate_aud = false;
  validation.set_issuer(&[GATEWAY_TOKEN_ISSUER]);
  validation.set_required_spec_claims(&["exp", "iss"]);

  let claims = jsonwebtoken::decode::<GatewayClaims>(token, &key, &validation)
    .map_err(|e| AuthError::InvalidGatewayToken(e.to_string()))?
    .claims;
  Ok(claims)
}
