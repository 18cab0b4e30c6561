use auth_middleware::RateLimiter;
use modules::ModuleRegistry;
use server_core::{DefaultRouterState, RouterState};
use services::db::{DbPool, DbService, DefaultTimeService, SqliteDbService};
use services::{
  AppService, Cipher, DefaultAppService, DefaultCredentialService, DefaultEnvWrapper,
  DefaultOAuthAppService, DefaultSettingService, DefaultTokenBroker,
  DefaultTokenEndpointResolver, DefaultUsageService, DefaultUserService, JwksClient, KeyService,
  MokaRevocationCache, SettingService,
};
use std::sync::Arc;

/// Builds the full service graph from environment configuration. Fails fast
/// on missing env, bad keys or an unreachable database.
pub async fn build_app_service(
  settings: Arc<dyn SettingService>,
) -> anyhow::Result<Arc<DefaultAppService>> {
  let pool = DbPool::connect(&settings.database_url()).await?;
  let time_service = Arc::new(DefaultTimeService);
  let sqlite = SqliteDbService::new(pool, time_service.clone());
  sqlite.migrate().await?;
  let db_service: Arc<dyn DbService> = Arc::new(sqlite);

  let cipher = Cipher::from_base64(&settings.encryption_key())?;
  let key_service = Arc::new(KeyService::from_seed_base64(&settings.signing_key_seed())?);
  let gateway_jwks = JwksClient::new(settings.gateway_jwks_url());

  let credential_service = Arc::new(DefaultCredentialService::new(
    db_service.clone(),
    cipher.clone(),
  ));
  let token_broker = Arc::new(DefaultTokenBroker::new(
    credential_service.clone(),
    db_service.clone(),
    time_service.clone(),
    Arc::new(DefaultTokenEndpointResolver),
    cipher.clone(),
  ));
  let usage_service = Arc::new(DefaultUsageService::new(
    db_service.clone(),
    time_service.clone(),
  ));
  let user_service = Arc::new(DefaultUserService::new(
    db_service.clone(),
    time_service.clone(),
    settings.console_url(),
  ));
  let oauth_app_service = Arc::new(DefaultOAuthAppService::new(db_service.clone(), cipher));

  Ok(Arc::new(DefaultAppService::new(
    settings,
    db_service,
    time_service,
    credential_service,
    token_broker,
    usage_service,
    user_service,
    Arc::new(MokaRevocationCache::default()),
    oauth_app_service,
    key_service,
    gateway_jwks,
  )))
}

pub async fn serve() -> anyhow::Result<()> {
  let settings: Arc<dyn SettingService> = Arc::new(DefaultSettingService::from_env(Arc::new(
    DefaultEnvWrapper,
  ))?);
  let app_service = build_app_service(settings.clone()).await?;

  let registry = Arc::new(ModuleRegistry::builtin());
  registry.sync_to_db(&app_service.db_service()).await?;

  let state: Arc<dyn RouterState> = Arc::new(DefaultRouterState::new(app_service, registry));
  let rate_limiter = Arc::new(RateLimiter::per_second(settings.rate_limit_rps()));
  let _eviction_task = rate_limiter.spawn_eviction();

  let router = crate::build_router(state, rate_limiter);
  let addr = format!("{}:{}", settings.host(), settings.port());
  let listener = tokio::net::TcpListener::bind(&addr).await?;
  tracing::info!(addr = %addr, "protocol server listening");

  axum::serve(listener, router)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  let ctrl_c = async {
    tokio::signal::ctrl_c().await.ok();
  };
  #[cfg(unix)]
  let terminate = async {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
      .expect("failed to install signal handler")
      .recv()
      .await;
  };
  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
  tracing::info!("shutdown signal received");
}
