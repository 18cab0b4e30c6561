use gateway::{gateway_router, GatewayState};
use services::db::{DbPool, DefaultTimeService, SqliteDbService};
use services::{
  DefaultEnvWrapper, DefaultSettingService, JwksClient, KeyService, MokaRevocationCache,
  SettingService,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
    .init();

  let settings = Arc::new(DefaultSettingService::from_env(Arc::new(
    DefaultEnvWrapper,
  ))?);
  let pool = DbPool::connect(&settings.database_url()).await?;
  let time_service = Arc::new(DefaultTimeService);
  let db_service = SqliteDbService::new(pool, time_service.clone());
  db_service.migrate().await?;

  let key_service = Arc::new(KeyService::from_seed_base64(&settings.signing_key_seed())?);
  let idp_jwks = JwksClient::new(settings.idp_jwks_url());
  let state = GatewayState::new(
    settings.clone(),
    Arc::new(db_service),
    time_service,
    key_service,
    idp_jwks,
    Arc::new(MokaRevocationCache::default()),
  );

  let addr = format!("{}:{}", settings.host(), settings.port());
  let listener = tokio::net::TcpListener::bind(&addr).await?;
  tracing::info!(addr = %addr, "gateway listening");

  let router =
    gateway_router(state).layer(tower_http::trace::TraceLayer::new_for_http());
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
