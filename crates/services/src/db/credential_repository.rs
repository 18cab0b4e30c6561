use crate::db::{DbError, SqliteDbService};
use chrono::{DateTime, Utc};
use objs::{CredentialRow, OAuthApp, ToolSetting};
use sqlx::query_as;

type CredentialTuple = (String, String, String, i64, DateTime<Utc>, DateTime<Utc>);

fn credential_from_tuple(row: CredentialTuple) -> CredentialRow {
  let (user_id, module_name, encrypted_blob, key_version, created_at, updated_at) = row;
  CredentialRow {
    user_id,
    module_name,
    encrypted_blob,
    key_version,
    created_at,
    updated_at,
  }
}

#[async_trait::async_trait]
pub trait CredentialRepository: Send + Sync + std::fmt::Debug {
  /// Writes the credential and seeds default tool settings in one
  /// transaction. Seeding uses INSERT OR IGNORE so only the first link of a
  /// module creates settings; relinking preserves user toggles.
  async fn upsert_credential(
    &self,
    row: &CredentialRow,
    default_settings: &[ToolSetting],
  ) -> Result<(), DbError>;

  async fn get_credential(
    &self,
    user_id: &str,
    module_name: &str,
  ) -> Result<Option<CredentialRow>, DbError>;

  async fn list_credentials(&self, user_id: &str) -> Result<Vec<CredentialRow>, DbError>;

  async fn delete_credential(&self, user_id: &str, module_name: &str) -> Result<(), DbError>;

  /// Token-refresh writeback: single UPDATE, last write wins.
  async fn update_credential_blob(
    &self,
    user_id: &str,
    module_name: &str,
    encrypted_blob: &str,
    key_version: i64,
  ) -> Result<(), DbError>;

  /// `(user_id, module_name, updated_at)` for every stored credential,
  /// admin-facing; never touches ciphertext.
  async fn list_credential_consents(
    &self,
  ) -> Result<Vec<(String, String, DateTime<Utc>)>, DbError>;

  async fn upsert_oauth_app(&self, app: &OAuthApp) -> Result<(), DbError>;

  async fn get_oauth_app(&self, provider: &str) -> Result<Option<OAuthApp>, DbError>;

  async fn list_oauth_apps(&self) -> Result<Vec<OAuthApp>, DbError>;

  async fn delete_oauth_app(&self, provider: &str) -> Result<(), DbError>;
}

#[async_trait::async_trait]
impl CredentialRepository for SqliteDbService {
  async fn upsert_credential(
    &self,
    row: &CredentialRow,
    default_settings: &[ToolSetting],
  ) -> Result<(), DbError> {
    let now = self.time_service.utc_now();
    let mut tx = self.pool.begin().await?;

    sqlx::query(
      r#"
      INSERT INTO credentials (user_id, module_name, encrypted_blob, key_version, created_at, updated_at)
      VALUES (?, ?, ?, ?, ?, ?)
      ON CONFLICT (user_id, module_name)
      DO UPDATE SET encrypted_blob = excluded.encrypted_blob,
                    key_version = excluded.key_version,
                    updated_at = excluded.updated_at
      "#,
    )
    .bind(&row.user_id)
    .bind(&row.module_name)
    .bind(&row.encrypted_blob)
    .bind(row.key_version)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for setting in default_settings {
      sqlx::query(
        r#"
        INSERT OR IGNORE INTO tool_settings (user_id, module_name, tool_id, enabled)
        VALUES (?, ?, ?, ?)
        "#,
      )
      .bind(&setting.user_id)
      .bind(&setting.module_name)
      .bind(&setting.tool_id)
      .bind(setting.enabled)
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    Ok(())
  }

  async fn get_credential(
    &self,
    user_id: &str,
    module_name: &str,
  ) -> Result<Option<CredentialRow>, DbError> {
    let row = query_as::<_, CredentialTuple>(
      r#"
      SELECT user_id, module_name, encrypted_blob, key_version, created_at, updated_at
      FROM credentials
      WHERE user_id = ? AND module_name = ?
      "#,
    )
    .bind(user_id)
    .bind(module_name)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(credential_from_tuple))
  }

  async fn list_credentials(&self, user_id: &str) -> Result<Vec<CredentialRow>, DbError> {
    let rows = query_as::<_, CredentialTuple>(
      r#"
      SELECT user_id, module_name, encrypted_blob, key_version, created_at, updated_at
      FROM credentials
      WHERE user_id = ?
      ORDER BY module_name
      "#,
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await?;
    Ok(rows.into_iter().map(credential_from_tuple).collect())
  }

  async fn delete_credential(&self, user_id: &str, module_name: &str) -> Result<(), DbError> {
    sqlx::query("DELETE FROM credentials WHERE user_id = ? AND module_name = ?")
      .bind(user_id)
      .bind(module_name)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn update_credential_blob(
    &self,
    user_id: &str,
    module_name: &str,
    encrypted_blob: &str,
    key_version: i64,
  ) -> Result<(), DbError> {
    let now = self.time_service.utc_now();
    sqlx::query(
      r#"
      UPDATE credentials
      SET encrypted_blob = ?, key_version = ?, updated_at = ?
      WHERE user_id = ? AND module_name = ?
      "#,
    )
    .bind(encrypted_blob)
    .bind(key_version)
    .bind(now)
    .bind(user_id)
    .bind(module_name)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn list_credential_consents(
    &self,
  ) -> Result<Vec<(String, String, DateTime<Utc>)>, DbError> {
    let rows = query_as::<_, (String, String, DateTime<Utc>)>(
      "SELECT user_id, module_name, updated_at FROM credentials ORDER BY user_id, module_name",
    )
    .fetch_all(&self.pool)
    .await?;
    Ok(rows)
  }

  async fn upsert_oauth_app(&self, app: &OAuthApp) -> Result<(), DbError> {
    sqlx::query(
      r#"
      INSERT INTO oauth_apps (provider, client_id, encrypted_client_secret, redirect_uri, enabled)
      VALUES (?, ?, ?, ?, ?)
      ON CONFLICT (provider)
      DO UPDATE SET client_id = excluded.client_id,
                    encrypted_client_secret = excluded.encrypted_client_secret,
                    redirect_uri = excluded.redirect_uri,
                    enabled = excluded.enabled
      "#,
    )
    .bind(&app.provider)
    .bind(&app.client_id)
    .bind(&app.encrypted_client_secret)
    .bind(&app.redirect_uri)
    .bind(app.enabled)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn get_oauth_app(&self, provider: &str) -> Result<Option<OAuthApp>, DbError> {
    let row = query_as::<_, (String, String, String, String, bool)>(
      r#"
      SELECT provider, client_id, encrypted_client_secret, redirect_uri, enabled
      FROM oauth_apps
      WHERE provider = ?
      "#,
    )
    .bind(provider)
    .fetch_optional(&self.pool)
    .await?;
    Ok(row.map(
      |(provider, client_id, encrypted_client_secret, redirect_uri, enabled)| OAuthApp {
        provider,
        client_id,
        encrypted_client_secret,
        redirect_uri,
        enabled,
      },
    ))
  }

  async fn list_oauth_apps(&self) -> Result<Vec<OAuthApp>, DbError> {
    let rows = query_as::<_, (String, String, String, String, bool)>(
      r#"
      SELECT provider, client_id, encrypted_client_secret, redirect_uri, enabled
      FROM oauth_apps
      ORDER BY provider
      "#,
    )
    .fetch_all(&self.pool)
    .await?;
    Ok(
      rows
        .into_iter()
        .map(
          |(provider, client_id, encrypted_client_secret, redirect_uri, enabled)| OAuthApp {
            provider,
            client_id,
            encrypted_client_secret,
            redirect_uri,
            enabled,
          },
        )
        .collect(),
    )
  }

  async fn delete_oauth_app(&self, provider: &str) -> Result<(), DbError> {
    sqlx::query("DELETE FROM oauth_apps WHERE provider = ?")
      .bind(provider)
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}
