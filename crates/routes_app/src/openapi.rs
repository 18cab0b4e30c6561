use utoipa::OpenApi;

/// Schema catalogue for the management API; served to the console build
/// pipeline, not mounted on the server itself.
#[derive(OpenApi)]
#[openapi(
  info(
    title = "MCP Portal Management API",
    description = "Per-user configuration surface of the MCP Portal protocol server"
  ),
  components(schemas(
    objs::AccountStatus,
    objs::ApiKey,
    objs::AuthType,
    objs::ModuleSetting,
    objs::ModuleStatus,
    objs::Plan,
    objs::Prompt,
    objs::ToolAnnotations,
    objs::ToolDescriptor,
    objs::ToolSetting,
    objs::UsageDetail,
    objs::UsagePeriod,
    objs::UsageSummary,
    objs::User,
    objs::UserRole,
    crate::CredentialListResponse,
    crate::CredentialResponse,
    crate::CredentialSummaryDto,
    crate::CreateApiKeyRequest,
    crate::CreateApiKeyResponse,
    crate::ApiKeyListResponse,
    crate::ModuleConfigResponse,
    crate::ModuleConfigDto,
    crate::ToolConfigDto,
    crate::UpdateToolsRequest,
    crate::UpdateDescriptionRequest,
    crate::PromptPayload,
    crate::PromptListResponse,
    crate::UpsertOAuthAppRequest,
    crate::OAuthAppListResponse,
    crate::ConsentDto,
    crate::ConsentListResponse,
    services::OAuthAppMasked,
  ))
)]
pub struct ApiDoc;
