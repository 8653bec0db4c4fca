//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use super::types::{
    AmountRequest, BalanceAdjustRequest, HealthResponse, PurchaseRequest, UserStatusRequest,
};

/// HS256 session token issued to users and operators
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_jwt",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "hashlease API",
        version = "1.0.0",
        description = "Leased and purchased mining contracts: accrual, billing and settlement.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::get_profile,
        crate::gateway::handlers::list_contracts,
        crate::gateway::handlers::purchase_contract,
        crate::gateway::handlers::resume_contract,
        crate::gateway::handlers::list_machines,
        crate::gateway::handlers::list_transactions,
        crate::gateway::handlers::request_deposit,
        crate::gateway::handlers::request_withdrawal,
        crate::gateway::handlers::list_pending_transactions,
        crate::gateway::handlers::approve_transaction,
        crate::gateway::handlers::reject_transaction,
        crate::gateway::handlers::adjust_balance,
        crate::gateway::handlers::set_user_status,
    ),
    components(
        schemas(
            HealthResponse,
            PurchaseRequest,
            AmountRequest,
            BalanceAdjustRequest,
            UserStatusRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "System", description = "Health checks"),
        (name = "Contracts", description = "Machine catalog and contract lifecycle (auth required)"),
        (name = "Funds", description = "Profile, deposits and withdrawals (auth required)"),
        (name = "Admin", description = "Settlement review and account administration (admin only)")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_generates() {
        let doc = ApiDoc::openapi();
        assert_eq!(doc.info.title, "hashlease API");
        assert!(doc.to_json().is_ok());
    }

    #[test]
    fn test_endpoints_registered() {
        let paths = ApiDoc::openapi().paths.paths;
        assert!(paths.contains_key("/api/v1/health"));
        assert!(paths.contains_key("/api/v1/user/contracts"));
        assert!(paths.contains_key("/api/v1/user/contracts/{id}/resume"));
        assert!(paths.contains_key("/api/v1/admin/transactions/{id}/approve"));
    }

    #[test]
    fn test_security_scheme_registered() {
        let components = ApiDoc::openapi().components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_jwt"));
    }
}
