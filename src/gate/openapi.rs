#![allow(clippy::needless_for_each)]

#[allow(unused_imports)]
use crate::gate::handlers::{
    health::{self, __path_health},
    passcode::{self, __path_add_passcode, __path_check_passcode},
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(health, add_passcode, check_passcode),
    components(
        schemas(
            health::Health,
            passcode::PasscodeRequest,
            passcode::MessageResponse,
            passcode::ErrorResponse,
            passcode::DeniedResponse,
            passcode::RelayFailureResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "passcode", description = "Passcode verification and administration"),
        (name = "health", description = "Service health"),
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
