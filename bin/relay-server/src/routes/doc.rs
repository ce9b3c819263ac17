use utoipa::OpenApi;

use crate::routes::{gemini, health};

#[derive(OpenApi)]
#[openapi(info(
    title = "relay-server",
    description = "HTTP relay in front of the Gemini generative-AI API",
    version = "0.1.0"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(gemini::api_docs());
    root
}
