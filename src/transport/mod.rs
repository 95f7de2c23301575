pub mod classify;
pub mod http_client;

use crate::error::ProviderFailure;
use crate::models::ImagePayload;
use async_trait::async_trait;

pub use http_client::HttpTransport;

/// One request/response cycle against the image-generation endpoint.
///
/// Implementations must map every failure path into a classified
/// [`ProviderFailure`]; nothing above this seam inspects error text.
#[async_trait]
pub trait Transport: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate_image(
        &self,
        image: &ImagePayload,
        instruction: &str,
    ) -> Result<String, ProviderFailure>;
}
