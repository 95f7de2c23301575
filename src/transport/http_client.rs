use super::{classify, Transport};
use crate::{
    config::GeneratorConfig,
    error::{GenerationError, ProviderFailure, Result},
    models::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ContentPart, ImagePayload, ImageUrl},
};
use async_trait::async_trait;

const NO_REPLY: &str = "no valid reply received";

/// OpenAI-compatible chat-completions transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    image_model: String,
    text_model: String,
}

impl HttpTransport {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| GenerationError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            image_model: config.image_model.clone(),
            text_model: config.text_model.clone(),
        })
    }

    /// Sends a text-only prompt to the text model and returns its reply.
    pub async fn check_connection(&self, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.text_model.clone(),
            stream: false,
            messages: vec![ChatMessage::user(vec![ContentPart::Text {
                text: prompt.to_string(),
            }])],
        };

        log::info!("Checking connection with model: {}", self.text_model);
        let response = self.send(&request).await?;
        if let Some(error) = &response.error {
            let detail = error.message.clone().unwrap_or_else(|| NO_REPLY.to_string());
            return Err(classify::classify_error(None, error, detail).into());
        }

        Ok(response
            .first_content()
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(NO_REPLY)
            .to_string())
    }

    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> std::result::Result<ChatCompletionResponse, ProviderFailure> {
        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                log::error!("Transport error calling {}: {:?}", self.api_base, e);
                ProviderFailure::unrecoverable(format!("request failed: {}", e))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| unreadable_body(status.as_u16(), &e))?;

        if !status.is_success() {
            log::warn!("Provider returned HTTP {}", status.as_u16());
            log::debug!("Provider error body: {}", body);
            return Err(classify::classify_status(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderFailure::malformed(format!("response is not valid JSON: {}", e))
                .with_status(status.as_u16())
        })
    }
}

/// A server fault stays classified by its status even when the body is lost.
fn unreadable_body(status: u16, error: &dyn std::fmt::Display) -> ProviderFailure {
    log::warn!("Failed to read HTTP {} response body: {}", status, error);
    if (200..300).contains(&status) {
        ProviderFailure::unrecoverable(format!("failed to read response body: {}", error))
            .with_status(status)
    } else {
        classify::classify_status(status, "")
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn model_id(&self) -> &str {
        &self.image_model
    }

    async fn generate_image(
        &self,
        image: &ImagePayload,
        instruction: &str,
    ) -> std::result::Result<String, ProviderFailure> {
        let request = ChatCompletionRequest {
            model: self.image_model.clone(),
            stream: false,
            messages: vec![ChatMessage::user(vec![
                ContentPart::Text {
                    text: instruction.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.to_data_url(),
                    },
                },
            ])],
        };

        log::info!("Generating image with model: {}", self.image_model);
        log::debug!(
            "Image payload: {} bytes of {}",
            image.bytes().len(),
            image.media_type()
        );

        let response = self.send(&request).await?;
        classify::classify_success(&response)
    }
}
