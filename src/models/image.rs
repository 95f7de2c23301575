use crate::error::{GenerationError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::path::Path;

/// Source photo: raw bytes plus declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    media_type: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Result<Self> {
        let media_type = media_type.into();
        if bytes.is_empty() {
            return Err(GenerationError::InvalidRequest("Image payload is empty".into()));
        }
        if !media_type.starts_with("image/") {
            return Err(GenerationError::InvalidRequest(format!(
                "Unsupported media type: {}",
                media_type
            )));
        }
        Ok(Self { bytes, media_type })
    }

    /// Reads a photo from disk, inferring the media type from its extension.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let media_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(media_type_for_extension)
            .ok_or_else(|| {
                GenerationError::InvalidRequest(format!(
                    "Cannot infer image type of {}",
                    path.display()
                ))
            })?;
        let bytes = tokio::fs::read(path).await?;
        Self::new(bytes, media_type)
    }

    /// Parses a `data:<media>;base64,<payload>` URL.
    pub fn from_data_url(data_url: &str) -> Result<Self> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or_else(|| GenerationError::InvalidRequest("Not a data URL".into()))?;
        let (media_type, encoded) = rest
            .split_once(";base64,")
            .ok_or_else(|| GenerationError::InvalidRequest("Data URL is not base64".into()))?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| GenerationError::InvalidRequest(format!("Invalid base64 image: {}", e)))?;
        Self::new(bytes, media_type)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, STANDARD.encode(&self.bytes))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }
}

fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Immutable input to one generation: a photo and a non-empty styling instruction.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    image: ImagePayload,
    instruction: String,
}

impl GenerationRequest {
    pub fn new(image: ImagePayload, instruction: impl Into<String>) -> Result<Self> {
        let instruction = instruction.into();
        if instruction.trim().is_empty() {
            return Err(GenerationError::InvalidRequest(
                "Instruction must not be empty".into(),
            ));
        }
        Ok(Self { image, instruction })
    }

    /// Request using the photo booth's stock instruction for `decade`.
    pub fn for_decade(image: ImagePayload, decade: &str) -> Result<Self> {
        Self::new(image, crate::prompt::decade_prompt(decade))
    }

    pub fn image(&self) -> &ImagePayload {
        &self.image
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    pub url: String,
    pub model: String,
    /// Instruction that produced the image; the fallback text when the fallback ran.
    pub instruction: String,
    pub fallback_decade: Option<String>,
    /// Transport calls across primary and fallback sequences.
    pub transport_calls: u32,
}

impl GeneratedImage {
    pub fn used_fallback(&self) -> bool {
        self.fallback_decade.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> ImagePayload {
        ImagePayload::new(vec![0x89, b'P', b'N', b'G'], "image/png").unwrap()
    }

    #[test]
    fn test_payload_validation() {
        assert!(ImagePayload::new(Vec::new(), "image/png").is_err());
        assert!(ImagePayload::new(vec![1, 2, 3], "text/plain").is_err());
        assert!(ImagePayload::new(vec![1, 2, 3], "image/jpeg").is_ok());
    }

    #[test]
    fn test_data_url() {
        let payload = png();
        let url = payload.to_data_url();
        assert_eq!(url, "data:image/png;base64,iVBORw==");

        let parsed = ImagePayload::from_data_url(&url).unwrap();
        assert_eq!(parsed, payload);

        assert!(ImagePayload::from_data_url("http://example.com/a.png").is_err());
        assert!(ImagePayload::from_data_url("data:image/png,raw").is_err());
    }

    #[test]
    fn test_extension_lookup() {
        assert_eq!(media_type_for_extension("JPG"), Some("image/jpeg"));
        assert_eq!(media_type_for_extension("webp"), Some("image/webp"));
        assert_eq!(media_type_for_extension("bmp"), None);
    }

    #[tokio::test]
    async fn test_from_file_rejects_unknown_extension() {
        let err = ImagePayload::from_file("photo.tiff").await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidRequest(_)));
    }

    #[test]
    fn test_request_requires_instruction() {
        assert!(GenerationRequest::new(png(), "  ").is_err());

        let request = GenerationRequest::new(png(), "Make me look like the 1950s").unwrap();
        assert_eq!(request.instruction(), "Make me look like the 1950s");
        assert_eq!(request.image().media_type(), "image/png");
    }

    #[test]
    fn test_request_for_decade() {
        let request = GenerationRequest::for_decade(png(), "1980s").unwrap();
        assert!(request.instruction().contains("1980s"));
    }
}
