//! Image payloads for plant identification

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bloom_ai::Content;

use crate::error::ValidationError;

/// Raster formats the identifier accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageMimeType {
    Png,
    Jpeg,
    Webp,
}

impl ImageMimeType {
    /// The MIME type string sent to the service
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMimeType::Png => "image/png",
            ImageMimeType::Jpeg => "image/jpeg",
            ImageMimeType::Webp => "image/webp",
        }
    }

    /// Guess the type from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ValidationError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        match ext.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageMimeType::Png),
            "jpg" | "jpeg" => Ok(ImageMimeType::Jpeg),
            "webp" => Ok(ImageMimeType::Webp),
            "" => Err(ValidationError::UnsupportedImageType("none".into())),
            _ => Err(ValidationError::UnsupportedImageType(ext)),
        }
    }

    /// Detect the type from the file signature
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageMimeType::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageMimeType::Jpeg)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageMimeType::Webp)
        } else {
            None
        }
    }
}

impl FromStr for ImageMimeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image/png" => Ok(ImageMimeType::Png),
            "image/jpeg" | "image/jpg" => Ok(ImageMimeType::Jpeg),
            "image/webp" => Ok(ImageMimeType::Webp),
            other => Err(ValidationError::UnsupportedImageType(other.to_string())),
        }
    }
}

impl fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, base64-encoded image ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    data: String,
    mime_type: ImageMimeType,
}

impl ImagePayload {
    /// Wrap already-encoded data, checking it decodes to the declared type
    pub fn new(data: impl Into<String>, mime_type: &str) -> Result<Self, ValidationError> {
        let mime_type: ImageMimeType = mime_type.parse()?;
        let data = data.into();
        let bytes = STANDARD.decode(data.as_bytes())?;
        check_signature(&bytes, mime_type)?;
        Ok(Self { data, mime_type })
    }

    /// Encode raw file bytes
    pub fn from_bytes(bytes: &[u8], mime_type: ImageMimeType) -> Result<Self, ValidationError> {
        check_signature(bytes, mime_type)?;
        Ok(Self {
            data: STANDARD.encode(bytes),
            mime_type,
        })
    }

    /// Read an image file; the type comes from its extension
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let mime_type = ImageMimeType::from_path(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(ValidationError::Unreadable)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), %mime_type, "image loaded");
        Self::from_bytes(&bytes, mime_type)
    }

    /// Base64 data
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn mime_type(&self) -> ImageMimeType {
        self.mime_type
    }

    /// Request part carrying this image
    pub fn to_content(&self) -> Content {
        Content::image(self.data.clone(), self.mime_type.as_str())
    }
}

fn check_signature(bytes: &[u8], declared: ImageMimeType) -> Result<(), ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::EmptyImage);
    }
    match ImageMimeType::sniff(bytes) {
        Some(found) if found == declared => Ok(()),
        _ => Err(ValidationError::MimeMismatch {
            declared: declared.as_str(),
        }),
    }
}
