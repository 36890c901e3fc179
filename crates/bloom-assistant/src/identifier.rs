//! Plant identification from a single photo

use std::path::Path;

use bloom_ai::{Client, Content};

use crate::{
    error::{Error, Result, ValidationError},
    image::ImagePayload,
    sections::AnalysisResult,
};

/// Instruction sent alongside the photo
pub const IDENTIFY_PROMPT: &str = "Identify the plant in this image. Provide its common and scientific names. Then, give detailed care instructions including watering schedule, sunlight requirements, soil type, and common pests or diseases to watch out for. Format the response using markdown with ## for main headers and ### for sub-headers.";

/// Send one image with the identification prompt and return the reply text.
///
/// Any service failure, including a reply with no usable text, becomes
/// [`Error::Request`]. Nothing is retried.
pub async fn analyze(client: &Client, image: &ImagePayload) -> Result<String> {
    let contents = vec![image.to_content(), Content::text(IDENTIFY_PROMPT)];

    match client.generate_content(contents).await {
        Ok(text) => Ok(text),
        Err(e) => {
            tracing::error!(error = %e, mime_type = %image.mime_type(), "image analysis failed");
            Err(Error::Request(e))
        }
    }
}

/// State of the identification view: the selected photo and the last outcome.
pub struct Identifier {
    client: Client,
    image: Option<ImagePayload>,
    result: Option<AnalysisResult>,
    error: Option<String>,
    is_loading: bool,
}

impl Identifier {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            image: None,
            result: None,
            error: None,
            is_loading: false,
        }
    }

    /// Select a new photo, discarding the previous one and its outcome
    pub fn select_image(&mut self, image: ImagePayload) {
        self.result = None;
        self.error = None;
        self.image = Some(image);
    }

    /// Load and select a photo from disk.
    ///
    /// On failure the selection is cleared and the error shown inline.
    pub async fn select_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.result = None;
        self.error = None;

        match ImagePayload::load(path).await {
            Ok(image) => {
                self.image = Some(image);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not select image");
                self.image = None;
                self.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Drop the selected photo and its result
    pub fn remove_image(&mut self) {
        self.image = None;
        self.result = None;
    }

    /// Analyze the selected photo.
    ///
    /// Without a photo this records an inline prompt and makes no call.
    pub async fn identify(&mut self) -> Result<&AnalysisResult> {
        let Some(image) = self.image.clone() else {
            self.error = Some(ValidationError::MissingImage.to_string());
            return Err(ValidationError::MissingImage.into());
        };

        self.is_loading = true;
        self.error = None;
        self.result = None;

        let outcome = analyze(&self.client, &image).await;
        self.is_loading = false;

        match outcome {
            Ok(text) => Ok(self.result.insert(AnalysisResult::new(text))),
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn image(&self) -> Option<&ImagePayload> {
        self.image.as_ref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    /// User-visible error from the last action
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Whether an analysis can be started right now
    pub fn can_identify(&self) -> bool {
        self.image.is_some() && !self.is_loading
    }
}
