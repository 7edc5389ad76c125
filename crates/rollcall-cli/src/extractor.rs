//! Adapter for the external feature extractor.
//!
//! The platform treats face detection and descriptor generation as an opaque
//! external capability. This adapter shells out to a configured command with
//! the image path as its argument and reads one JSON object from stdout:
//!
//! ```text
//! {"descriptor": [0.1, 0.2, ...]}
//! {"error": "no_face" | "multiple_faces" | "unreadable", "message": "..."}
//! ```

use rollcall_core::{Descriptor, ExtractionError, FeatureExtractor};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

#[derive(Deserialize)]
struct ExtractorReply {
    descriptor: Option<Vec<f32>>,
    error: Option<String>,
    message: Option<String>,
}

/// Runs an external extractor command per image.
pub struct CommandExtractor {
    command: String,
}

impl CommandExtractor {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

impl FeatureExtractor for CommandExtractor {
    fn validate(&self, image: &Path) -> Result<(), ExtractionError> {
        self.extract(image).map(|_| ())
    }

    fn extract(&self, image: &Path) -> Result<Descriptor, ExtractionError> {
        let output = Command::new(&self.command)
            .arg(image)
            .output()
            .map_err(|e| ExtractionError::EncodingFailed(format!("extractor spawn: {e}")))?;

        if !output.status.success() && output.stdout.is_empty() {
            return Err(ExtractionError::EncodingFailed(format!(
                "extractor exited with {}",
                output.status
            )));
        }

        let reply: ExtractorReply = serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractionError::EncodingFailed(format!("extractor reply: {e}")))?;

        if let Some(error) = reply.error {
            let message = reply.message.unwrap_or_default();
            return Err(match error.as_str() {
                "no_face" => ExtractionError::NoFaceDetected,
                "multiple_faces" => ExtractionError::MultipleFacesDetected,
                "unreadable" => ExtractionError::ImageUnreadable(message),
                other => ExtractionError::EncodingFailed(format!("{other}: {message}")),
            });
        }

        reply
            .descriptor
            .filter(|values| !values.is_empty())
            .map(Descriptor::new)
            .ok_or_else(|| ExtractionError::EncodingFailed("empty descriptor".into()))
    }
}
