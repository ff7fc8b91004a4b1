pub mod normalize;
pub mod rekognition;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Detection;

pub use normalize::normalize_detections;
pub use rekognition::RekognitionClient;

/// A single inference request for one image.
#[derive(Debug, Clone)]
pub struct DetectRequest {
    pub image_bytes: Vec<u8>,
    /// Model version identifier understood by the service.
    pub model_id: String,
    /// Percentage floor. `None` defers to the model's own threshold.
    pub min_confidence: Option<f32>,
}

/// Remote object detection. Each call is one full inference; nothing is cached.
#[async_trait]
pub trait DetectionService: Send + Sync {
    async fn detect(&self, request: DetectRequest) -> Result<Vec<Detection>>;
}
