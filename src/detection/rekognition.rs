//! Rekognition Custom Labels adapter for inference and model lifecycle.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_rekognition::Client;
use aws_sdk_rekognition::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{CustomLabel, Image};
use tracing::{debug, info};

use crate::detection::{DetectRequest, DetectionService};
use crate::error::{Error, Result, ServiceErrorKind};
use crate::lifecycle::{ModelLifecycle, ModelStatus, VersionRef};
use crate::models::{BoundingBox, Detection};

/// Loads credentials and region from the environment, optionally pinning the region.
pub async fn load_sdk_config(region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    loader.load().await
}

/// Converts an SDK failure into a classified service error.
pub(crate) fn sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let kind = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => ServiceErrorKind::Transport,
        _ => ServiceErrorKind::from_code(err.code()),
    };
    Error::service(kind, format!("{}: {}", operation, DisplayErrorContext(&err)))
}

pub struct RekognitionClient {
    client: Client,
}

impl RekognitionClient {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }
}

/// Maps one service label to a detection.
///
/// Image-level labels carry no geometry and yield `None`.
pub fn label_to_detection(label: &CustomLabel) -> Result<Option<Detection>> {
    let name = label
        .name()
        .ok_or_else(|| Error::InvalidResponse("label without a name".into()))?;
    let confidence = label
        .confidence()
        .ok_or_else(|| Error::InvalidResponse(format!("label {:?} has no confidence", name)))?;
    let Some(bbox) = label.geometry().and_then(|g| g.bounding_box()) else {
        return Ok(None);
    };
    let field = |v: Option<f32>, what: &str| {
        v.ok_or_else(|| {
            Error::InvalidResponse(format!("label {:?} bounding box has no {}", name, what))
        })
    };
    Ok(Some(Detection::new(
        name,
        confidence,
        BoundingBox {
            left: field(bbox.left(), "left")?,
            top: field(bbox.top(), "top")?,
            width: field(bbox.width(), "width")?,
            height: field(bbox.height(), "height")?,
        },
    )))
}

#[async_trait]
impl DetectionService for RekognitionClient {
    async fn detect(&self, request: DetectRequest) -> Result<Vec<Detection>> {
        let size = request.image_bytes.len();
        let image = Image::builder()
            .bytes(Blob::new(request.image_bytes))
            .build();
        let out = self
            .client
            .detect_custom_labels()
            .project_version_arn(&request.model_id)
            .image(image)
            .set_min_confidence(request.min_confidence)
            .send()
            .await
            .map_err(|e| sdk_error("DetectCustomLabels", e))?;

        let labels = out.custom_labels();
        debug!("DetectCustomLabels returned {} labels for {} bytes", labels.len(), size);
        let mut detections = Vec::with_capacity(labels.len());
        for label in labels {
            match label_to_detection(label)? {
                Some(d) => detections.push(d),
                None => debug!("Skipping label without geometry: {:?}", label.name()),
            }
        }
        Ok(detections)
    }
}

#[async_trait]
impl ModelLifecycle for RekognitionClient {
    async fn start(&self, model_id: &str, min_inference_units: i32) -> Result<ModelStatus> {
        info!("Starting model {} with {} inference units", model_id, min_inference_units);
        let out = self
            .client
            .start_project_version()
            .project_version_arn(model_id)
            .min_inference_units(min_inference_units)
            .send()
            .await
            .map_err(|e| sdk_error("StartProjectVersion", e))?;
        Ok(out
            .status()
            .map(|s| ModelStatus::parse(s.as_str()))
            .unwrap_or(ModelStatus::Starting))
    }

    async fn stop(&self, model_id: &str) -> Result<ModelStatus> {
        info!("Stopping model {}", model_id);
        let out = self
            .client
            .stop_project_version()
            .project_version_arn(model_id)
            .send()
            .await
            .map_err(|e| sdk_error("StopProjectVersion", e))?;
        Ok(out
            .status()
            .map(|s| ModelStatus::parse(s.as_str()))
            .unwrap_or(ModelStatus::Stopping))
    }

    async fn status(&self, version: &VersionRef) -> Result<ModelStatus> {
        let out = self
            .client
            .describe_project_versions()
            .project_arn(&version.project_arn)
            .version_names(&version.version_name)
            .send()
            .await
            .map_err(|e| sdk_error("DescribeProjectVersions", e))?;
        let description = out.project_version_descriptions().first().ok_or_else(|| {
            Error::service(
                ServiceErrorKind::NotFound,
                format!(
                    "no version {} in project {}",
                    version.version_name, version.project_arn
                ),
            )
        })?;
        if let Some(message) = description.status_message() {
            debug!("{}: {}", version.version_name, message);
        }
        description
            .status()
            .map(|s| ModelStatus::parse(s.as_str()))
            .ok_or_else(|| Error::InvalidResponse("version description has no status".into()))
    }
}
