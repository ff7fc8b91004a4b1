pub mod config;
pub mod detection;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod pipeline;
pub mod render;
pub mod storage;

pub use config::Config;
pub use detection::{DetectRequest, DetectionService, RekognitionClient, normalize_detections};
pub use error::{Error, Result, ServiceErrorKind};
pub use lifecycle::{
    ModelLifecycle, ModelStatus, Transition, TransitionPlan, VersionRef, WaitOptions,
    run_transition, wait_for_status,
};
pub use models::{BoundingBox, ClassVocabulary, Detection, NormalizedDetection};
pub use pipeline::{FailurePolicy, ImageReport, Pipeline, RunSummary, detect_image};
pub use render::Renderer;
