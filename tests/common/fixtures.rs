use async_trait::async_trait;
use image::{ImageBuffer, Rgb};
use labelview::storage::BucketLocator;
use labelview::{
    BoundingBox, ClassVocabulary, DetectRequest, DetectionService, Detection, Error,
    ModelLifecycle, ModelStatus, Result, ServiceErrorKind, VersionRef,
};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

pub const TEST_MODEL: &str =
    "arn:aws:rekognition:us-east-1:111122223333:project/shoes/version/shoes.1/1700000000000";

pub fn vocab() -> ClassVocabulary {
    ["boots", "cats"].into_iter().collect()
}

pub fn det(name: &str, confidence: f32, left: f32, top: f32, width: f32, height: f32) -> Detection {
    Detection::new(
        name,
        confidence,
        BoundingBox {
            left,
            top,
            width,
            height,
        },
    )
}

/// Writes a white 100x100 png at `path`.
pub fn write_test_image(path: &Path) {
    let img = ImageBuffer::from_fn(100, 100, |_, _| Rgb([255u8, 255u8, 255u8]));
    img.save_with_format(path, image::ImageFormat::Png)
        .expect("Failed to save test image");
}

/// Scripted reply for one image.
#[derive(Clone)]
pub enum Reply {
    Labels(Vec<Detection>),
    Fail(ServiceErrorKind),
}

/// Detection service answering from a table keyed by image bytes.
pub struct FakeDetectionService {
    replies: HashMap<Vec<u8>, Reply>,
    fallback: Reply,
    pub calls: Mutex<Vec<DetectRequest>>,
}

impl FakeDetectionService {
    pub fn new(fallback: Vec<Detection>) -> Self {
        Self {
            replies: HashMap::new(),
            fallback: Reply::Labels(fallback),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(mut self, image_bytes: &[u8], reply: Reply) -> Self {
        self.replies.insert(image_bytes.to_vec(), reply);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DetectionService for FakeDetectionService {
    async fn detect(&self, request: DetectRequest) -> Result<Vec<Detection>> {
        let reply = self
            .replies
            .get(&request.image_bytes)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        self.calls.lock().unwrap().push(request);
        match reply {
            Reply::Labels(labels) => Ok(labels),
            Reply::Fail(kind) => Err(Error::service(kind, "scripted failure")),
        }
    }
}

/// Lifecycle that reports a scripted sequence of statuses; the last one repeats.
pub struct FakeLifecycle {
    statuses: Mutex<VecDeque<ModelStatus>>,
    pub polls: Mutex<usize>,
    pub requests: Mutex<Vec<String>>,
}

impl FakeLifecycle {
    pub fn new(statuses: Vec<ModelStatus>) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            polls: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Start and stop requests sent so far, as `start:<units>` or `stop`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> usize {
        *self.polls.lock().unwrap()
    }
}

#[async_trait]
impl ModelLifecycle for FakeLifecycle {
    async fn start(&self, _model_id: &str, units: i32) -> Result<ModelStatus> {
        self.requests.lock().unwrap().push(format!("start:{}", units));
        Ok(ModelStatus::Starting)
    }

    async fn stop(&self, _model_id: &str) -> Result<ModelStatus> {
        self.requests.lock().unwrap().push("stop".to_string());
        Ok(ModelStatus::Stopping)
    }

    async fn status(&self, _version: &VersionRef) -> Result<ModelStatus> {
        *self.polls.lock().unwrap() += 1;
        let mut statuses = self.statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        status.ok_or_else(|| Error::service(ServiceErrorKind::NotFound, "no status"))
    }
}

pub fn test_version() -> VersionRef {
    VersionRef {
        project_arn: "arn:aws:rekognition:us-east-1:111122223333:project/shoes/1690000000000"
            .to_string(),
        version_name: "shoes.1".to_string(),
    }
}

pub struct FakeLocator(pub &'static str);

#[async_trait]
impl BucketLocator for FakeLocator {
    async fn bucket_region(&self, _bucket: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}
