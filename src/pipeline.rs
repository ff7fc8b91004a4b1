use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::check_percentage;
use crate::detection::{DetectRequest, DetectionService, normalize_detections};
use crate::error::{Error, Result};
use crate::models::{ClassVocabulary, NormalizedDetection};
use crate::render::{Renderer, visible_detections};

/// File extensions the detection service accepts.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Runs inference on one image and normalizes the result.
///
/// Rendering is left to the caller.
pub async fn detect_image(
    service: &dyn DetectionService,
    image_bytes: Vec<u8>,
    model_id: &str,
    min_confidence: Option<f32>,
    vocabulary: &ClassVocabulary,
) -> Result<Vec<NormalizedDetection>> {
    if let Some(floor) = min_confidence {
        check_percentage(floor, "min_confidence")?;
    }
    let detections = service
        .detect(DetectRequest {
            image_bytes,
            model_id: model_id.to_string(),
            min_confidence,
        })
        .await?;
    normalize_detections(&detections, vocabulary)
}

/// What to do when one image's request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the whole run at the first failure.
    #[default]
    Abort,
    /// Record the failure and move on. Vocabulary mismatches still abort.
    SkipImage,
}

/// Result for one processed image
#[derive(Debug, Clone)]
pub struct ImageReport {
    pub path: PathBuf,
    pub detections: Vec<NormalizedDetection>,
    /// Number of detections at or above the display threshold
    pub visible: usize,
    /// Where the overlay was written, if rendering was enabled
    pub rendered: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<ImageReport>,
    pub failures: Vec<(PathBuf, Error)>,
}

impl RunSummary {
    pub fn total_detections(&self) -> usize {
        self.reports.iter().map(|r| r.detections.len()).sum()
    }
}

/// Sequential directory runner: read bytes, detect, normalize, render.
pub struct Pipeline {
    service: Arc<dyn DetectionService>,
    vocabulary: ClassVocabulary,
    model_id: String,
    min_confidence: Option<f32>,
    display_threshold: f32,
    renderer: Renderer,
    render_dir: Option<PathBuf>,
    failure_policy: FailurePolicy,
}

impl Pipeline {
    pub fn new(
        service: Arc<dyn DetectionService>,
        vocabulary: ClassVocabulary,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            service,
            vocabulary,
            model_id: model_id.into(),
            min_confidence: None,
            display_threshold: crate::config::DEFAULT_DISPLAY_THRESHOLD,
            renderer: Renderer::default(),
            render_dir: None,
            failure_policy: FailurePolicy::Abort,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: Option<f32>) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Threshold is a percentage; anything outside [0, 100] is rejected.
    pub fn with_display_threshold(mut self, threshold: f32) -> Result<Self> {
        check_percentage(threshold, "display_threshold")?;
        self.display_threshold = threshold;
        Ok(self)
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Write overlays into `output_dir`, which must be empty or non-existent.
    pub fn with_render_dir(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(Error::Config(format!(
                    "render directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }
        self.render_dir = Some(output_dir);
        Ok(self)
    }

    pub fn vocabulary(&self) -> &ClassVocabulary {
        &self.vocabulary
    }

    /// Processes a single image file.
    pub async fn run_image(&self, path: &Path) -> Result<ImageReport> {
        let bytes = std::fs::read(path)?;
        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        let detections = detect_image(
            self.service.as_ref(),
            bytes,
            &self.model_id,
            self.min_confidence,
            &self.vocabulary,
        )
        .await?;
        let visible = visible_detections(&detections, self.display_threshold).len();

        let rendered = match &self.render_dir {
            Some(dir) => {
                let overlay = self.renderer.render_path(
                    path,
                    &detections,
                    &self.vocabulary,
                    self.display_threshold,
                )?;
                let out = unique_overlay_path(dir, path);
                overlay.save(&out)?;
                debug!("Saved overlay {}", out.display());
                Some(out)
            }
            None => None,
        };

        Ok(ImageReport {
            path: path.to_path_buf(),
            detections,
            visible,
            rendered,
        })
    }

    /// Processes every supported image in `dir`, one at a time, in listing order.
    pub async fn run_directory(&self, dir: &Path) -> Result<RunSummary> {
        let images = list_images(dir)?;
        info!("Processing {} images from {}", images.len(), dir.display());

        let mut summary = RunSummary::default();
        for (i, path) in images.into_iter().enumerate() {
            info!("[{}] {}", i + 1, path.display());
            match self.run_image(&path).await {
                Ok(report) => {
                    info!(
                        "  {} detections, {} at or above {}",
                        report.detections.len(),
                        report.visible,
                        self.display_threshold
                    );
                    summary.reports.push(report);
                }
                Err(e) if self.failure_policy == FailurePolicy::SkipImage && !e.is_fatal_for_run() => {
                    warn!("  Skipping {}: {}", path.display(), e);
                    summary.failures.push((path, e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    }
}

/// Overlay path in `dir`: the source stem with a png extension, suffixed
/// with `-2`, `-3`, ... when an earlier image already took that name.
fn unique_overlay_path(dir: &Path, path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mut out = dir.join(format!("{}.png", stem));
    let mut n = 2;
    while out.exists() {
        out = dir.join(format!("{}-{}.png", stem, n));
        n += 1;
    }
    out
}

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// Image files in `dir` in directory listing order (not sorted).
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if is_supported_image(&path) {
            images.push(path);
        } else {
            debug!("Ignoring {}", path.display());
        }
    }
    Ok(images)
}
