//! Run configuration.
//!
//! Everything the tool needs is loaded once at process start from a JSON
//! file and then passed around explicitly:
//!
//! ```json
//! {
//!   "project_version_arn": "arn:aws:rekognition:us-east-1:111122223333:project/shoes/version/shoes.2024/1700000000000",
//!   "project_arn": "arn:aws:rekognition:us-east-1:111122223333:project/shoes/1690000000000",
//!   "version_name": "shoes.2024",
//!   "class_names": ["boots", "cats"],
//!   "bucket": "my-training-bucket",
//!   "test_images_dir": "data/test",
//!   "display_threshold": 50.0
//! }
//! ```
//!
//! `class_names_file` may be given instead of `class_names`; relative paths
//! are resolved against the directory holding the configuration file.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::lifecycle::{Transition, TransitionPlan, VersionRef, WaitOptions};
use crate::models::ClassVocabulary;

pub const DEFAULT_DISPLAY_THRESHOLD: f32 = 50.0;
pub const DEFAULT_INFERENCE_UNITS: i32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project_version_arn: Option<String>,
    /// Needed only for status queries.
    #[serde(default)]
    pub project_arn: Option<String>,
    #[serde(default)]
    pub version_name: Option<String>,
    #[serde(default)]
    pub class_names: Option<ClassVocabulary>,
    #[serde(default)]
    pub class_names_file: Option<PathBuf>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub test_images_dir: Option<PathBuf>,
    #[serde(default)]
    pub region: Option<String>,
    /// Confidence floor sent with each request. `None` lets the service
    /// apply the model's own threshold.
    #[serde(default)]
    pub min_confidence: Option<f32>,
    #[serde(default)]
    pub display_threshold: Option<f32>,
    #[serde(default)]
    pub min_inference_units: Option<i32>,
}

impl Config {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut config: Config = serde_json::from_reader(reader)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }
        Ok(config)
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        for p in [&mut self.class_names_file, &mut self.test_images_dir]
            .into_iter()
            .flatten()
        {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }

    /// Class vocabulary from `class_names` or, failing that, `class_names_file`.
    pub fn vocabulary(&self) -> Result<ClassVocabulary> {
        let vocab = match (&self.class_names, &self.class_names_file) {
            (Some(names), _) => names.clone(),
            (None, Some(path)) => ClassVocabulary::from_txt_file(path)?,
            (None, None) => {
                return Err(Error::Config(
                    "neither class_names nor class_names_file is set".into(),
                ));
            }
        };
        vocab.validate()?;
        Ok(vocab)
    }

    pub fn model_id(&self) -> Result<&str> {
        non_empty(self.project_version_arn.as_deref(), "project_version_arn")
    }

    pub fn bucket(&self) -> Result<&str> {
        non_empty(self.bucket.as_deref(), "bucket")
    }

    pub fn images_dir(&self) -> Result<&Path> {
        let dir = self
            .test_images_dir
            .as_deref()
            .ok_or_else(|| Error::Config("test_images_dir is not set".into()))?;
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "test_images_dir is not a directory: {}",
                dir.display()
            )));
        }
        Ok(dir)
    }

    /// Project and version name, required to query status.
    pub fn version_ref(&self) -> Result<VersionRef> {
        Ok(VersionRef {
            project_arn: non_empty(self.project_arn.as_deref(), "project_arn")?.to_string(),
            version_name: non_empty(self.version_name.as_deref(), "version_name")?.to_string(),
        })
    }

    /// Resolves a start or stop up front, so a missing value is reported
    /// before the request is sent. `wait` needs `project_arn` and `version_name`.
    pub fn transition_plan(
        &self,
        transition: Transition,
        wait: Option<WaitOptions>,
    ) -> Result<TransitionPlan> {
        let model_id = self.model_id()?.to_string();
        let wait = match wait {
            Some(options) => Some((self.version_ref()?, options)),
            None => None,
        };
        Ok(TransitionPlan {
            model_id,
            transition,
            wait,
        })
    }

    pub fn display_threshold(&self) -> f32 {
        self.display_threshold.unwrap_or(DEFAULT_DISPLAY_THRESHOLD)
    }

    pub fn min_inference_units(&self) -> i32 {
        self.min_inference_units.unwrap_or(DEFAULT_INFERENCE_UNITS)
    }

    /// Checks everything a detection run needs before any remote call.
    pub fn validate_for_detection(&self) -> Result<()> {
        self.model_id()?;
        self.vocabulary()?;
        self.bucket()?;
        self.images_dir()?;
        if let Some(floor) = self.min_confidence {
            check_percentage(floor, "min_confidence")?;
        }
        check_percentage(self.display_threshold(), "display_threshold")?;
        Ok(())
    }
}

fn non_empty<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!("{} is not set", field))),
    }
}

/// Confidence values are percentages.
pub fn check_percentage(value: f32, field: &str) -> Result<()> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must be within [0, 100], got {}",
            field, value
        )))
    }
}
