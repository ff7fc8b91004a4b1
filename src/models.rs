use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};

/// Ordered list of class names. A class ID is the position of its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassVocabulary {
    names: Vec<String>,
}

impl ClassVocabulary {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Reads one class name per line, skipping blank lines.
    pub fn from_txt_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut names = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let name = line.trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
        Ok(Self { names })
    }

    /// Exact-match lookup of a class name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Empty vocabularies and repeated names are configuration errors.
    pub fn validate(&self) -> Result<()> {
        if self.names.is_empty() {
            return Err(Error::Config("class vocabulary is empty".into()));
        }
        for (i, name) in self.names.iter().enumerate() {
            if self.names[..i].contains(name) {
                return Err(Error::Config(format!(
                    "class vocabulary lists {:?} more than once",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for ClassVocabulary {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// Box in coordinates relative to the image size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// One labelled object instance as returned by the detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub name: String,
    /// Percentage, 0-100.
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(name: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            name: name.into(),
            confidence,
            bbox,
        }
    }
}

/// A detection as `(class_id, confidence, x1, y1, x2, y2)` with corner
/// coordinates instead of origin and extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDetection {
    pub class_id: usize,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl NormalizedDetection {
    pub fn as_tuple(&self) -> (usize, f32, f32, f32, f32, f32) {
        (
            self.class_id,
            self.confidence,
            self.x1,
            self.y1,
            self.x2,
            self.y2,
        )
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}
