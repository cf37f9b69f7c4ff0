//! Lesson catalog and learning roadmap.
//!
//! The catalog is the configuration the pipeline consumes per lesson: which
//! reference video it uses, where the cached embedding lives, which
//! collection's model scores it and how strict the match must be.
//!
//! ```json
//! {
//!   "collections": [{
//!     "id": "family",
//!     "name": "Family",
//!     "model_file": "models/family-embedded.onnx",
//!     "video_dir": "public/Family_video2",
//!     "embedding_dir": "Family/reference_embedding2",
//!     "threshold": 0.5,
//!     "target_shape": "(120, 100, 3)"
//!   }],
//!   "lessons": [{
//!     "id": "17",
//!     "collection_id": "family",
//!     "chapter": "Greetings",
//!     "video_filename": "01-Greetings-Hello 2.mp4"
//!   }]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::embedding::Threshold;
use crate::ids::{CollectionId, LessonId};
use crate::landmark::{COORDS_PER_POINT, SEQUENCE_FRAMES, TOTAL_POINTS};

/// Suffix appended to a video stem to name its reference artifact.
pub const EMBEDDING_FILE_SUFFIX: &str = "_embedding.npy";

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid collection {collection}: {message}")]
    InvalidCollection {
        collection: CollectionId,
        message: String,
    },

    #[error("Invalid target shape '{0}': expected (frames, 100, 3)")]
    InvalidTargetShape(String),

    #[error("Lesson {lesson} references unknown collection {collection}")]
    UnknownCollection {
        lesson: LessonId,
        collection: CollectionId,
    },

    #[error("Duplicate lesson id {0}")]
    DuplicateLesson(LessonId),

    #[error("Invalid lesson {lesson}: {message}")]
    InvalidLesson { lesson: LessonId, message: String },

    #[error("Lesson not found: {0}")]
    LessonNotFound(String),
}

/// Model input shape `(frames, points, coords)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TargetShape {
    pub frames: usize,
    pub points: usize,
    pub coords: usize,
}

impl TargetShape {
    /// Parse a tuple string such as `"(120, 100, 3)"`.
    ///
    /// Point and coordinate widths must match the fixed landmark layout.
    pub fn parse(s: &str) -> CatalogResult<Self> {
        let invalid = || CatalogError::InvalidTargetShape(s.to_string());

        let dims = s
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(',')
            .map(|part| part.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        match dims.as_slice() {
            [frames, points, coords]
                if *frames > 0 && *points == TOTAL_POINTS && *coords == COORDS_PER_POINT =>
            {
                Ok(Self {
                    frames: *frames,
                    points: *points,
                    coords: *coords,
                })
            }
            _ => Err(invalid()),
        }
    }
}

impl Default for TargetShape {
    fn default() -> Self {
        Self {
            frames: SEQUENCE_FRAMES,
            points: TOTAL_POINTS,
            coords: COORDS_PER_POINT,
        }
    }
}

impl std::fmt::Display for TargetShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.frames, self.points, self.coords)
    }
}

fn default_target_shape() -> String {
    TargetShape::default().to_string()
}

/// One embedding model and the lessons it scores.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct CollectionConfig {
    pub id: CollectionId,

    #[validate(length(min = 1))]
    pub name: String,

    /// ONNX embedding model for this collection.
    pub model_file: PathBuf,

    /// Directory holding the reference videos.
    pub video_dir: PathBuf,

    /// Directory holding `<stem>_embedding.npy` artifacts.
    pub embedding_dir: PathBuf,

    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub threshold: f32,

    #[serde(default = "default_target_shape")]
    pub target_shape: String,
}

impl CollectionConfig {
    pub fn threshold(&self) -> CatalogResult<Threshold> {
        Threshold::new(self.threshold).map_err(|e| CatalogError::InvalidCollection {
            collection: self.id.clone(),
            message: e.to_string(),
        })
    }

    pub fn target_shape(&self) -> CatalogResult<TargetShape> {
        TargetShape::parse(&self.target_shape)
    }

    /// Public URL directory, the last component of `video_dir`.
    pub fn public_dir(&self) -> String {
        self.video_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// One lesson: a reference video inside a collection chapter.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct LessonEntry {
    pub id: LessonId,
    pub collection_id: CollectionId,

    #[validate(length(min = 1))]
    pub chapter: String,

    #[validate(length(min = 1))]
    pub video_filename: String,
}

impl LessonEntry {
    pub fn label(&self) -> String {
        clean_label(&self.video_filename)
    }
}

/// Lesson entry as presented in the roadmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapLesson {
    pub id: LessonId,
    pub name: String,
    pub path: String,
    pub embedding: PathBuf,
    pub collection_id: CollectionId,
}

/// Chapters keyed `"<collection>-<chapter>"`, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Roadmap {
    pub chapters: Vec<(String, Vec<RoadmapLesson>)>,
}

impl Roadmap {
    pub fn chapter(&self, key: &str) -> Option<&[RoadmapLesson]> {
        self.chapters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, lessons)| lessons.as_slice())
    }
}

/// Full lesson catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Catalog {
    pub collections: Vec<CollectionConfig>,
    pub lessons: Vec<LessonEntry>,
}

impl Catalog {
    /// Parse and validate a catalog document.
    pub fn from_json_str(json: &str) -> CatalogResult<Self> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Read, parse and validate a catalog file.
    pub fn load(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Check collection settings and lesson references.
    pub fn validate(&self) -> CatalogResult<()> {
        for collection in &self.collections {
            collection
                .validate()
                .map_err(|e| CatalogError::InvalidCollection {
                    collection: collection.id.clone(),
                    message: e.to_string(),
                })?;
            collection.threshold()?;
            collection.target_shape()?;
        }

        let mut seen = HashSet::new();
        for lesson in &self.lessons {
            lesson.validate().map_err(|e| CatalogError::InvalidLesson {
                lesson: lesson.id.clone(),
                message: e.to_string(),
            })?;
            if !seen.insert(&lesson.id) {
                return Err(CatalogError::DuplicateLesson(lesson.id.clone()));
            }
            if self.collection(&lesson.collection_id).is_none() {
                return Err(CatalogError::UnknownCollection {
                    lesson: lesson.id.clone(),
                    collection: lesson.collection_id.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn collection(&self, id: &CollectionId) -> Option<&CollectionConfig> {
        self.collections.iter().find(|c| &c.id == id)
    }

    pub fn lesson(&self, id: &LessonId) -> Option<&LessonEntry> {
        self.lessons.iter().find(|l| &l.id == id)
    }

    /// Collection owning a lesson.
    pub fn lesson_collection(&self, lesson: &LessonEntry) -> CatalogResult<&CollectionConfig> {
        self.collection(&lesson.collection_id)
            .ok_or_else(|| CatalogError::UnknownCollection {
                lesson: lesson.id.clone(),
                collection: lesson.collection_id.clone(),
            })
    }

    /// Find a lesson by its public video path (`/<video dir>/<filename>`).
    pub fn lesson_by_public_path(&self, public_path: &str) -> Option<&LessonEntry> {
        self.lessons.iter().find(|lesson| {
            self.collection(&lesson.collection_id)
                .map(|c| public_video_path(c, lesson) == public_path)
                .unwrap_or(false)
        })
    }

    pub fn video_path(&self, lesson: &LessonEntry) -> CatalogResult<PathBuf> {
        let collection = self.lesson_collection(lesson)?;
        Ok(collection.video_dir.join(&lesson.video_filename))
    }

    pub fn embedding_path(&self, lesson: &LessonEntry) -> CatalogResult<PathBuf> {
        let collection = self.lesson_collection(lesson)?;
        Ok(collection
            .embedding_dir
            .join(embedding_file_name(&lesson.video_filename)))
    }

    /// Group lessons into chapters for display.
    ///
    /// Chapters follow collection order, then first appearance; lessons
    /// inside a chapter are sorted by video filename.
    pub fn roadmap(&self) -> Roadmap {
        let mut chapters: Vec<(String, Vec<&LessonEntry>)> = Vec::new();

        for collection in &self.collections {
            for lesson in self
                .lessons
                .iter()
                .filter(|l| l.collection_id == collection.id)
            {
                let key = format!("{}-{}", collection.id, lesson.chapter);
                match chapters.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, lessons)) => lessons.push(lesson),
                    None => chapters.push((key, vec![lesson])),
                }
            }
        }

        let chapters = chapters
            .into_iter()
            .map(|(key, mut lessons)| {
                lessons.sort_by(|a, b| a.video_filename.cmp(&b.video_filename));
                let lessons = lessons
                    .into_iter()
                    .filter_map(|lesson| {
                        let collection = self.collection(&lesson.collection_id)?;
                        Some(RoadmapLesson {
                            id: lesson.id.clone(),
                            name: lesson.label(),
                            path: public_video_path(collection, lesson),
                            embedding: collection
                                .embedding_dir
                                .join(embedding_file_name(&lesson.video_filename)),
                            collection_id: collection.id.clone(),
                        })
                    })
                    .collect();
                (key, lessons)
            })
            .collect();

        Roadmap { chapters }
    }
}

fn public_video_path(collection: &CollectionConfig, lesson: &LessonEntry) -> String {
    format!("/{}/{}", collection.public_dir(), lesson.video_filename)
}

/// Video filename without directories, cut at the first `.`.
pub fn video_stem(filename: &str) -> &str {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    base.split('.').next().unwrap_or(base)
}

/// Artifact filename for a reference video: `<stem>_embedding.npy`.
pub fn embedding_file_name(video_filename: &str) -> String {
    format!("{}{}", video_stem(video_filename), EMBEDDING_FILE_SUFFIX)
}

/// Human-readable lesson label from a video filename.
///
/// Keeps the segment after the last `-`, drops the extension and any
/// trailing take number: `"03-Family-Mother 2.mp4"` becomes `"Mother"`.
pub fn clean_label(video_filename: &str) -> String {
    let raw = video_filename.rsplit('-').next().unwrap_or(video_filename);
    let raw = raw.split('.').next().unwrap_or(raw);

    let without_digits = raw.trim_end_matches(|c: char| c.is_ascii_digit());
    if without_digits.len() == raw.len() {
        raw.to_string()
    } else {
        without_digits.trim_end().to_string()
    }
}
