//! ONNX Runtime pose-estimation engine.
//!
//! Expects a holistic keypoint model exported with:
//! - input: NHWC `f32` image in `[0, 1]`, `[1, S, S, 3]`
//! - `hand_landmarks`: `[N, 21, 3]`
//! - `handedness`: `[N]`, class index per hand (0 = primary)
//! - `pose_landmarks`: `[P, 33, 3]`
//! - `face_landmarks`: `[F, 478, 3]`
//!
//! A zero leading dimension means nothing was detected. Coordinates are
//! image-relative.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::Path;
use std::sync::Mutex;

use hearme_models::{HandSide, Landmark};
use image::imageops::FilterType;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{DynValue, Tensor, Value};
use tracing::{debug, info};

use crate::engine::{
    HandDetection, PoseDetections, PoseEngine, ENGINE_FACE_POINTS, ENGINE_HAND_POINTS,
    ENGINE_POSE_POINTS,
};
use crate::error::{MediaError, MediaResult};
use crate::frame::RgbFrame;

/// Default square input edge in pixels.
pub const DEFAULT_INPUT_SIZE: u32 = 256;

/// Pose engine backed by a holistic ONNX model.
pub struct OrtPoseEngine {
    session: Mutex<Session>,
    input_size: u32,
}

impl OrtPoseEngine {
    /// Load the engine model. Fails with [`MediaError::EngineLoad`].
    pub fn load(model_path: &Path) -> MediaResult<Self> {
        Self::load_with_input_size(model_path, DEFAULT_INPUT_SIZE)
    }

    pub fn load_with_input_size(model_path: &Path, input_size: u32) -> MediaResult<Self> {
        if !model_path.exists() {
            return Err(MediaError::engine_load(model_path, "model file not found"));
        }

        let session = create_session(model_path, "pose engine")
            .map_err(|reason| MediaError::engine_load(model_path, reason))?;

        info!(
            model_path = %model_path.display(),
            input_size,
            "Pose engine initialized"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_size,
        })
    }

    /// Resize to the model input and normalize to `[0, 1]`, NHWC.
    fn preprocess(&self, frame: &RgbFrame) -> MediaResult<Value> {
        let image = frame.to_image()?;
        let size = self.input_size;
        let resized = image::imageops::resize(&image, size, size, FilterType::Triangle);

        let data: Vec<f32> = resized
            .into_raw()
            .into_iter()
            .map(|v| v as f32 / 255.0)
            .collect();

        let shape = vec![1usize, size as usize, size as usize, 3];
        Tensor::from_array((shape, data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::internal(format!("Failed to create tensor: {}", e)))
    }
}

impl PoseEngine for OrtPoseEngine {
    fn detect(&self, frame: &RgbFrame) -> MediaResult<PoseDetections> {
        let input = self.preprocess(frame)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ORT run failed: {e}")))?;

        let output = |name: &str| {
            outputs
                .get(name)
                .ok_or_else(|| MediaError::detection_failed(format!("Missing {name} tensor")))
                .and_then(read_tensor)
        };

        let hands = output("hand_landmarks")?;
        let handedness = output("handedness")?;
        let pose = output("pose_landmarks")?;
        let face = output("face_landmarks")?;

        let detections = PoseDetections {
            hands: parse_hands(&hands, &handedness)?,
            pose: split_instances(&pose, ENGINE_POSE_POINTS)?.into_iter().next(),
            face: split_instances(&face, ENGINE_FACE_POINTS)?.into_iter().next(),
        };

        debug!(
            hands = detections.hands.len(),
            pose = detections.pose.is_some(),
            face = detections.face.is_some(),
            "Pose detection completed"
        );

        Ok(detections)
    }
}

/// Copy an `f32` tensor out of the session outputs.
fn read_tensor(value: &DynValue) -> MediaResult<Vec<f32>> {
    let (_, data) = value
        .try_extract_tensor::<f32>()
        .map_err(|e| MediaError::detection_failed(format!("Failed to extract tensor: {e}")))?;
    Ok(data.to_vec())
}

/// Split a flat `[K, points, 3]` buffer into `K` landmark lists.
fn split_instances(data: &[f32], points: usize) -> MediaResult<Vec<Vec<Landmark>>> {
    let stride = points * 3;
    if data.len() % stride != 0 {
        return Err(MediaError::detection_failed(format!(
            "Landmark tensor of {} values is not a multiple of {} points",
            data.len(),
            points
        )));
    }

    Ok(data
        .chunks_exact(stride)
        .map(|instance| {
            instance
                .chunks_exact(3)
                .map(|c| Landmark::new(c[0], c[1], c[2]))
                .collect()
        })
        .collect())
}

fn parse_hands(landmarks: &[f32], handedness: &[f32]) -> MediaResult<Vec<HandDetection>> {
    let hands = split_instances(landmarks, ENGINE_HAND_POINTS)?;
    if hands.len() != handedness.len() {
        return Err(MediaError::detection_failed(format!(
            "{} hands but {} handedness labels",
            hands.len(),
            handedness.len()
        )));
    }

    Ok(hands
        .into_iter()
        .zip(handedness)
        .map(|(landmarks, &class)| HandDetection {
            side: HandSide::from_class_index(class.round() as i64),
            landmarks,
        })
        .collect())
}

/// Create an ONNX Runtime session with automatic execution provider selection.
///
/// Shared by the pose engine and the embedding models. Errors are returned
/// as plain reasons so callers can attach their own load context.
pub(crate) fn create_session(model_path: &Path, purpose: &str) -> Result<Session, String> {
    let model_bytes =
        std::fs::read(model_path).map_err(|e| format!("Failed to read model file: {}", e))?;

    let builder = Session::builder()
        .map_err(|e| format!("Failed to create session builder: {}", e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| format!("Failed to set optimization level: {}", e))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!(purpose, "Using CUDA execution provider");
                return Ok(session);
            }
        }
        debug!(purpose, "CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!(purpose, "Using CoreML execution provider");
                return Ok(session);
            }
        }
        debug!(purpose, "CoreML execution provider not available, using CPU");
    }

    debug!(purpose, "Using CPU execution provider");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| format!("Failed to load ONNX model: {}", e))
}
