//! facekit-core: face landmarks, face verification and background removal.
//!
//! SCRFD for face detection, ArcFace for recognition and U²-Net for matting,
//! all running through ONNX Runtime on CPU. The daemon only sees the
//! capability traits in [`capability`].

pub mod alignment;
pub mod annotate;
pub mod capability;
pub mod detector;
pub mod matting;
pub mod recognizer;
pub mod types;
pub mod verify;

pub use annotate::LandmarkPainter;
pub use capability::{BackgroundRemover, CapabilityError, FaceComparator, LandmarkAnnotator};
pub use detector::FaceDetector;
pub use matting::U2NetMatting;
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Embedding, FacialArea, FacialAreas, Verdict};
pub use verify::{ArcFaceComparator, DEFAULT_VERIFY_THRESHOLD};

/// Default directory for the ONNX model files.
pub fn default_model_dir() -> std::path::PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        });
    data_dir.join("facekit/models")
}
