use crate::config::Config;
use facekit_core::{
    ArcFaceComparator, BackgroundRemover, CapabilityError, FaceComparator, FaceDetector, FaceRecognizer,
    LandmarkAnnotator, LandmarkPainter, U2NetMatting, Verdict,
};
use image::{DynamicImage, ImageReader, RgbaImage};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] facekit_core::detector::DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] facekit_core::recognizer::RecognizerError),
    #[error("matting error: {0}")]
    Matting(#[from] facekit_core::matting::MattingError),
    #[error("{0}")]
    Capability(#[from] CapabilityError),
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("cannot decode {path}: {source}")]
    Decode { path: PathBuf, source: image::ImageError },
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// The three model-backed capabilities the engine serves.
pub struct Capabilities {
    pub annotator: Box<dyn LandmarkAnnotator>,
    pub remover: Box<dyn BackgroundRemover>,
    pub comparator: Box<dyn FaceComparator>,
}

impl Capabilities {
    /// Load the ONNX-backed implementations from the configured model directory.
    pub fn load(config: &Config) -> Result<Self, EngineError> {
        let scrfd = config.scrfd_model_path();

        let annotator = LandmarkPainter::load(&scrfd)?;
        tracing::info!(path = %scrfd.display(), "landmark annotator ready");

        let comparator = ArcFaceComparator::new(
            FaceDetector::load(&scrfd)?,
            FaceRecognizer::load(&config.arcface_model_path())?,
            config.verify_threshold,
        );
        tracing::info!(threshold = config.verify_threshold, "face comparator ready");

        let remover = U2NetMatting::load(&config.u2net_model_path())?;
        tracing::info!("background remover ready");

        Ok(Self {
            annotator: Box::new(annotator),
            remover: Box::new(remover),
            comparator: Box::new(comparator),
        })
    }
}

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Annotate {
        image: PathBuf,
        reply: Reply<Option<DynamicImage>>,
    },
    RemoveBackground {
        image: PathBuf,
        reply: Reply<RgbaImage>,
    },
    Compare {
        first: PathBuf,
        second: PathBuf,
        reply: Reply<Verdict>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> EngineRequest) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Annotate the image at `image`; `None` when no face was found.
    pub async fn annotate(&self, image: &Path) -> Result<Option<DynamicImage>, EngineError> {
        let image = image.to_path_buf();
        self.call(|reply| EngineRequest::Annotate { image, reply }).await
    }

    /// Remove the background of the image at `image`.
    pub async fn remove_background(&self, image: &Path) -> Result<RgbaImage, EngineError> {
        let image = image.to_path_buf();
        self.call(|reply| EngineRequest::RemoveBackground { image, reply }).await
    }

    /// Compare the faces in two images.
    pub async fn compare(&self, first: &Path, second: &Path) -> Result<Verdict, EngineError> {
        let (first, second) = (first.to_path_buf(), second.to_path_buf());
        self.call(|reply| EngineRequest::Compare { first, second, reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread that owns the capabilities.
///
/// Requests are served one at a time, in arrival order, and always run to
/// completion.
pub fn spawn_engine(capabilities: Capabilities) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let Capabilities {
        mut annotator,
        mut remover,
        mut comparator,
    } = capabilities;

    std::thread::Builder::new()
        .name("facekit-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Annotate { image, reply } => {
                        let result = load_image(&image)
                            .and_then(|img| guarded("annotate", || annotator.annotate(&img)));
                        let _ = reply.send(result);
                    }
                    EngineRequest::RemoveBackground { image, reply } => {
                        let result = load_image(&image)
                            .and_then(|img| guarded("remove_background", || remover.remove_background(&img)));
                        let _ = reply.send(result);
                    }
                    EngineRequest::Compare { first, second, reply } => {
                        let result = load_image(&first)
                            .and_then(|a| Ok((a, load_image(&second)?)))
                            .and_then(|(a, b)| guarded("compare", || comparator.compare(&a, &b)));
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// Run one capability call, turning a panic into a failure of that request
/// so the engine thread keeps serving.
fn guarded<T>(op: &'static str, call: impl FnOnce() -> Result<T, CapabilityError>) -> Result<T, EngineError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => Ok(result?),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(op, panic = %message, "capability panicked");
            Err(CapabilityError::Other(format!("{op} panicked: {message}")).into())
        }
    }
}

/// Decode an image, sniffing the format from its content.
fn load_image(path: &Path) -> Result<DynamicImage, EngineError> {
    let read_err = |source| EngineError::Read { path: path.to_path_buf(), source };
    let decode_err = |source| EngineError::Decode { path: path.to_path_buf(), source };

    ImageReader::open(path)
        .map_err(read_err)?
        .with_guessed_format()
        .map_err(read_err)?
        .decode()
        .map_err(decode_err)
}
