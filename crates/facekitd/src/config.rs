use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Daemon configuration, from command-line flags or `FACEKIT_*` environment variables.
#[derive(Parser, Debug, Clone)]
#[command(name = "facekitd", version, about = "facekit image processing daemon")]
pub struct Config {
    /// Address the HTTP server listens on.
    #[arg(long, env = "FACEKIT_BIND", default_value = "0.0.0.0:5005")]
    pub bind: SocketAddr,
    /// Scratch directory for uploads in flight.
    #[arg(long, env = "FACEKIT_UPLOAD_DIR", default_value = "./uploads/")]
    pub upload_dir: PathBuf,
    /// Directory receiving result images. Never cleaned by the daemon.
    #[arg(long, env = "FACEKIT_RESULT_DIR", default_value = "./results/")]
    pub result_dir: PathBuf,
    /// Directory containing ONNX model files.
    #[arg(long, env = "FACEKIT_MODEL_DIR", default_value_os_t = facekit_core::default_model_dir())]
    pub model_dir: PathBuf,
    /// Cosine distance at or below which two faces are the same person.
    #[arg(long, env = "FACEKIT_VERIFY_THRESHOLD", default_value_t = facekit_core::DEFAULT_VERIFY_THRESHOLD)]
    pub verify_threshold: f32,
    /// Largest accepted request body, in bytes.
    #[arg(long, env = "FACEKIT_MAX_UPLOAD_BYTES", default_value_t = 20 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl Config {
    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }

    /// Path to the U²-Net matting model.
    pub fn u2net_model_path(&self) -> PathBuf {
        self.model_dir.join("u2net.onnx")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "facekitd",
            "--bind",
            "127.0.0.1:8080",
            "--upload-dir",
            "/tmp/up",
            "--model-dir",
            "/opt/models",
            "--verify-threshold",
            "0.4",
        ])
        .unwrap();

        assert_eq!(config.bind, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/up"));
        assert_eq!(config.verify_threshold, 0.4);
        assert_eq!(config.scrfd_model_path(), PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(config.arcface_model_path(), PathBuf::from("/opt/models/w600k_r50.onnx"));
        assert_eq!(config.u2net_model_path(), PathBuf::from("/opt/models/u2net.onnx"));
    }

    #[test]
    fn test_invalid_bind_rejected() {
        assert!(Config::try_parse_from(["facekitd", "--bind", "not-an-address"]).is_err());
    }
}
