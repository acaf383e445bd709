//! Capture device backed by an audio file on disk.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use practest_core::model::Capture;
use practest_core::traits::{ActiveCapture, CaptureDevice};

/// Plays a pre-recorded answer in place of a microphone.
///
/// Opening the device reads the file; a missing or unreadable file is
/// reported the same way a denied microphone would be.
pub struct FileCaptureDevice {
    path: PathBuf,
    mime_type: String,
}

impl FileCaptureDevice {
    pub fn new(path: PathBuf, mime_type: Option<String>) -> Self {
        let mime_type = mime_type.unwrap_or_else(|| guess_mime(&path).to_string());
        Self { path, mime_type }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

#[async_trait]
impl CaptureDevice for FileCaptureDevice {
    async fn open(&self) -> anyhow::Result<Box<dyn ActiveCapture>> {
        let data = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        anyhow::ensure!(!data.is_empty(), "{} is empty", self.path.display());
        tracing::debug!(bytes = data.len(), path = %self.path.display(), "audio source opened");
        Ok(Box::new(FileRecording {
            capture: Capture::new(data, self.mime_type.clone()),
        }))
    }
}

struct FileRecording {
    capture: Capture,
}

impl ActiveCapture for FileRecording {
    fn finish(self: Box<Self>) -> anyhow::Result<Capture> {
        Ok(self.capture)
    }
}

/// Mime type for common audio extensions.
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "webm" => "audio/webm",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_from_extension() {
        assert_eq!(guess_mime(Path::new("a.WEBM")), "audio/webm");
        assert_eq!(guess_mime(Path::new("answer.opus")), "audio/ogg");
        assert_eq!(guess_mime(Path::new("answer.m4a")), "audio/mp4");
        assert_eq!(guess_mime(Path::new("answer")), "application/octet-stream");
    }

    #[tokio::test]
    async fn open_reads_file_and_missing_file_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answer.wav");
        std::fs::write(&path, b"RIFF0000WAVE").unwrap();

        let device = FileCaptureDevice::new(path, None);
        let capture = device.open().await.unwrap().finish().unwrap();
        assert_eq!(capture.mime_type, "audio/wav");
        assert_eq!(capture.data, b"RIFF0000WAVE");

        let missing = FileCaptureDevice::new(dir.path().join("none.webm"), None);
        assert!(missing.open().await.is_err());
    }
}
