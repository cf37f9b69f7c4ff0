//! Streaming frame decode of reference videos via FFmpeg rawvideo output.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::frame::RgbFrame;
use crate::probe::{probe_video, VideoInfo};

/// Bytes of FFmpeg stderr kept for error reports.
const STDERR_TAIL_BYTES: usize = 16 * 1024;

/// Reads a video one RGB frame at a time, in presentation order.
///
/// Frames are produced until the stream ends; a trailing partial frame is
/// dropped.
pub struct VideoFrameReader {
    path: PathBuf,
    info: VideoInfo,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    frames_read: u64,
    finished: bool,
}

impl VideoFrameReader {
    /// Probe and start decoding `path` at its display resolution.
    pub async fn open(path: impl AsRef<Path>) -> MediaResult<Self> {
        let path = path.as_ref();
        let info = probe_video(path).await?;

        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        // Output geometry is pinned so every frame is exactly `frame_bytes`.
        let scale = format!("scale={}:{}", info.width, info.height);
        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(path)
            .args(["-vf", &scale, "-pix_fmt", "rgb24", "-f", "rawvideo", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None)
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None)
        })?;
        let stderr = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(drain_stderr(pipe)));

        debug!(
            path = %path.display(),
            width = info.width,
            height = info.height,
            fps = info.fps,
            "Decoding reference video"
        );

        Ok(Self {
            path: path.to_path_buf(),
            info,
            child,
            stdout: BufReader::new(stdout),
            stderr,
            frames_read: 0,
            finished: false,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Next decoded frame, or `None` at end of stream.
    pub async fn next_frame(&mut self) -> MediaResult<Option<RgbFrame>> {
        if self.finished {
            return Ok(None);
        }

        let frame_bytes = self.info.frame_bytes();
        let mut buffer = vec![0u8; frame_bytes];
        let mut filled = 0;
        while filled < frame_bytes {
            let n = self.stdout.read(&mut buffer[filled..]).await.map_err(|e| {
                MediaError::ffmpeg_failed(format!("Failed to read FFmpeg output: {}", e), None, None)
            })?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled < frame_bytes {
            if filled > 0 {
                debug!(path = %self.path.display(), bytes = filled, "Dropping partial trailing frame");
            }
            self.finish().await?;
            return Ok(None);
        }

        self.frames_read += 1;
        RgbFrame::new(self.info.width, self.info.height, buffer).map(Some)
    }

    /// Decode every remaining frame.
    pub async fn read_all(&mut self) -> MediaResult<Vec<RgbFrame>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame().await? {
            frames.push(frame);
        }
        Ok(frames)
    }

    async fn finish(&mut self) -> MediaResult<()> {
        self.finished = true;

        let status = self.child.wait().await.map_err(|e| {
            MediaError::ffmpeg_failed(format!("FFmpeg process error: {}", e), None, None)
        })?;

        let stderr = match self.stderr.take() {
            Some(task) => task.await.unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "FFmpeg stderr task failed");
                String::new()
            }),
            None => String::new(),
        };

        if !status.success() {
            // Frames already produced stay valid; a failure before any frame
            // means the file could not be decoded at all.
            if self.frames_read == 0 {
                return Err(MediaError::ffmpeg_failed(
                    format!("FFmpeg could not decode {}", self.path.display()),
                    Some(stderr),
                    status.code(),
                ));
            }
            warn!(
                path = %self.path.display(),
                exit_code = ?status.code(),
                frames = self.frames_read,
                "FFmpeg exited with an error after partial decode"
            );
        }

        Ok(())
    }
}

/// Read a child's stderr to EOF, keeping only the tail.
///
/// Runs for the whole decode so FFmpeg never blocks on a full stderr pipe.
async fn drain_stderr<R: AsyncRead + Unpin>(mut pipe: R) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                let excess = tail.len().saturating_sub(STDERR_TAIL_BYTES);
                tail.drain(..excess);
            }
            Err(e) => {
                warn!(error = %e, "Failed to read FFmpeg stderr");
                break;
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}
