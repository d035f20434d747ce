//! MP4 sink backed by an `ffmpeg` child process.
//!
//! Frames are piped as raw RGB24 over stdin; ffmpeg owns the container and
//! the encoder. The process is spawned on the first frame so a run that fails
//! before producing anything never creates an output file. Encoder
//! diagnostics go to an anonymous temp file, so a chatty encoder can never
//! stall on a full stderr pipe while frames are still being written.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use super::FrameSink;
use crate::frame::{Frame, StreamInfo};

pub struct FfmpegSink {
    output: PathBuf,
    info: StreamInfo,
    ffmpeg_path: String,
    codec: String,
    encoder: Option<Encoder>,
    frames_written: u64,
    finished: bool,
}

struct Encoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: File,
}

impl Encoder {
    fn diagnostics(&mut self) -> String {
        let mut text = String::new();
        if self.stderr.seek(SeekFrom::Start(0)).is_ok() {
            let _ = self.stderr.read_to_string(&mut text);
        }
        text
    }
}

impl FfmpegSink {
    pub fn new(
        output: impl AsRef<Path>,
        info: StreamInfo,
        ffmpeg_path: impl Into<String>,
        codec: impl Into<String>,
    ) -> Self {
        Self {
            output: output.as_ref().to_path_buf(),
            info,
            ffmpeg_path: ffmpeg_path.into(),
            codec: codec.into(),
            encoder: None,
            frames_written: 0,
            finished: false,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn encoder_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-s".into(),
            format!("{}x{}", self.info.width, self.info.height),
            "-r".into(),
            format!("{}", self.info.fps),
            "-i".into(),
            "-".into(),
            "-an".into(),
            "-c:v".into(),
            self.codec.clone(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            self.output.to_string_lossy().into_owned(),
        ]
    }

    fn spawn(&self) -> Result<Encoder> {
        let stderr = tempfile::tempfile().context("create encoder log file")?;
        let child_stderr = stderr.try_clone().context("share encoder log file")?;
        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.encoder_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(child_stderr))
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.ffmpeg_path))?;
        let stdin = child.stdin.take();
        log::debug!(
            "encoding {} ({}x{} @ {} fps, {})",
            self.output.display(),
            self.info.width,
            self.info.height,
            self.info.fps,
            self.codec
        );
        Ok(Encoder {
            child,
            stdin,
            stderr,
        })
    }

    fn remove_output(&self) {
        if !self.output.exists() {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.output) {
            log::warn!("failed to remove partial output {}: {}", self.output.display(), err);
        }
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(anyhow!("sink for {} is already finished", self.output.display()));
        }
        if frame.width != self.info.width || frame.height != self.info.height {
            return Err(anyhow!(
                "frame {} is {}x{}, stream is {}x{}",
                frame.index,
                frame.width,
                frame.height,
                self.info.width,
                self.info.height
            ));
        }
        if self.encoder.is_none() {
            self.encoder = Some(self.spawn()?);
        }
        let stdin = self
            .encoder
            .as_mut()
            .and_then(|encoder| encoder.stdin.as_mut())
            .ok_or_else(|| anyhow!("encoder stdin is closed"))?;
        stdin
            .write_all(frame.pixels())
            .with_context(|| format!("write frame {} to encoder", frame.index))?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let mut encoder = self
            .encoder
            .take()
            .ok_or_else(|| anyhow!("no frames were written to {}", self.output.display()))?;
        // Closing stdin signals end of stream.
        drop(encoder.stdin.take());

        let status = match encoder.child.wait() {
            Ok(status) => status,
            Err(err) => {
                self.remove_output();
                return Err(anyhow::Error::new(err).context("wait for encoder"));
            }
        };
        self.finished = true;
        if !status.success() {
            let stderr = encoder.diagnostics();
            self.remove_output();
            return Err(anyhow!(
                "ffmpeg exited with {}: {}",
                status,
                stderr.trim()
            ));
        }
        log::info!(
            "wrote {} frames to {}",
            self.frames_written,
            self.output.display()
        );
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        let Some(mut encoder) = self.encoder.take() else {
            return;
        };
        drop(encoder.stdin.take());
        let _ = encoder.child.kill();
        let _ = encoder.child.wait();
        self.remove_output();
        log::warn!(
            "discarded unfinished output {} after {} frames",
            self.output.display(),
            self.frames_written
        );
    }
}
