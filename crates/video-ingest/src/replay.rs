use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use handoff::CancelToken;
use image::imageops::{self, FilterType};
use tracing::debug;

use crate::{CaptureError, Frame, FrameSink, FrameSource};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Replays still images from a directory as if they came from the camera.
///
/// Files are played in name order, which matches the sequence numbers the
/// frame logger writes, so a logged run can be fed straight back in.
pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    width: i32,
    height: i32,
    frame_interval: Duration,
    looping: bool,
}

impl DirectorySource {
    pub fn open(
        dir: impl AsRef<Path>,
        target_size: (i32, i32),
        fps: u32,
        looping: bool,
    ) -> Result<Self, CaptureError> {
        let dir = dir.as_ref().to_path_buf();
        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_image {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::NoFrames {
                uri: dir.display().to_string(),
            });
        }

        let frame_interval = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / fps as f64)
        };

        Ok(Self {
            dir,
            files,
            width: target_size.0,
            height: target_size.1,
            frame_interval,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn load(&self, path: &Path) -> Result<Frame, CaptureError> {
        let mut image = image::open(path)
            .map_err(|source| CaptureError::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();
        if image.width() as i32 != self.width || image.height() as i32 != self.height {
            image = imageops::resize(
                &image,
                self.width as u32,
                self.height as u32,
                FilterType::Triangle,
            );
        }
        Ok(Frame::from_rgb_image(&image, Utc::now().timestamp_millis()))
    }
}

impl FrameSource for DirectorySource {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn run(&mut self, sink: &FrameSink, cancel: &CancelToken) -> Result<(), CaptureError> {
        debug!(
            "replaying {} image(s) from {}",
            self.files.len(),
            self.dir.display()
        );
        loop {
            for path in &self.files {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                let started = Instant::now();
                let frame = self.load(path)?;
                if !sink.push(frame) {
                    return Ok(());
                }
                if let Some(rest) = self.frame_interval.checked_sub(started.elapsed()) {
                    thread::sleep(rest);
                }
            }
            if !self.looping {
                return Ok(());
            }
        }
    }
}
