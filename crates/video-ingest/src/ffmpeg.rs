use std::{
    io::{ErrorKind, Read},
    process::{Child, Command, Stdio},
};

use anyhow::anyhow;
use chrono::Utc;
use handoff::CancelToken;
use tracing::debug;

use crate::{CaptureError, Frame, FrameFormat, FrameSink, FrameSource};

/// Captures frames by piping raw BGR24 video out of an `ffmpeg` child process.
///
/// Works for V4L devices (`/dev/video0`, `0`), RTSP streams and video files.
/// ffmpeg scales every frame to the agreed geometry, so the reader only has to
/// slice fixed-size chunks off stdout.
pub struct FfmpegSource {
    uri: String,
    width: i32,
    height: i32,
    fps: u32,
}

impl FfmpegSource {
    pub fn new(uri: &str, target_size: (i32, i32), fps: u32) -> Self {
        Self {
            uri: uri.to_string(),
            width: target_size.0,
            height: target_size.1,
            fps,
        }
    }

    fn command(&self) -> Command {
        let scale_arg = format!("scale={}:{}", self.width, self.height);
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-hide_banner").arg("-loglevel").arg("error");

        let input = if let Some(index) = parse_device_index(&self.uri) {
            cmd.arg("-f")
                .arg("video4linux2")
                .arg("-framerate")
                .arg(self.fps.to_string())
                .arg("-video_size")
                .arg(format!("{}x{}", self.width, self.height));
            format!("/dev/video{index}")
        } else {
            if self.uri.starts_with("rtsp://") || self.uri.starts_with("rtsps://") {
                cmd.arg("-rtsp_transport")
                    .arg("tcp")
                    .arg("-fflags")
                    .arg("nobuffer")
                    .arg("-flags")
                    .arg("low_delay");
            }
            self.uri.clone()
        };

        cmd.arg("-i")
            .arg(&input)
            .arg("-an")
            .arg("-vf")
            .arg(&scale_arg)
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl FrameSource for FfmpegSource {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn run(&mut self, sink: &FrameSink, cancel: &CancelToken) -> Result<(), CaptureError> {
        let mut child = self.command().spawn().map_err(|err| {
            debug!("ffmpeg spawn failed: {err}");
            CaptureError::Open {
                uri: self.uri.clone(),
            }
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::Other(anyhow!("failed to capture ffmpeg stdout")))?;

        ffmpeg_loop(stdout, child, (self.width, self.height), sink, cancel)
    }
}

fn ffmpeg_loop(
    stdout: impl Read,
    mut child: Child,
    target_size: (i32, i32),
    sink: &FrameSink,
    cancel: &CancelToken,
) -> Result<(), CaptureError> {
    let result = read_frames(stdout, target_size, sink, cancel);
    let _ = child.kill();
    let _ = child.wait();
    result
}

/// Slice fixed-size BGR frames off `stdout` until it ends, the sink closes or
/// `cancel` fires. End of stream is a normal finish.
fn read_frames(
    mut stdout: impl Read,
    target_size: (i32, i32),
    sink: &FrameSink,
    cancel: &CancelToken,
) -> Result<(), CaptureError> {
    let frame_bytes = (target_size.0 as usize) * (target_size.1 as usize) * 3;
    let mut buffer = vec![0u8; frame_bytes];

    while !cancel.is_cancelled() && !sink.is_closed() {
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                let frame = Frame {
                    data: buffer.clone(),
                    width: target_size.0,
                    height: target_size.1,
                    timestamp_ms: Utc::now().timestamp_millis(),
                    format: FrameFormat::Bgr8,
                };
                if !sink.push(frame) {
                    break;
                }
            }
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                debug!("ffmpeg stream ended");
                break;
            }
            Err(err) => return Err(CaptureError::Io(err)),
        }
    }
    Ok(())
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, sync::Arc};

    use handoff::BoundedQueue;

    use super::*;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    #[test]
    fn device_index_from_number_or_path() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("rtsp://cam/stream"), None);
    }

    #[test]
    fn device_command_requests_raw_bgr_at_target_size() {
        let source = FfmpegSource::new("/dev/video0", (320, 240), 30);
        let cmd = source.command();
        let args: Vec<String> = cmd
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert!(args.windows(2).any(|w| w == ["-f", "video4linux2"]));
        assert!(args.windows(2).any(|w| w == ["-vf", "scale=320:240"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "bgr24"]));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn end_of_stream_is_a_normal_finish() {
        let queue = Arc::new(BoundedQueue::new(4));
        let sink = FrameSink::new(queue.clone(), || {});
        // two whole 2x1 frames plus a truncated third
        let bytes: Vec<u8> = (0..15).collect();
        let result = read_frames(Cursor::new(bytes), (2, 1), &sink, &CancelToken::new());
        assert!(result.is_ok());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue().unwrap().data, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn read_errors_other_than_eof_are_reported() {
        let queue = Arc::new(BoundedQueue::new(4));
        let sink = FrameSink::new(queue, || {});
        let result = read_frames(FailingReader, (2, 1), &sink, &CancelToken::new());
        assert!(matches!(result, Err(CaptureError::Io(_))));
    }
}
