//! Raw byte-stream sink
//!
//! Writes I420 frames to a file or standard output, for piping into
//! ffmpeg/ffplay or a virtual-camera bridge:
//!
//! ```text
//! deskcam -d - | ffplay -f rawvideo -pix_fmt yuv420p -video_size WxH -
//! ```

use crate::convert::i420_size;
use crate::sink::{write_full, FramePayload, SinkError};
use log::info;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

enum Output {
    Stdout(io::Stdout),
    File(File),
}

pub struct StreamSink {
    out: Output,
    frame_size: usize,
}

impl StreamSink {
    /// Stream frames to standard output. Rust performs no newline
    /// translation, so the stream stays binary-clean on every platform.
    pub fn stdout(width: u32, height: u32) -> Self {
        info!("vcam: output {}x{} yuv420p -> <stdout>", width, height);
        Self { out: Output::Stdout(io::stdout()), frame_size: i420_size(width, height) }
    }

    /// Create (or truncate) a file and stream frames into it.
    pub fn create(path: &Path, width: u32, height: u32) -> Result<Self, SinkError> {
        let file = File::create(path).map_err(|e| SinkError::Open {
            target: path.display().to_string(),
            source: e,
        })?;
        info!("vcam: output {}x{} yuv420p -> {}", width, height, path.display());
        Ok(Self { out: Output::File(file), frame_size: i420_size(width, height) })
    }

    pub(super) fn deliver(&mut self, payload: FramePayload<'_>) -> Result<(), SinkError> {
        let frame = match payload {
            FramePayload::I420(frame) => frame,
            FramePayload::Bgra(_) => return Err(SinkError::Payload("BGRA")),
        };
        if frame.len() < self.frame_size {
            return Err(SinkError::ShortFrame { expected: self.frame_size, actual: frame.len() });
        }
        let frame = &frame[..self.frame_size];
        let result = match &mut self.out {
            Output::Stdout(out) => {
                let mut lock = out.lock();
                write_full(&mut lock, frame).and_then(|_| lock.flush())
            }
            Output::File(file) => write_full(file, frame),
        };
        result.map_err(SinkError::from_io)
    }
}

#[cfg(test)]
mod tests {
    use super::StreamSink;
    use crate::capture::BgraFrame;
    use crate::sink::{FramePayload, SinkError};
    use std::fs;

    #[test]
    fn writes_exactly_one_frame() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.yuv");
        let mut sink = StreamSink::create(&path, 4, 2).expect("create");

        // One padded byte past the frame must not be written
        let frame = vec![0xABu8; 4 * 2 * 3 / 2 + 1];
        sink.deliver(FramePayload::I420(&frame)).expect("deliver");
        assert_eq!(fs::read(&path).expect("read").len(), 12);
    }

    #[test]
    fn rejects_short_frame_without_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.yuv");
        let mut sink = StreamSink::create(&path, 4, 2).expect("create");

        let short = vec![0u8; 11];
        match sink.deliver(FramePayload::I420(&short)) {
            Err(SinkError::ShortFrame { expected: 12, actual: 11 }) => {}
            other => panic!("expected ShortFrame, got {:?}", other.err()),
        }
        assert_eq!(fs::read(&path).expect("read").len(), 0);
    }

    #[test]
    fn rejects_bgra_payload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.yuv");
        let mut sink = StreamSink::create(&path, 2, 2).expect("create");

        let data = vec![0u8; 16];
        let frame = BgraFrame { data: &data, width: 2, height: 2, stride: 8 };
        assert!(matches!(
            sink.deliver(FramePayload::Bgra(&frame)),
            Err(SinkError::Payload(_))
        ));
    }
}
