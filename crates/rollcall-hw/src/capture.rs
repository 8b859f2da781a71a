//! Capture sources — V4L2 devices and MJPEG network streams.

use crate::frame::{self, Frame};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const V4L_WIDTH: u32 = 640;
const V4L_HEIGHT: u32 = 480;
const MJPEG_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Cap on buffered stream bytes while hunting for a JPEG frame.
const MJPEG_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("unable to open {source_name}: {reason}")]
    OpenFailed { source_name: String, reason: String },
    #[error("frame read failed: {0}")]
    ReadFailed(String),
    #[error("frame decode failed: {0}")]
    DecodeFailed(String),
}

/// Parsed camera source: a local device index or a stream URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSource {
    DeviceIndex(u32),
    Url(String),
}

impl CameraSource {
    /// Parse the stored source string: all-digits means a local device
    /// index, anything else is treated as a stream URL.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<u32>() {
            Ok(index) => CameraSource::DeviceIndex(index),
            Err(_) => CameraSource::Url(raw.trim().to_string()),
        }
    }
}

impl std::fmt::Display for CameraSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraSource::DeviceIndex(i) => write!(f, "/dev/video{i}"),
            CameraSource::Url(url) => f.write_str(url),
        }
    }
}

/// A stream of frames from one camera. `Ok(None)` signals a clean end
/// of stream; errors are per-read and may be transient.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError>;
    fn describe(&self) -> String;
}

/// Open the appropriate backend for a camera source. Fails fast with a
/// descriptive error when the source cannot be opened.
pub fn open_source(source: &CameraSource) -> Result<Box<dyn FrameSource>, CaptureError> {
    match source {
        CameraSource::DeviceIndex(index) => Ok(Box::new(V4lSource::open(*index)?)),
        CameraSource::Url(url) => Ok(Box::new(MjpegSource::open(url)?)),
    }
}

/// V4L2 camera opened by device index (`/dev/video{N}`).
// Manual Debug impl below: `v4l::Device` does not implement Debug.
pub struct V4lSource {
    device: Device,
    device_path: String,
    width: u32,
    height: u32,
    sequence: u64,
}

impl std::fmt::Debug for V4lSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4lSource")
            .field("device_path", &self.device_path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

impl V4lSource {
    pub fn open(index: u32) -> Result<Self, CaptureError> {
        let device_path = format!("/dev/video{index}");
        if !Path::new(&device_path).exists() {
            return Err(CaptureError::DeviceNotFound(device_path));
        }

        let device = Device::with_path(&device_path).map_err(|e| CaptureError::OpenFailed {
            source_name: device_path.clone(),
            reason: e.to_string(),
        })?;

        let caps = device.query_caps().map_err(|e| CaptureError::OpenFailed {
            source_name: device_path.clone(),
            reason: format!("failed to query capabilities: {e}"),
        })?;

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CaptureError::OpenFailed {
                source_name: device_path,
                reason: "device does not support video capture".into(),
            });
        }

        let mut fmt = device.format().map_err(|e| CaptureError::OpenFailed {
            source_name: device_path.clone(),
            reason: format!("failed to get format: {e}"),
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = V4L_WIDTH;
        fmt.height = V4L_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| CaptureError::OpenFailed {
            source_name: device_path.clone(),
            reason: format!("failed to set format: {e}"),
        })?;

        if negotiated.fourcc != FourCC::new(b"YUYV") {
            return Err(CaptureError::OpenFailed {
                source_name: device_path,
                reason: format!("unsupported pixel format {:?} (need YUYV)", negotiated.fourcc),
            });
        }

        tracing::info!(
            device = %device_path,
            driver = %caps.driver,
            width = negotiated.width,
            height = negotiated.height,
            "opened camera"
        );

        Ok(Self {
            device,
            device_path,
            width: negotiated.width,
            height: negotiated.height,
            sequence: 0,
        })
    }
}

impl FrameSource for V4lSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| CaptureError::ReadFailed(format!("failed to create mmap stream: {e}")))?;

        let (buf, _meta) = stream
            .next()
            .map_err(|e| CaptureError::ReadFailed(format!("failed to dequeue buffer: {e}")))?;

        let rgb = frame::yuyv_to_rgb(buf, self.width, self.height)
            .map_err(|e| CaptureError::DecodeFailed(e.to_string()))?;

        self.sequence += 1;
        Ok(Some(Frame::new(rgb, self.width, self.height, self.sequence)))
    }

    fn describe(&self) -> String {
        self.device_path.clone()
    }
}

/// MJPEG-over-HTTP network camera. Scans the multipart body for JPEG
/// frame boundaries and decodes each part with the `image` crate.
pub struct MjpegSource {
    url: String,
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
    sequence: u64,
}

impl MjpegSource {
    pub fn open(url: &str) -> Result<Self, CaptureError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(MJPEG_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| CaptureError::OpenFailed {
                source_name: url.to_string(),
                reason: e.to_string(),
            })?;

        let response = client.get(url).send().map_err(|e| CaptureError::OpenFailed {
            source_name: url.to_string(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(CaptureError::OpenFailed {
                source_name: url.to_string(),
                reason: format!("HTTP status {}", response.status()),
            });
        }

        tracing::info!(url, "opened MJPEG stream");

        Ok(Self {
            url: url.to_string(),
            reader: Box::new(response),
            buffer: Vec::new(),
            sequence: 0,
        })
    }

    /// Pull the next complete JPEG (SOI..EOI) out of the byte stream.
    /// Returns `Ok(None)` once the stream ends.
    fn next_jpeg(&mut self) -> Result<Option<Vec<u8>>, CaptureError> {
        let mut chunk = [0u8; 16 * 1024];

        loop {
            if let Some(jpeg) = extract_jpeg(&mut self.buffer) {
                return Ok(Some(jpeg));
            }
            if self.buffer.len() > MJPEG_MAX_FRAME_BYTES {
                return Err(CaptureError::DecodeFailed(
                    "no JPEG frame boundary within buffer limit".into(),
                ));
            }

            let n = self
                .reader
                .read(&mut chunk)
                .map_err(|e| CaptureError::ReadFailed(e.to_string()))?;
            if n == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

impl FrameSource for MjpegSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(jpeg) = self.next_jpeg()? else {
            return Ok(None);
        };

        let decoded = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg)
            .map_err(|e| CaptureError::DecodeFailed(e.to_string()))?
            .to_rgb8();

        let (width, height) = decoded.dimensions();
        self.sequence += 1;
        Ok(Some(Frame::new(decoded.into_raw(), width, height, self.sequence)))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Find a complete JPEG (FFD8 .. FFD9) in `buffer`, draining consumed
/// bytes. Bytes before the SOI marker (multipart headers) are discarded.
fn extract_jpeg(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let soi = find_marker(buffer, 0, [0xFF, 0xD8])?;
    let eoi = find_marker(buffer, soi + 2, [0xFF, 0xD9])?;

    let jpeg = buffer[soi..eoi + 2].to_vec();
    buffer.drain(..eoi + 2);
    Some(jpeg)
}

fn find_marker(buffer: &[u8], from: usize, marker: [u8; 2]) -> Option<usize> {
    if buffer.len() < from + 2 {
        return None;
    }
    (from..buffer.len() - 1).find(|&i| buffer[i] == marker[0] && buffer[i + 1] == marker[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_index() {
        assert_eq!(CameraSource::parse("0"), CameraSource::DeviceIndex(0));
        assert_eq!(CameraSource::parse(" 3 "), CameraSource::DeviceIndex(3));
    }

    #[test]
    fn test_parse_source_url() {
        assert_eq!(
            CameraSource::parse("http://10.0.0.5/stream"),
            CameraSource::Url("http://10.0.0.5/stream".into())
        );
        assert_eq!(
            CameraSource::parse("rtsp://cam/live"),
            CameraSource::Url("rtsp://cam/live".into())
        );
    }

    #[test]
    fn test_extract_jpeg_with_multipart_preamble() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(b"--boundary\r\nContent-Type: image/jpeg\r\n\r\n");
        buffer.extend_from_slice(&[0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9]);
        buffer.extend_from_slice(b"\r\n--boundary");

        let jpeg = extract_jpeg(&mut buffer).unwrap();
        assert_eq!(jpeg, vec![0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9]);
        // Trailing boundary bytes stay buffered for the next frame.
        assert_eq!(buffer, b"\r\n--boundary");
    }

    #[test]
    fn test_extract_jpeg_incomplete_frame() {
        let mut buffer = vec![0xFF, 0xD8, 0x01, 0x02];
        assert!(extract_jpeg(&mut buffer).is_none());
        // Nothing consumed until the frame completes.
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_extract_jpeg_back_to_back_frames() {
        let mut buffer = vec![0xFF, 0xD8, 0xAA, 0xFF, 0xD9, 0xFF, 0xD8, 0xBB, 0xFF, 0xD9];
        let first = extract_jpeg(&mut buffer).unwrap();
        assert_eq!(first, vec![0xFF, 0xD8, 0xAA, 0xFF, 0xD9]);
        let second = extract_jpeg(&mut buffer).unwrap();
        assert_eq!(second, vec![0xFF, 0xD8, 0xBB, 0xFF, 0xD9]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_open_missing_device_fails_fast() {
        // Index far beyond any real machine's device count.
        let err = V4lSource::open(9999).unwrap_err();
        match err {
            CaptureError::DeviceNotFound(path) => assert_eq!(path, "/dev/video9999"),
            other => panic!("expected DeviceNotFound, got {other:?}"),
        }
    }
}
