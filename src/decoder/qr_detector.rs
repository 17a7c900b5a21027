// SPDX-License-Identifier: GPL-3.0-only

//! QR code detection
//!
//! Converts camera frames to grayscale, downscales them and runs rqrr on a
//! blocking thread. Live decoding is throttled to the configured rate and
//! always looks at the most recent frame, so a slow decode never builds up
//! a backlog.

use super::{DecodeCallbacks, DecodeEngine};
use crate::backends::camera::types::{CameraFrame, FrameReceiver, PixelFormat};
use crate::backends::camera::StreamHandle;
use crate::config::ScanConfig;
use crate::errors::{CameraError, DecodeFailure};
use async_trait::async_trait;
use image::GrayImage;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// QR decode engine backed by rqrr
pub struct QrDecodeEngine {
    /// Frames are downscaled so neither side exceeds this
    max_dimension: u32,
    /// Minimum time between two decode attempts
    interval: Duration,
    /// Running live decode, if any
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for QrDecodeEngine {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl QrDecodeEngine {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            max_dimension: config.max_decode_dimension.max(1),
            interval: config.decode_interval(),
            task: Mutex::new(None),
        }
    }

    fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for QrDecodeEngine {
    fn drop(&mut self) {
        if let Some(task) = self.take_task() {
            task.abort();
        }
    }
}

#[async_trait]
impl DecodeEngine for QrDecodeEngine {
    fn start_continuous_decode(
        &self,
        stream: &StreamHandle,
        callbacks: DecodeCallbacks,
    ) -> Result<(), CameraError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CameraError::Unknown(format!("decoder needs a runtime: {}", e)))?;

        let frames = stream.frames();
        let max_dimension = self.max_dimension;
        let interval = self.interval;
        let task = runtime.spawn(decode_loop(frames, callbacks, interval, max_dimension));

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            debug!("Replacing running decode loop");
            previous.abort();
        }

        info!(
            stream = %stream.id(),
            interval_ms = interval.as_millis() as u64,
            max_dimension,
            "Continuous QR decoding started"
        );
        Ok(())
    }

    fn stop_continuous_decode(&self) {
        if let Some(task) = self.take_task() {
            task.abort();
            info!("Continuous QR decoding stopped");
        }
    }

    async fn decode_still_image(&self, image: &[u8]) -> Result<String, DecodeFailure> {
        let bytes = image.to_vec();
        let max_dimension = self.max_dimension;

        tokio::task::spawn_blocking(move || decode_still_sync(&bytes, max_dimension))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Still image decode task panicked");
                Err(DecodeFailure::NoCodeFound)
            })
    }
}

/// Analyse the latest frame of a stream until the stream ends or the task
/// is aborted
async fn decode_loop(
    mut frames: FrameReceiver,
    callbacks: DecodeCallbacks,
    interval: Duration,
    max_dimension: u32,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if frames.changed().await.is_err() {
            debug!("Frame channel closed, stream lost");
            callbacks.stream_lost();
            return;
        }
        let Some(frame) = frames.borrow_and_update().clone() else {
            continue;
        };

        let result = tokio::task::spawn_blocking(move || detect_sync(&frame, max_dimension)).await;
        match result {
            Ok(Some(text)) => callbacks.matched(text),
            Ok(None) => callbacks.missed(),
            Err(e) => warn!(error = %e, "QR detection task panicked"),
        }
    }
}

/// Synchronous QR detection (runs in blocking task)
fn detect_sync(frame: &CameraFrame, max_dimension: u32) -> Option<String> {
    let start = std::time::Instant::now();

    let luma = frame_to_luma(frame)?;
    let luma = fit_within(luma, max_dimension);
    let conversion_time = start.elapsed();

    let result = decode_luma(&luma);
    trace!(
        width = luma.width(),
        height = luma.height(),
        conversion_ms = conversion_time.as_millis() as u64,
        total_ms = start.elapsed().as_millis() as u64,
        found = result.is_some(),
        "QR detection complete"
    );
    result
}

fn decode_still_sync(bytes: &[u8], max_dimension: u32) -> Result<String, DecodeFailure> {
    let image = image::load_from_memory(bytes).map_err(|e| {
        debug!(error = %e, len = bytes.len(), "Cannot read still image");
        DecodeFailure::UnreadableImage(e.to_string())
    })?;
    let luma = image.to_luma8();
    debug!(
        width = luma.width(),
        height = luma.height(),
        "Decoding still image"
    );

    // Photos are usually far larger than camera frames; try full resolution
    // first, then a downscaled copy which helps with blurry or noisy shots.
    if let Some(text) = decode_luma(&luma) {
        return Ok(text);
    }
    if luma.width() > max_dimension || luma.height() > max_dimension {
        if let Some(text) = decode_luma(&fit_within(luma, max_dimension)) {
            return Ok(text);
        }
    }
    Err(DecodeFailure::NoCodeFound)
}

/// Run rqrr over a grayscale image and return the first decodable grid
fn decode_luma(luma: &GrayImage) -> Option<String> {
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        luma.width() as usize,
        luma.height() as usize,
        |x, y| luma.get_pixel(x as u32, y as u32).0[0],
    );

    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_meta, content)) => {
                debug!(len = content.len(), "Decoded QR code");
                return Some(content);
            }
            Err(e) => debug!(error = %e, "Failed to decode QR grid"),
        }
    }
    None
}

/// Convert a frame to a tightly packed grayscale image
fn frame_to_luma(frame: &CameraFrame) -> Option<GrayImage> {
    let width = frame.width;
    let height = frame.height;
    if width == 0 || height == 0 {
        return None;
    }

    let data = match frame.format {
        PixelFormat::Gray8 => copy_rows_without_stride(frame, 1, |px| px[0]),
        // Y0 U Y1 V: every even byte is a luma sample
        PixelFormat::Yuyv => copy_rows_without_stride(frame, 2, |px| px[0]),
        PixelFormat::Rgba8 => copy_rows_without_stride(frame, 4, |px| rgb_to_luma(px[0], px[1], px[2])),
        PixelFormat::Mjpeg => {
            return match image::load_from_memory_with_format(&frame.data, image::ImageFormat::Jpeg)
            {
                Ok(img) => Some(img.to_luma8()),
                Err(e) => {
                    trace!(error = %e, "Dropping undecodable MJPEG frame");
                    None
                }
            };
        }
    };

    GrayImage::from_raw(width, height, data)
}

/// Copy one luma sample per pixel, dropping stride padding
///
/// Truncated buffers leave the missing rows black.
fn copy_rows_without_stride(
    frame: &CameraFrame,
    bytes_per_pixel: usize,
    sample: impl Fn(&[u8]) -> u8,
) -> Vec<u8> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let stride = (frame.stride as usize).max(width * bytes_per_pixel);

    let mut result = Vec::with_capacity(width * height);

    for y in 0..height {
        let row_start = y * stride;
        let row_end = row_start + width * bytes_per_pixel;
        match frame.data.get(row_start..row_end) {
            Some(row) => result.extend(row.chunks_exact(bytes_per_pixel).map(&sample)),
            None => result.resize(result.len() + width, 0),
        }
    }

    result
}

/// BT.601 luma
fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

/// Downscale so neither side exceeds `max_dimension`, keeping aspect ratio
fn fit_within(luma: GrayImage, max_dimension: u32) -> GrayImage {
    let (width, height) = luma.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return luma;
    }

    let scale = (width as f32 / max_dimension as f32).max(height as f32 / max_dimension as f32);
    let new_width = ((width as f32 / scale) as u32).clamp(1, max_dimension);
    let new_height = ((height as f32 / scale) as u32).clamp(1, max_dimension);
    downscale_luma(&luma, new_width, new_height)
}

/// Downscale a grayscale image using bilinear interpolation
fn downscale_luma(src: &GrayImage, dst_width: u32, dst_height: u32) -> GrayImage {
    let src_width = src.width() as usize;
    let src_height = src.height() as usize;

    let x_ratio = src_width as f32 / dst_width as f32;
    let y_ratio = src_height as f32 / dst_height as f32;

    let get = |px: usize, py: usize| -> f32 { src.get_pixel(px as u32, py as u32).0[0] as f32 };

    GrayImage::from_fn(dst_width, dst_height, |x, y| {
        let src_x = x as f32 * x_ratio;
        let src_y = y as f32 * y_ratio;

        let x0 = (src_x as usize).min(src_width - 1);
        let y0 = (src_y as usize).min(src_height - 1);
        let x1 = (x0 + 1).min(src_width - 1);
        let y1 = (y0 + 1).min(src_height - 1);

        let x_frac = src_x - x0 as f32;
        let y_frac = src_y - y0 as f32;

        let value = get(x0, y0) * (1.0 - x_frac) * (1.0 - y_frac)
            + get(x1, y0) * x_frac * (1.0 - y_frac)
            + get(x0, y1) * (1.0 - x_frac) * y_frac
            + get(x1, y1) * x_frac * y_frac;

        image::Luma([value as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{CameraFacing, frame_channel};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Instant;

    fn frame(width: u32, height: u32, format: PixelFormat, stride: u32, data: Vec<u8>) -> CameraFrame {
        CameraFrame {
            width,
            height,
            data: Arc::from(data.as_slice()),
            format,
            stride,
            captured_at: Instant::now(),
        }
    }

    fn png_bytes(img: GrayImage) -> Vec<u8> {
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_gray_without_stride() {
        let data = vec![
            10, 20, 0, 0, // row 0 + padding
            30, 40, 0, 0, // row 1 + padding
        ];
        let luma = frame_to_luma(&frame(2, 2, PixelFormat::Gray8, 4, data)).unwrap();
        assert_eq!(luma.as_raw(), &vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_yuyv_takes_luma_bytes() {
        // Y0 U Y1 V for a 2x1 image
        let data = vec![50, 128, 200, 128];
        let luma = frame_to_luma(&frame(2, 1, PixelFormat::Yuyv, 4, data)).unwrap();
        assert_eq!(luma.as_raw(), &vec![50, 200]);
    }

    #[test]
    fn test_rgba_luma() {
        let data = vec![
            255, 255, 255, 255, // white
            0, 0, 0, 255, // black
        ];
        let luma = frame_to_luma(&frame(2, 1, PixelFormat::Rgba8, 8, data)).unwrap();
        assert_eq!(luma.as_raw(), &vec![255, 0]);
    }

    #[test]
    fn test_truncated_frame_is_padded() {
        let luma = frame_to_luma(&frame(2, 2, PixelFormat::Gray8, 2, vec![1, 2])).unwrap();
        assert_eq!(luma.as_raw(), &vec![1, 2, 0, 0]);
    }

    #[test]
    fn test_empty_frame_is_skipped() {
        assert!(frame_to_luma(&frame(0, 0, PixelFormat::Gray8, 0, Vec::new())).is_none());
    }

    #[test]
    fn test_fit_within_keeps_aspect() {
        let img = GrayImage::new(1280, 720);
        let scaled = fit_within(img, 640);
        assert_eq!(scaled.dimensions(), (640, 360));

        let small = fit_within(GrayImage::new(320, 240), 640);
        assert_eq!(small.dimensions(), (320, 240));
    }

    #[test]
    fn test_downscale_luma_gradient() {
        let img = GrayImage::from_raw(4, 1, vec![0, 85, 170, 255]).unwrap();
        let result = downscale_luma(&img, 2, 1);
        assert!(result.get_pixel(0, 0).0[0] < 100);
        assert!(result.get_pixel(1, 0).0[0] > 150);
    }

    #[tokio::test]
    async fn test_still_image_without_code() {
        let engine = QrDecodeEngine::default();
        let blank = png_bytes(GrayImage::from_pixel(64, 64, image::Luma([255])));
        assert_eq!(
            engine.decode_still_image(&blank).await,
            Err(DecodeFailure::NoCodeFound)
        );
    }

    #[tokio::test]
    async fn test_still_image_garbage() {
        let engine = QrDecodeEngine::default();
        let result = engine.decode_still_image(b"definitely not an image").await;
        assert!(matches!(result, Err(DecodeFailure::UnreadableImage(_))));
    }

    #[tokio::test]
    async fn test_live_decode_reports_misses_and_stream_loss() {
        let engine = QrDecodeEngine::new(&ScanConfig {
            decode_fps: 100,
            ..ScanConfig::default()
        });
        let (tx, rx) = frame_channel();
        let stream = StreamHandle::new(CameraFacing::User, "test", rx);

        let misses = Arc::new(AtomicU32::new(0));
        let lost = Arc::new(AtomicBool::new(false));
        let callbacks = {
            let misses = Arc::clone(&misses);
            let lost = Arc::clone(&lost);
            DecodeCallbacks::new(
                |_| panic!("blank frame cannot match"),
                move || {
                    misses.fetch_add(1, Ordering::SeqCst);
                },
                move || lost.store(true, Ordering::SeqCst),
            )
        };
        engine.start_continuous_decode(&stream, callbacks).unwrap();

        let blank = frame(32, 32, PixelFormat::Gray8, 32, vec![255; 32 * 32]);
        tx.send_replace(Some(Arc::new(blank)));
        for _ in 0..200 {
            if misses.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(misses.load(Ordering::SeqCst) > 0);

        drop(tx);
        for _ in 0..200 {
            if lost.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(lost.load(Ordering::SeqCst));
        engine.stop_continuous_decode();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let engine = QrDecodeEngine::default();
        engine.stop_continuous_decode();
        engine.stop_continuous_decode();
    }
}
