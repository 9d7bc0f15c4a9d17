//! # Compression Engine
//!
//! Bounds the byte size of captured images while keeping them usable for
//! downstream analysis.
//!
//! ## Strategy
//!
//! 1. Already under budget → return the input unchanged, byte-identical.
//! 2. If the uncompressed footprint (`w*h*4`) alone exceeds the budget,
//!    shrink pixel dimensions proportionally in ×0.9 steps first — dimension
//!    reduction buys more per step than quality reduction.
//! 3. Step the JPEG quality factor down by ×0.8 per attempt, re-encoding,
//!    until the budget is met, `min_quality` is reached, or `max_attempts`
//!    runs out.
//!
//! The engine always terminates and always hands back a usable image. A
//! budget it could not reach is a logged [`CompressionShortfall`], never a
//! failure of the caller's tick.
//!
//! Size checks read the encoded byte length directly; nothing is re-decoded
//! just to measure it. For base64 transports, [`estimated_bytes_from_base64_len`]
//! converts an encoded string length back to a raw-byte estimate.
//!
//! [`CompressionShortfall`]: crate::error::CaptureError::CompressionShortfall

use std::io::Cursor;

use fast_image_resize as fir;
use fir::images::{TypedImage, TypedImageRef};
use fir::pixels::U8x4;
use fir::{ResizeOptions, Resizer};
use image::codecs::jpeg::JpegEncoder;
use log::{debug, info, warn};

use crate::error::{CaptureError, CaptureResult};
use crate::frame::{CompressedImage, FrameSample, Size};

/// Default floor for the JPEG quality factor.
pub const DEFAULT_MIN_QUALITY: f32 = 0.3;
/// Default bound on quality-reduction re-encodes per image.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Multiplicative step applied to the quality factor per attempt.
const QUALITY_STEP: f32 = 0.8;
/// Multiplicative step applied to each dimension while the raw footprint
/// exceeds the byte budget.
const DIMENSION_STEP: f32 = 0.9;
/// Hard bound on dimension-reduction steps; geometric shrink means this is
/// enough to take any plausible capture below any sane budget.
const MAX_DIMENSION_STEPS: u32 = 64;

/// Raw-byte estimate for a base64-encoded payload of `encoded_len`
/// characters, without decoding it.
pub fn estimated_bytes_from_base64_len(encoded_len: usize) -> usize {
    encoded_len * 3 / 4
}

/// JPEG encoder/re-encoder with bounded size-reduction attempts.
#[derive(Debug, Clone)]
pub struct Compressor {
    pub min_quality: f32,
    pub max_attempts: u32,
}

impl Default for Compressor {
    fn default() -> Self {
        Self {
            min_quality: DEFAULT_MIN_QUALITY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Compressor {
    pub fn new(min_quality: f32, max_attempts: u32) -> Self {
        Self {
            min_quality,
            max_attempts,
        }
    }

    /// Encode a raw frame as JPEG at the given quality factor (0.0–1.0).
    pub fn encode_frame(&self, frame: &FrameSample, quality: f32) -> CaptureResult<CompressedImage> {
        self.encode_rgba(&frame.rgba, frame.size, quality)
    }

    /// Reduce `image` until its encoded size fits `target_bytes`.
    ///
    /// Never fails: on an unreachable target the best attempt is returned,
    /// and on an internal encode/decode error the input itself is returned.
    pub fn compress(&self, image: &CompressedImage, target_bytes: usize) -> CompressedImage {
        if image.byte_len() <= target_bytes {
            return image.clone();
        }
        match self.compress_inner(image, target_bytes) {
            Ok(best) => best,
            Err(err) => {
                warn!("compression failed, keeping original image: {}", err);
                image.clone()
            }
        }
    }

    fn compress_inner(
        &self,
        image: &CompressedImage,
        target_bytes: usize,
    ) -> CaptureResult<CompressedImage> {
        let (mut rgba, mut size) = self.decode_rgba(image)?;

        // Dimension reduction first: when even the uncompressed footprint is
        // over budget, no quality factor can save the encode.
        let mut planned = size;
        let mut steps = 0;
        while planned.rgba_bytes() > target_bytes && steps < MAX_DIMENSION_STEPS {
            planned = planned.scaled_by(DIMENSION_STEP);
            steps += 1;
        }
        if planned != size {
            debug!(
                "shrinking {} to {} over {} steps before quality reduction",
                size, planned, steps
            );
            rgba = self.resize_rgba(&rgba, size, planned)?;
            size = planned;
        }

        let mut quality = image.quality.clamp(self.min_quality, 1.0);
        let mut best: Option<CompressedImage> = None;
        for _attempt in 0..self.max_attempts {
            quality = (quality * QUALITY_STEP).max(self.min_quality);
            let candidate = self.encode_rgba(&rgba, size, quality)?;
            let done = candidate.byte_len() <= target_bytes;
            let floored = quality <= self.min_quality;
            best = Some(candidate);
            if done || floored {
                break;
            }
        }

        // The loop always runs at least once, so `best` is present.
        let best = best.expect("at least one compression attempt");
        if best.byte_len() > target_bytes {
            info!(
                "{}",
                CaptureError::CompressionShortfall {
                    target_bytes,
                    achieved_bytes: best.byte_len(),
                    quality: best.quality,
                }
            );
        }
        Ok(best)
    }

    /// Scale `image` so its longest edge fits `max_dimension`, then compress
    /// it toward `target_bytes`. Used for thumbnail derivation.
    pub fn shrink_to_fit(
        &self,
        image: &CompressedImage,
        max_dimension: u32,
        target_bytes: usize,
    ) -> CaptureResult<CompressedImage> {
        let fitted = image.size.fit_within(max_dimension);
        let scaled = if fitted == image.size {
            image.clone()
        } else {
            let (rgba, size) = self.decode_rgba(image)?;
            let resized = self.resize_rgba(&rgba, size, fitted)?;
            self.encode_rgba(&resized, fitted, image.quality)?
        };
        Ok(self.compress(&scaled, target_bytes))
    }

    fn encode_rgba(&self, rgba: &[u8], size: Size, quality: f32) -> CaptureResult<CompressedImage> {
        if size.is_empty() || rgba.len() != size.rgba_bytes() {
            return Err(CaptureError::encoding("encode", "empty or mismatched pixel buffer"));
        }
        // JPEG carries no alpha channel; strip it.
        let mut rgb = Vec::with_capacity(size.w as usize * size.h as usize * 3);
        for px in rgba.chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
        }
        let q = (quality.clamp(0.01, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8;
        let mut out = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut out, q)
            .encode(&rgb, size.w, size.h, image::ExtendedColorType::Rgb8)
            .map_err(|e| CaptureError::encoding("encode", e))?;
        Ok(CompressedImage {
            jpeg: out.into_inner(),
            size,
            quality,
        })
    }

    fn decode_rgba(&self, image: &CompressedImage) -> CaptureResult<(Vec<u8>, Size)> {
        let decoded = image::load_from_memory(&image.jpeg)
            .map_err(|e| CaptureError::encoding("decode", e))?;
        let rgba = decoded.to_rgba8();
        let size = Size::new(rgba.width(), rgba.height());
        Ok((rgba.into_raw(), size))
    }

    fn resize_rgba(&self, rgba: &[u8], from: Size, to: Size) -> CaptureResult<Vec<u8>> {
        let src = TypedImageRef::<U8x4>::from_buffer(from.w, from.h, rgba)
            .map_err(|e| CaptureError::encoding("resize", e))?;
        let mut dst_buf = vec![0u8; to.rgba_bytes()];
        let mut dst = TypedImage::<U8x4>::from_buffer(to.w, to.h, &mut dst_buf)
            .map_err(|e| CaptureError::encoding("resize", e))?;
        let opts = ResizeOptions::new().use_alpha(false);
        Resizer::new()
            .resize_typed::<U8x4>(&src, &mut dst, &opts)
            .map_err(|e| CaptureError::encoding("resize", e))?;
        Ok(dst_buf)
    }
}
