// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cover image normalizer: decode the configured source image, flatten any
// alpha channel onto white, and re-encode as JPEG at a fixed quality. Uses the
// `image` crate.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use deckblatt_core::error::{DeckblattError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use tracing::{debug, info, instrument};

/// Quality the source service has always encoded covers with.
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Background used when flattening transparent pixels.
const BACKGROUND: [u8; 3] = [255, 255, 255];

static SHARED_COVER: OnceLock<Arc<CoverImage>> = OnceLock::new();

/// Encoding of the normalized cover bytes. Only one canonical form exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Jpeg,
}

impl ImageEncoding {
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// The fixed cover, normalized once and read-only afterwards.
///
/// Cheap to share: wrap it in an `Arc` and hand clones to request handlers.
/// Nothing mutates it after construction, so concurrent reads need no locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    bytes: Vec<u8>,
    encoding: ImageEncoding,
    width: u32,
    height: u32,
}

impl CoverImage {
    // -- Construction ---------------------------------------------------------

    /// Decode the image at `path` and normalize it.
    ///
    /// Fails with `ImageLoad` if the file is missing or not a decodable image.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), quality))]
    pub fn normalize(path: impl AsRef<Path>, quality: u8) -> Result<Self> {
        let path_ref = path.as_ref();
        let img = image::open(path_ref).map_err(|err| {
            DeckblattError::ImageLoad(format!("failed to open {}: {}", path_ref.display(), err))
        })?;
        info!(
            width = img.width(),
            height = img.height(),
            has_alpha = img.color().has_alpha(),
            "Cover source loaded"
        );
        Self::from_dynamic(img, quality)
    }

    /// Normalize an already-decoded image.
    pub fn from_dynamic(image: DynamicImage, quality: u8) -> Result<Self> {
        let rgb = flatten_alpha(image);
        let (width, height) = rgb.dimensions();
        let bytes = encode_jpeg(&rgb, quality)?;
        debug!(width, height, encoded_bytes = bytes.len(), "Cover normalized");
        Ok(Self {
            bytes,
            encoding: ImageEncoding::Jpeg,
            width,
            height,
        })
    }

    /// The process-wide cover, normalized on first use.
    ///
    /// Later calls return the cached instance and ignore their arguments.
    pub fn shared(path: impl AsRef<Path>, quality: u8) -> Result<Arc<Self>> {
        if let Some(cover) = SHARED_COVER.get() {
            return Ok(Arc::clone(cover));
        }
        let cover = Self::normalize(path, quality)?;
        Ok(Arc::clone(SHARED_COVER.get_or_init(|| Arc::new(cover))))
    }

    // -- Accessors ------------------------------------------------------------

    /// Encoded JPEG bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn encoding(&self) -> ImageEncoding {
        self.encoding
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    // -- Derived output -------------------------------------------------------

    /// Render a JPEG preview whose longest side is at most `max_side` pixels.
    ///
    /// Images already within bounds are re-encoded at their own size.
    #[instrument(skip(self), fields(max_side, quality))]
    pub fn thumbnail(&self, max_side: u32, quality: u8) -> Result<Vec<u8>> {
        let decoded = image::load_from_memory(&self.bytes).map_err(|err| {
            DeckblattError::ImageEncode(format!("failed to decode normalized cover: {}", err))
        })?;
        let scaled = if self.width <= max_side && self.height <= max_side {
            decoded
        } else {
            decoded.thumbnail(max_side, max_side)
        };
        debug!(
            width = scaled.width(),
            height = scaled.height(),
            "Thumbnail rendered"
        );
        encode_jpeg(&scaled.to_rgb8(), quality)
    }
}

/// Drop the alpha channel, compositing translucent pixels over white.
fn flatten_alpha(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let image::Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = u32::from(a);
        let blend = |channel: u8, background: u8| -> u8 {
            let mixed = u32::from(channel) * alpha + u32::from(background) * (255 - alpha);
            ((mixed + 127) / 255) as u8
        };
        Rgb([
            blend(r, BACKGROUND[0]),
            blend(g, BACKGROUND[1]),
            blend(b, BACKGROUND[2]),
        ])
    })
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|err| DeckblattError::ImageEncode(format!("JPEG encoding failed: {}", err)))?;
    Ok(buffer)
}
