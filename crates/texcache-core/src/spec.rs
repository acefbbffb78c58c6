//! Image specification.
//!
//! [`ImageSpec`] is the "header" for one resolution level (subimage) of an
//! image: where its pixel data lives in the image plane, how large the full
//! display window is, how it is tiled, how many channels it has, what the
//! native channel type is, and any named metadata.
//!
//! # Data vs. full extents
//!
//! The `x/y/z` origin and `width/height/depth` describe the region that
//! actually has pixel data; the `full_*` fields describe the nominal
//! display window. For ordinary textures the two coincide.
//!
//! # Tiles
//!
//! `tile_width/tile_height/tile_depth` give the tile lattice. A spec with
//! zero tile dimensions describes a scanline-oriented file; consumers that
//! require tiles rewrite these to a synthetic lattice.

use crate::attrs::Attrs;
use crate::format::PixelType;

/// Description of one subimage: geometry, tiling, channels, metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSpec {
    /// X origin of the pixel-data window.
    pub x: i32,
    /// Y origin of the pixel-data window.
    pub y: i32,
    /// Z origin of the pixel-data window (0 for 2D images).
    pub z: i32,
    /// Pixel-data width.
    pub width: u32,
    /// Pixel-data height.
    pub height: u32,
    /// Pixel-data depth (1 for 2D images).
    pub depth: u32,
    /// X origin of the full/display window.
    pub full_x: i32,
    /// Y origin of the full/display window.
    pub full_y: i32,
    /// Z origin of the full/display window.
    pub full_z: i32,
    /// Full/display window width.
    pub full_width: u32,
    /// Full/display window height.
    pub full_height: u32,
    /// Full/display window depth.
    pub full_depth: u32,
    /// Tile width; 0 means the file is scanline-oriented.
    pub tile_width: u32,
    /// Tile height; 0 means the file is scanline-oriented.
    pub tile_height: u32,
    /// Tile depth; 0 means the file is scanline-oriented.
    pub tile_depth: u32,
    /// Number of channels per pixel.
    pub nchannels: u32,
    /// Native channel data type.
    pub format: PixelType,
    /// Named metadata attributes.
    pub attrs: Attrs,
}

impl ImageSpec {
    /// Creates a spec for a 2D image with data and full windows coinciding
    /// at the origin, untiled.
    pub fn new(width: u32, height: u32, nchannels: u32, format: PixelType) -> Self {
        Self {
            x: 0,
            y: 0,
            z: 0,
            width,
            height,
            depth: 1,
            full_x: 0,
            full_y: 0,
            full_z: 0,
            full_width: width,
            full_height: height,
            full_depth: 1,
            tile_width: 0,
            tile_height: 0,
            tile_depth: 0,
            nchannels,
            format,
            attrs: Attrs::new(),
        }
    }

    /// Whether the spec describes a tiled layout.
    #[inline]
    pub fn is_tiled(&self) -> bool {
        self.tile_width != 0 && self.tile_height != 0
    }

    /// Whether the spec describes a 3D (volumetric) image.
    #[inline]
    pub fn is_volume(&self) -> bool {
        self.depth > 1
    }

    /// Bytes per channel value at the given type.
    #[inline]
    pub fn channel_bytes(&self, ty: PixelType) -> usize {
        ty.size()
    }

    /// Bytes per pixel at the given type.
    #[inline]
    pub fn pixel_bytes(&self, ty: PixelType) -> usize {
        self.nchannels as usize * ty.size()
    }

    /// Bytes per scanline of the pixel-data window at the given type.
    #[inline]
    pub fn scanline_bytes(&self, ty: PixelType) -> usize {
        self.width as usize * self.pixel_bytes(ty)
    }

    /// Number of pixels in one tile.
    #[inline]
    pub fn tile_pixels(&self) -> usize {
        self.tile_width as usize * self.tile_height as usize * self.tile_depth.max(1) as usize
    }

    /// Bytes in one tile at the given type.
    #[inline]
    pub fn tile_bytes(&self, ty: PixelType) -> usize {
        self.tile_pixels() * self.pixel_bytes(ty)
    }

    /// Number of pixels in the whole pixel-data window.
    #[inline]
    pub fn image_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth.max(1) as u64
    }

    /// Bytes in the whole pixel-data window at the given type.
    #[inline]
    pub fn image_bytes(&self, ty: PixelType) -> u64 {
        self.image_pixels() * self.pixel_bytes(ty) as u64
    }
}

impl std::fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}x{} {}ch {}",
            self.width, self.height, self.depth, self.nchannels, self.format
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_helpers() {
        let mut spec = ImageSpec::new(256, 128, 4, PixelType::UInt8);
        spec.tile_width = 64;
        spec.tile_height = 64;
        spec.tile_depth = 1;

        assert_eq!(spec.pixel_bytes(PixelType::UInt8), 4);
        assert_eq!(spec.pixel_bytes(PixelType::Float), 16);
        assert_eq!(spec.scanline_bytes(PixelType::UInt8), 1024);
        assert_eq!(spec.tile_pixels(), 64 * 64);
        assert_eq!(spec.tile_bytes(PixelType::UInt8), 64 * 64 * 4);
        assert_eq!(spec.image_bytes(PixelType::UInt8), 256 * 128 * 4);
    }

    #[test]
    fn tiled_predicate() {
        let mut spec = ImageSpec::new(300, 300, 3, PixelType::UInt8);
        assert!(!spec.is_tiled());
        spec.tile_width = 64;
        spec.tile_height = 64;
        spec.tile_depth = 1;
        assert!(spec.is_tiled());
        assert!(!spec.is_volume());
    }

    #[test]
    fn zero_depth_tile_counts_as_one() {
        let mut spec = ImageSpec::new(64, 64, 1, PixelType::Float);
        spec.tile_width = 64;
        spec.tile_height = 64;
        spec.tile_depth = 0;
        assert_eq!(spec.tile_pixels(), 64 * 64);
    }

    #[test]
    fn display() {
        let spec = ImageSpec::new(1920, 1080, 3, PixelType::Half);
        assert_eq!(format!("{spec}"), "1920x1080x1 3ch half");
    }
}
