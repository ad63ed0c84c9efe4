use crate::vulkan::image::SamplerInfo;

/// Decoded pixels, always tightly packed RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl LoadedImage {
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: vec![255; 4],
        }
    }
}

/// A texture slot, an image plus the way it is sampled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedTexture {
    /// Index into the scene images. May point at an image that failed to load.
    pub image: Option<usize>,
    pub sampler: SamplerInfo,
}
