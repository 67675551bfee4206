use image::RgbaImage;

/// Texture coordinate wrap behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    EdgeClamp,
    Repeat,
}

/// Sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Bilinear,
}

/// How a texture unit combines with the surface colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Modulate,
    Replace,
}

/// RGBA texture bound to one layer slot of a tile.
#[derive(Debug, Clone)]
pub struct Texture {
    pub label: String,
    pub image: RgbaImage,
    pub wrap: WrapMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub apply: ApplyMode,
}

impl Texture {
    /// Wrap an image with the sampling state every tile layer uses:
    /// edge-clamp, bilinear, modulate.
    pub fn new(label: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            label: label.into(),
            image,
            wrap: WrapMode::EdgeClamp,
            min_filter: FilterMode::Bilinear,
            mag_filter: FilterMode::Bilinear,
            apply: ApplyMode::Modulate,
        }
    }

    /// A fully transparent `size` x `size` texture.
    pub fn transparent(label: impl Into<String>, size: u32) -> Self {
        Self::new(label, RgbaImage::new(size, size))
    }

    /// Force the tile sampling state, whatever the supplier set.
    pub fn with_tile_sampling(mut self) -> Self {
        self.wrap = WrapMode::EdgeClamp;
        self.min_filter = FilterMode::Bilinear;
        self.mag_filter = FilterMode::Bilinear;
        self.apply = ApplyMode::Modulate;
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Bytes held by the pixel buffer.
    pub fn byte_size(&self) -> usize {
        self.image.as_raw().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_texture_is_all_zero() {
        let tex = Texture::transparent("empty", 4);
        assert_eq!(tex.dimensions(), (4, 4));
        assert_eq!(tex.byte_size(), 64);
        assert!(tex.image.as_raw().iter().all(|&b| b == 0));
    }

    #[test]
    fn new_texture_defaults() {
        let tex = Texture::new("layer", RgbaImage::new(2, 2));
        assert_eq!(tex.wrap, WrapMode::EdgeClamp);
        assert_eq!(tex.min_filter, FilterMode::Bilinear);
        assert_eq!(tex.mag_filter, FilterMode::Bilinear);
        assert_eq!(tex.apply, ApplyMode::Modulate);
    }

    #[test]
    fn tile_sampling_overrides_supplier_state() {
        let mut tex = Texture::new("layer", RgbaImage::new(1, 1));
        tex.wrap = WrapMode::Repeat;
        tex.mag_filter = FilterMode::Nearest;
        tex.apply = ApplyMode::Replace;

        let tex = tex.with_tile_sampling();
        assert_eq!(tex.wrap, WrapMode::EdgeClamp);
        assert_eq!(tex.mag_filter, FilterMode::Bilinear);
        assert_eq!(tex.apply, ApplyMode::Modulate);
    }
}
