//! Texture-related metadata parsed from file attributes.
//!
//! Files produced by texture tools annotate themselves with a texture
//! format, wrap modes, and camera matrices. The cache parses these once at
//! open time; the sampling engine that interprets them lives elsewhere.

/// Kind of texture a file declares itself to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TexFormat {
    /// Ordinary 2D texture.
    #[default]
    Texture,
    /// 3D (volume) texture.
    Texture3d,
    /// Shadow map.
    Shadow,
    /// Cube-face shadow map.
    CubeFaceShadow,
    /// Volumetric shadow map.
    VolumeShadow,
    /// Latitude-longitude environment map.
    LatLongEnv,
    /// Cube-face environment map.
    CubeFaceEnv,
}

impl TexFormat {
    /// All variants, for attribute-string matching.
    pub const ALL: [TexFormat; 7] = [
        Self::Texture,
        Self::Texture3d,
        Self::Shadow,
        Self::CubeFaceShadow,
        Self::VolumeShadow,
        Self::LatLongEnv,
        Self::CubeFaceEnv,
    ];

    /// The name written into the `textureformat` attribute.
    pub const fn format_name(&self) -> &'static str {
        match self {
            Self::Texture => "Plain Texture",
            Self::Texture3d => "Volume Texture",
            Self::Shadow => "Shadow",
            Self::CubeFaceShadow => "CubeFace Shadow",
            Self::VolumeShadow => "Volume Shadow",
            Self::LatLongEnv => "LatLong Environment",
            Self::CubeFaceEnv => "CubeFace Environment",
        }
    }

    /// The broad category name reported by image-info queries.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Texture => "Plain Texture",
            Self::Texture3d => "Volume Texture",
            Self::Shadow | Self::CubeFaceShadow | Self::VolumeShadow => "Shadow",
            Self::LatLongEnv | Self::CubeFaceEnv => "Environment",
        }
    }

    /// Parses a `textureformat` attribute value.
    pub fn parse(s: &str) -> Option<TexFormat> {
        Self::ALL.iter().copied().find(|f| f.format_name() == s)
    }
}

/// Texture coordinate wrap mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    /// Use whatever the sampler's default is.
    #[default]
    Default,
    /// Black outside [0,1].
    Black,
    /// Clamp to edge.
    Clamp,
    /// Periodic repetition.
    Periodic,
    /// Mirror at edges.
    Mirror,
}

impl WrapMode {
    /// Parses one wrap-mode name; unknown names map to `Default`.
    pub fn parse(s: &str) -> WrapMode {
        match s.trim() {
            "black" => Self::Black,
            "clamp" => Self::Clamp,
            "periodic" => Self::Periodic,
            "mirror" => Self::Mirror,
            _ => Self::Default,
        }
    }
}

/// Parses a `wrapmodes` attribute of the form `"s,t"` or a single mode
/// applying to both directions.
pub fn parse_wrapmodes(s: &str) -> (WrapMode, WrapMode) {
    match s.split_once(',') {
        Some((sw, tw)) => (WrapMode::parse(sw), WrapMode::parse(tw)),
        None => {
            let w = WrapMode::parse(s);
            (w, w)
        }
    }
}

/// Layout of the faces within a cube-face environment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CubeLayout {
    /// Not a cube map, or the layout was unrecognizable.
    #[default]
    Unknown,
    /// Faces packed 3 across, 2 down.
    ThreeByTwo,
    /// Faces stacked 1 across, 6 down.
    OneBySix,
}

/// Multiplies two 4x4 row-major matrices.
pub fn mat4_mul(a: &[f32; 16], b: &[f32; 16]) -> [f32; 16] {
    let mut out = [0.0f32; 16];
    for r in 0..4 {
        for c in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += a[r * 4 + k] * b[k * 4 + c];
            }
            out[r * 4 + c] = sum;
        }
    }
    out
}

/// The 4x4 identity matrix.
pub const MAT4_IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapmode_pairs() {
        assert_eq!(
            parse_wrapmodes("black,clamp"),
            (WrapMode::Black, WrapMode::Clamp)
        );
        assert_eq!(
            parse_wrapmodes("periodic"),
            (WrapMode::Periodic, WrapMode::Periodic)
        );
        assert_eq!(
            parse_wrapmodes("bogus"),
            (WrapMode::Default, WrapMode::Default)
        );
    }

    #[test]
    fn texformat_names_roundtrip() {
        for f in TexFormat::ALL {
            assert_eq!(TexFormat::parse(f.format_name()), Some(f));
        }
        assert_eq!(TexFormat::parse("Not A Format"), None);
    }

    #[test]
    fn type_name_collapses() {
        assert_eq!(TexFormat::CubeFaceShadow.type_name(), "Shadow");
        assert_eq!(TexFormat::LatLongEnv.type_name(), "Environment");
        assert_eq!(TexFormat::Texture.type_name(), "Plain Texture");
    }

    #[test]
    fn identity_multiply() {
        let m: [f32; 16] = std::array::from_fn(|i| i as f32);
        assert_eq!(mat4_mul(&MAT4_IDENTITY, &m), m);
        assert_eq!(mat4_mul(&m, &MAT4_IDENTITY), m);
    }
}
