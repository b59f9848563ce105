use std::fmt;

/// An opaque RGB display color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Decodes a packed `0xAARRGGBB` integer (QuPath's `colorRGB`).
    /// The alpha byte is ignored.
    pub fn from_packed(packed: i32) -> Self {
        let v = packed as u32;
        Self::new((v >> 16) as u8, (v >> 8) as u8, v as u8)
    }

    /// Encodes as a packed `0xAARRGGBB` integer with full alpha.
    pub fn to_packed(self) -> i32 {
        (0xFF00_0000u32 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32) as i32
    }

    /// A stable color derived from a class name (FNV-1a over its bytes).
    pub fn for_name(name: &str) -> Self {
        let hash = name.bytes().fold(0x811c_9dc5u32, |h, b| {
            (h ^ b as u32).wrapping_mul(0x0100_0193)
        });
        Self::new((hash >> 16) as u8, (hash >> 8) as u8, hash as u8)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}
