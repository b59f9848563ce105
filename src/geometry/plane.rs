use serde::{Deserialize, Serialize};
use std::fmt;

/// The image plane a ROI belongs to: z-slice and timepoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImagePlane {
    pub z: i32,
    pub t: i32,
}

impl ImagePlane {
    #[inline]
    pub fn new(z: i32, t: i32) -> Self {
        Self { z, t }
    }
}

impl fmt::Display for ImagePlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z={}, t={}", self.z, self.t)
    }
}
