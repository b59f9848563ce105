use serde::{Deserialize, Serialize};

use crate::bridge::{classes, ForeignRef, Session, Value};
use crate::error::PathMirrorError;
use crate::geometry::{Calibrated, Coord, Pixel};

/// Unit label QuPath uses for micrometres.
pub const MICROMETER: &str = "µm";

/// Physical size of one full-resolution pixel.
///
/// Used only to report measurements in physical units; stored ROI
/// coordinates are always pixels. An image without a calibration is
/// measured in pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PixelCalibration {
    pixel_width: f64,
    pixel_height: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    z_spacing: Option<f64>,

    unit: String,
}

fn positive(value: f64, what: &str) -> Result<(), PathMirrorError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PathMirrorError::InvalidCalibration(format!(
            "{} must be a positive finite number, got {}",
            what, value
        )))
    }
}

impl PixelCalibration {
    /// Creates a calibration.
    ///
    /// # Errors
    /// `InvalidCalibration` if a size is not positive and finite or the unit
    /// is blank.
    pub fn new(
        pixel_width: f64,
        pixel_height: f64,
        unit: impl Into<String>,
    ) -> Result<Self, PathMirrorError> {
        let calibration = Self {
            pixel_width,
            pixel_height,
            z_spacing: None,
            unit: unit.into(),
        };
        calibration.validate()?;
        Ok(calibration)
    }

    /// A calibration in micrometres.
    pub fn microns(pixel_width: f64, pixel_height: f64) -> Result<Self, PathMirrorError> {
        Self::new(pixel_width, pixel_height, MICROMETER)
    }

    pub fn with_z_spacing(mut self, z_spacing: f64) -> Result<Self, PathMirrorError> {
        positive(z_spacing, "z spacing")?;
        self.z_spacing = Some(z_spacing);
        Ok(self)
    }

    pub fn pixel_width(&self) -> f64 {
        self.pixel_width
    }

    pub fn pixel_height(&self) -> f64 {
        self.pixel_height
    }

    pub fn z_spacing(&self) -> Option<f64> {
        self.z_spacing
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Checks every value; deserialized calibrations are not checked until
    /// this is called.
    pub fn validate(&self) -> Result<(), PathMirrorError> {
        positive(self.pixel_width, "pixel width")?;
        positive(self.pixel_height, "pixel height")?;
        if let Some(z) = self.z_spacing {
            positive(z, "z spacing")?;
        }
        if self.unit.trim().is_empty() {
            return Err(PathMirrorError::InvalidCalibration(
                "unit must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Scales a pixel coordinate into physical units.
    #[inline]
    pub fn to_calibrated(&self, c: &Coord<Pixel>) -> Coord<Calibrated> {
        Coord::new(c.x * self.pixel_width, c.y * self.pixel_height)
    }

    pub(crate) fn to_foreign(&self, session: &Session) -> Result<ForeignRef, PathMirrorError> {
        session.construct(
            classes::PIXEL_CALIBRATION,
            &[
                self.pixel_width.into(),
                self.pixel_height.into(),
                self.z_spacing.into(),
                self.unit.as_str().into(),
            ],
        )
    }

    pub(crate) fn from_foreign(
        session: &Session,
        handle: ForeignRef,
    ) -> Result<Self, PathMirrorError> {
        let get = |method: &str| session.call(handle, method, &[]);
        let z_spacing = match get("getZSpacing")? {
            Value::Null => None,
            v => Some(v.as_f64("PixelCalibration.getZSpacing")?),
        };
        let calibration = Self {
            pixel_width: get("getPixelWidth")?.as_f64("PixelCalibration.getPixelWidth")?,
            pixel_height: get("getPixelHeight")?.as_f64("PixelCalibration.getPixelHeight")?,
            z_spacing,
            unit: get("getUnit")?.as_str("PixelCalibration.getUnit")?.to_string(),
        };
        calibration.validate()?;
        Ok(calibration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_values() {
        for (w, h) in [(0.0, 1.0), (1.0, -0.5), (f64::NAN, 1.0), (1.0, f64::INFINITY)] {
            let err = PixelCalibration::microns(w, h).unwrap_err();
            assert!(matches!(err, PathMirrorError::InvalidCalibration(_)));
        }
        assert!(PixelCalibration::new(1.0, 1.0, "  ").is_err());
        assert!(PixelCalibration::microns(1.0, 1.0)
            .unwrap()
            .with_z_spacing(0.0)
            .is_err());
    }

    #[test]
    fn test_calibrated_coordinates() {
        let calibration = PixelCalibration::microns(0.5, 0.25).unwrap();
        let c = calibration.to_calibrated(&Coord::new(10.0, 10.0));
        assert_eq!((c.x, c.y), (5.0, 2.5));
    }

    #[test]
    fn test_manifest_layout() {
        let calibration = PixelCalibration::microns(0.5, 0.5)
            .unwrap()
            .with_z_spacing(2.0)
            .unwrap();
        let json = serde_json::to_value(&calibration).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"pixelWidth": 0.5, "pixelHeight": 0.5, "zSpacing": 2.0, "unit": "µm"})
        );
        let back: PixelCalibration = serde_json::from_value(json).unwrap();
        assert_eq!(back, calibration);
    }

    #[test]
    fn test_foreign_round_trip() {
        let session = Session::in_memory().unwrap();
        let calibration = PixelCalibration::new(0.25, 0.5, "mm").unwrap();
        let handle = calibration.to_foreign(&session).unwrap();
        assert_eq!(
            PixelCalibration::from_foreign(&session, handle).unwrap(),
            calibration
        );
    }
}
