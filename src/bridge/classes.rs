//! Fully qualified names of the foreign classes this crate touches.

pub const PATH_OBJECT: &str = "qupath.lib.objects.PathObject";
pub const ROOT_OBJECT: &str = "qupath.lib.objects.PathRootObject";
pub const ANNOTATION: &str = "qupath.lib.objects.PathAnnotationObject";
pub const DETECTION: &str = "qupath.lib.objects.PathDetectionObject";
pub const TILE: &str = "qupath.lib.objects.PathTileObject";
pub const TMA_CORE: &str = "qupath.lib.objects.TMACoreObject";
pub const HIERARCHY: &str = "qupath.lib.objects.hierarchy.PathObjectHierarchy";

pub const PATH_CLASS: &str = "qupath.lib.objects.classes.PathClass";

pub const PIXEL_CALIBRATION: &str = "qupath.lib.images.servers.PixelCalibration";
pub const PROJECT_ENTRY: &str = "qupath.lib.projects.DefaultProjectImageEntry";

pub const ROI: &str = "qupath.lib.roi.interfaces.ROI";
pub const POINTS_ROI: &str = "qupath.lib.roi.PointsROI";
pub const LINE_ROI: &str = "qupath.lib.roi.LineROI";
pub const POLYLINE_ROI: &str = "qupath.lib.roi.PolylineROI";
pub const POLYGON_ROI: &str = "qupath.lib.roi.PolygonROI";
pub const RECTANGLE_ROI: &str = "qupath.lib.roi.RectangleROI";
pub const GEOMETRY_ROI: &str = "qupath.lib.roi.GeometryROI";

/// Direct superclass of each known class, for `is_instance` checks.
pub(crate) fn superclass(class: &str) -> Option<&'static str> {
    match class {
        ROOT_OBJECT | ANNOTATION | DETECTION | TMA_CORE => Some(PATH_OBJECT),
        TILE => Some(DETECTION),
        POINTS_ROI | LINE_ROI | POLYLINE_ROI | POLYGON_ROI | RECTANGLE_ROI | GEOMETRY_ROI => {
            Some(ROI)
        }
        _ => None,
    }
}
