/// A geographic position in fixed-precision integer coordinates.
///
/// Both components are degrees scaled by 10⁷, so the full value range of
/// an `i32` comfortably covers ±180°/±90° with ~1.1 cm of precision at
/// the equator. All geographic math on this type is exact integer
/// arithmetic; floating point only appears in the convenience accessors.
///
/// The reserved value `i32::MIN` in both components marks an undefined
/// location (a deleted node has no coordinates).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Location {
    lon: i32,
    lat: i32,
}

/// Sentinel component value for undefined locations.
const UNDEFINED: i32 = i32::MIN;

impl Location {
    /// Scaled units per degree: 10⁷.
    pub const COORDINATE_PRECISION: i64 = 10_000_000;

    /// Build a location from scaled integer coordinates.
    #[must_use]
    pub fn new(lon: i32, lat: i32) -> Self {
        Self { lon, lat }
    }

    /// The undefined location.
    #[must_use]
    pub fn undefined() -> Self {
        Self {
            lon: UNDEFINED,
            lat: UNDEFINED,
        }
    }

    /// True unless this is the undefined sentinel.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.lon != UNDEFINED || self.lat != UNDEFINED
    }

    /// Longitude in scaled units (degrees × 10⁷).
    #[must_use]
    pub fn lon(&self) -> i32 {
        self.lon
    }

    /// Latitude in scaled units (degrees × 10⁷).
    #[must_use]
    pub fn lat(&self) -> i32 {
        self.lat
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn lon_degrees(&self) -> f64 {
        f64::from(self.lon) / Self::COORDINATE_PRECISION as f64
    }

    /// Latitude in degrees.
    #[must_use]
    pub fn lat_degrees(&self) -> f64 {
        f64::from(self.lat) / Self::COORDINATE_PRECISION as f64
    }
}

/// The error geometry consumers raise when an operation needs a defined
/// location and the entity has none. The decoder itself never fails on
/// an undefined location — deleted nodes legitimately carry one — but
/// every downstream geometry factory shares this kind.
#[derive(Debug, thiserror::Error)]
#[error("location is undefined")]
pub struct InvalidLocation;

/// An axis-aligned box in [`Location`] coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub bottom_left: Location,
    pub top_right: Location,
}

impl BoundingBox {
    /// An empty box: grows to fit the first extended location.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bottom_left: Location::new(i32::MAX, i32::MAX),
            top_right: Location::new(i32::MIN + 1, i32::MIN + 1),
        }
    }

    /// Grow the box to contain `location`. Undefined locations are
    /// ignored.
    pub fn extend(&mut self, location: Location) {
        if !location.is_defined() {
            return;
        }
        self.bottom_left = Location::new(
            self.bottom_left.lon().min(location.lon()),
            self.bottom_left.lat().min(location.lat()),
        );
        self.top_right = Location::new(
            self.top_right.lon().max(location.lon()),
            self.top_right.lat().max(location.lat()),
        );
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defined_and_undefined() {
        assert!(Location::new(0, 0).is_defined());
        assert!(Location::new(i32::MIN, 0).is_defined());
        assert!(!Location::undefined().is_defined());
    }

    #[test]
    fn degree_accessors() {
        let loc = Location::new(1_234_567_89, -900_000_000);
        assert!((loc.lon_degrees() - 12.345_678_9).abs() < 1e-9);
        assert!((loc.lat_degrees() + 90.0).abs() < 1e-9);
    }

    #[test]
    fn bounding_box_extend() {
        let mut bbox = BoundingBox::new();
        bbox.extend(Location::new(100, -50));
        bbox.extend(Location::new(-200, 75));
        assert_eq!(bbox.bottom_left, Location::new(-200, -50));
        assert_eq!(bbox.top_right, Location::new(100, 75));
    }

    #[test]
    fn bounding_box_ignores_undefined() {
        let mut bbox = BoundingBox::new();
        bbox.extend(Location::new(1, 1));
        bbox.extend(Location::undefined());
        assert_eq!(bbox.bottom_left, Location::new(1, 1));
        assert_eq!(bbox.top_right, Location::new(1, 1));
    }
}
