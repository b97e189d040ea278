//! Device orientation to capture rotation mapping.

use std::fmt;

use crate::backend::CameraFacing;

/// Physical orientation reported by the host device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceOrientation {
    /// Landscape, the sensor's native orientation.
    #[default]
    Landscape,
    /// Portrait, rotated a quarter turn clockwise from landscape.
    Portrait,
    /// Landscape turned upside down.
    LandscapeFlipped,
    /// Portrait turned upside down.
    PortraitFlipped,
}

/// Clockwise rotation applied to captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    /// No rotation.
    #[default]
    None,
    /// 90 degrees clockwise.
    Clockwise90,
    /// 180 degrees.
    Clockwise180,
    /// 270 degrees clockwise.
    Clockwise270,
}

impl Rotation {
    /// Parse a rotation from degrees. Only quarter turns are accepted.
    #[must_use]
    pub const fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Self::None),
            90 => Some(Self::Clockwise90),
            180 => Some(Self::Clockwise180),
            270 => Some(Self::Clockwise270),
            _ => None,
        }
    }

    /// Rotation in degrees.
    #[must_use]
    pub const fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Clockwise90 => 90,
            Self::Clockwise180 => 180,
            Self::Clockwise270 => 270,
        }
    }

    /// Whether the rotation swaps the frame's width and height.
    #[must_use]
    pub const fn is_quarter_turn(self) -> bool {
        matches!(self, Self::Clockwise90 | Self::Clockwise270)
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Rotation for the given orientation and camera facing.
///
/// The front sensor is mounted rotated 180° relative to the back one, so the
/// two portrait cases mirror while the landscape cases stay symmetric.
#[must_use]
pub const fn rotation_for(orientation: DeviceOrientation, facing: CameraFacing) -> Rotation {
    match (orientation, facing) {
        (DeviceOrientation::Landscape, _) => Rotation::None,
        (DeviceOrientation::LandscapeFlipped, _) => Rotation::Clockwise180,
        (DeviceOrientation::Portrait, CameraFacing::Back)
        | (DeviceOrientation::PortraitFlipped, CameraFacing::Front) => Rotation::Clockwise90,
        (DeviceOrientation::Portrait, CameraFacing::Front)
        | (DeviceOrientation::PortraitFlipped, CameraFacing::Back) => Rotation::Clockwise270,
    }
}
