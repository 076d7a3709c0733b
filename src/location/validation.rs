use super::LocationUpdate;
use std::fmt;

/// Validation errors for an inbound location update
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
    BatteryOutOfRange(u8),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::LatitudeOutOfRange(v) => {
                write!(f, "latitude must be within [-90, 90], got {}", v)
            }
            ValidationError::LongitudeOutOfRange(v) => {
                write!(f, "longitude must be within [-180, 180], got {}", v)
            }
            ValidationError::BatteryOutOfRange(v) => {
                write!(f, "batteryLevel must be within [0, 100], got {}", v)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates an inbound location update.
///
/// Rules:
/// - latitude: required, [-90, 90] degrees (NaN rejected)
/// - longitude: required, [-180, 180] degrees (NaN rejected)
/// - batteryLevel: [0, 100] when present
pub fn validate_update(update: &LocationUpdate) -> Result<(), ValidationError> {
    // Range checks also reject NaN (contains() is false for NaN)
    if !(-90.0..=90.0).contains(&update.latitude) {
        return Err(ValidationError::LatitudeOutOfRange(update.latitude));
    }

    if !(-180.0..=180.0).contains(&update.longitude) {
        return Err(ValidationError::LongitudeOutOfRange(update.longitude));
    }

    if let Some(level) = update.battery_level {
        if level > 100 {
            return Err(ValidationError::BatteryOutOfRange(level));
        }
    }

    Ok(())
}
