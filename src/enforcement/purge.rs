use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

/// Why an app was blocked. Carried to the overlay and to log lines only.
///
/// Serialized as its wire integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PurgeType {
    FocusSession,
    BedtimeRoutine,
    AppTimerOut,
    AppLaunchLimitOut,
    GroupTimerOut,
}

impl PurgeType {
    /// Stable wire value
    pub fn to_wire(self) -> u8 {
        match self {
            PurgeType::FocusSession => 0,
            PurgeType::BedtimeRoutine => 1,
            PurgeType::AppTimerOut => 2,
            PurgeType::AppLaunchLimitOut => 3,
            PurgeType::GroupTimerOut => 4,
        }
    }

    /// Strict decode; `None` for values outside the closed set
    pub fn try_from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(PurgeType::FocusSession),
            1 => Some(PurgeType::BedtimeRoutine),
            2 => Some(PurgeType::AppTimerOut),
            3 => Some(PurgeType::AppLaunchLimitOut),
            4 => Some(PurgeType::GroupTimerOut),
            _ => None,
        }
    }

    /// Lenient decode used at the presenter boundary.
    ///
    /// Unknown values fall back to `AppTimerOut` and are logged, since they
    /// indicate a producer speaking a newer protocol.
    pub fn from_wire(value: u8) -> Self {
        Self::try_from_wire(value).unwrap_or_else(|| {
            warn!("Unexpected purge type value {}, falling back to AppTimerOut", value);
            PurgeType::AppTimerOut
        })
    }

    /// Human readable reason shown on blocking surfaces
    pub fn reason(self) -> &'static str {
        match self {
            PurgeType::FocusSession => "This app is paused during your focus session.",
            PurgeType::BedtimeRoutine => "It's bedtime. This app is paused until your routine ends.",
            PurgeType::AppTimerOut => "You've used up today's timer for this app.",
            PurgeType::AppLaunchLimitOut => "You've reached today's launch limit for this app.",
            PurgeType::GroupTimerOut => "This app's group has used up today's timer.",
        }
    }
}

impl Serialize for PurgeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.to_wire())
    }
}

impl<'de> Deserialize<'de> for PurgeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(PurgeType::from_wire)
    }
}
