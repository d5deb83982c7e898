//! Typed views of the values reported by the positioner.
//!
//! The wire protocol only carries integers; this module names the tags the
//! firmware uses and decodes the values that have structure (version,
//! status codes, error bits, build date). Handlers registered on the
//! [`Client`](crate::Client) receive raw integers and may use these helpers.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::codec::Command;
use crate::protocol::Tag;

/// Status (`S`) frame tags.
pub mod status {
    use crate::protocol::Tag;

    /// Firmware version, major in the high nibble.
    pub const VERSION: Tag = Tag::from_static("v");
    /// Last move target (see [`Target`](super::Target)).
    pub const TARGET: Tag = Tag::from_static("t");
    /// Manual mode flag.
    pub const MANUAL_MODE: Tag = Tag::from_static("m");
    /// Current motion status (see [`MotionStatus`](super::MotionStatus)).
    pub const CURRENT: Tag = Tag::from_static("c");
    /// Error bits (see [`ErrorFlags`](super::ErrorFlags)).
    pub const ERRORS: Tag = Tag::from_static("e");
    /// Packed firmware build date (see [`BuildDate`](super::BuildDate)).
    pub const BUILD_DATE: Tag = Tag::from_static("b");
}

/// Adjustment (`A`) frame tags.
pub mod adjustment {
    use crate::protocol::Tag;

    /// Non-zero while adjustments differ from the saved set.
    pub const MODIFIED: Tag = Tag::from_static("m");
    /// Upper end position.
    pub const POSITION_UP: Tag = Tag::from_static("u");
    /// Lower end position.
    pub const POSITION_DOWN: Tag = Tag::from_static("d");
    /// Minimum speed.
    pub const MIN_SPEED: Tag = Tag::from_static("s");
    /// Motor current limit.
    pub const CURRENT_LIMIT: Tag = Tag::from_static("l");
    /// Acceleration.
    pub const ACCELERATION: Tag = Tag::from_static("a");
}

/// Monitoring (`M`) frame tags. Values are decimal.
pub mod monitoring {
    use crate::protocol::Tag;

    /// Supply voltage, mV.
    pub const POWER_MV: Tag = Tag::from_static("pw");
    /// DC/DC converter output, mV.
    pub const DCDC_MV: Tag = Tag::from_static("dc");
    /// MCU supply, mV.
    pub const VCC_MV: Tag = Tag::from_static("vc");
    /// Motor current, mA.
    pub const MOTOR_CURRENT_MA: Tag = Tag::from_static("mc");
    /// MCU temperature, °C.
    pub const MCU_TEMP: Tag = Tag::from_static("tc");
    /// Upper optical sensor reading.
    pub const SENSOR_UP: Tag = Tag::from_static("su");
    /// Lower optical sensor reading.
    pub const SENSOR_DOWN: Tag = Tag::from_static("sd");
    /// Mains presence (see [`MainsState`](super::MainsState)).
    pub const MAINS: Tag = Tag::from_static("ac");
}

/// A tunable parameter sent in adjustment frames.
///
/// End positions are transmitted with a zero offset of 128 so that the
/// logical value can go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    /// Upper end position.
    PositionUp,
    /// Lower end position.
    PositionDown,
    /// Minimum speed.
    MinSpeed,
    /// Motor current limit.
    CurrentLimit,
    /// Acceleration.
    Acceleration,
}

impl Parameter {
    /// All adjustable parameters.
    pub const ALL: [Parameter; 5] = [
        Parameter::PositionUp,
        Parameter::PositionDown,
        Parameter::MinSpeed,
        Parameter::CurrentLimit,
        Parameter::Acceleration,
    ];

    /// Adjustment tag.
    pub fn tag(self) -> Tag {
        match self {
            Parameter::PositionUp => adjustment::POSITION_UP,
            Parameter::PositionDown => adjustment::POSITION_DOWN,
            Parameter::MinSpeed => adjustment::MIN_SPEED,
            Parameter::CurrentLimit => adjustment::CURRENT_LIMIT,
            Parameter::Acceleration => adjustment::ACCELERATION,
        }
    }

    /// Offset added to the logical value before transmission.
    pub fn zero_offset(self) -> i64 {
        match self {
            Parameter::PositionUp | Parameter::PositionDown => 128,
            _ => 0,
        }
    }

    /// Look up the parameter carried by an adjustment tag.
    pub fn from_tag(tag: Tag) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.tag() == tag)
    }

    /// Wire value for a logical value, clamped to a byte.
    ///
    /// # Example
    ///
    /// ```
    /// use shadelink::device::Parameter;
    ///
    /// assert_eq!(Parameter::PositionUp.raw(5), 0x85);
    /// assert_eq!(Parameter::PositionUp.raw(-200), 0);
    /// assert_eq!(Parameter::MinSpeed.raw(300), 255);
    /// ```
    pub fn raw(self, logical: i64) -> u8 {
        logical.saturating_add(self.zero_offset()).clamp(0, 255) as u8
    }

    /// Logical value of a reported wire value.
    pub fn logical(self, raw: i64) -> i64 {
        raw - self.zero_offset()
    }

    /// Wire value after stepping the current logical value by `delta`.
    pub fn step(self, current: i64, delta: i64) -> u8 {
        self.raw(current.saturating_add(delta))
    }
}

/// Firmware version packed as `major << 4 | minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
}

impl FirmwareVersion {
    /// Unpack a reported version value.
    pub fn from_raw(raw: i64) -> Self {
        Self {
            major: ((raw >> 4) & 0x0f) as u8,
            minor: (raw & 0x0f) as u8,
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v.{}.{}", self.major, self.minor)
    }
}

/// Last move target reported in the `t` status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// No target yet.
    #[default]
    Unknown,
    /// Moving or moved up.
    Up,
    /// Moving or moved down.
    Down,
}

impl Target {
    /// Decode a target value. Anything other than up/down is unknown.
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            1 => Target::Up,
            2 => Target::Down,
            _ => Target::Unknown,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Target::Unknown => "unknown",
            Target::Up => "up",
            Target::Down => "down",
        })
    }
}

/// Last reported target, shared between status handlers.
///
/// The `t` handler records it and the `c` handler reads it to name the
/// direction of a move.
#[derive(Debug, Default)]
pub struct LastTarget(AtomicI64);

impl LastTarget {
    /// Store a reported `t` value.
    pub fn record(&self, raw: i64) {
        self.0.store(raw, Ordering::Relaxed);
    }

    /// The last target, `Unknown` before any report.
    pub fn get(&self) -> Target {
        Target::from_raw(self.0.load(Ordering::Relaxed))
    }
}

/// Move offered in manual mode: the opposite of the last target.
///
/// Returns `None` when the target is unknown.
pub fn manual_move(last_target: Target) -> Option<Command> {
    match last_target {
        Target::Up => Some(Command::MoveDown),
        Target::Down => Some(Command::MoveUp),
        Target::Unknown => None,
    }
}

/// Motion status reported in the `c` status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionStatus {
    /// Position unknown.
    Unknown,
    /// At the upper end.
    Up,
    /// At the lower end.
    Down,
    /// Moving towards the target.
    Moving,
    /// Slowing down near the target.
    Approaching,
    /// Searching for the upper marker.
    SeekingUp,
    /// Searching for the lower marker.
    SeekingDown,
    /// Positioning failed.
    Failed,
    /// Code not known to this driver.
    Other(i64),
}

impl MotionStatus {
    /// Decode a status code.
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            0 => MotionStatus::Unknown,
            1 => MotionStatus::Up,
            2 => MotionStatus::Down,
            3 => MotionStatus::Moving,
            4 => MotionStatus::Approaching,
            5 => MotionStatus::SeekingUp,
            6 => MotionStatus::SeekingDown,
            7 => MotionStatus::Failed,
            other => MotionStatus::Other(other),
        }
    }

    /// Human-readable description; moving states name the target.
    pub fn describe(self, target: Target) -> String {
        match self {
            MotionStatus::Unknown => "unknown".to_string(),
            MotionStatus::Up => "up".to_string(),
            MotionStatus::Down => "down".to_string(),
            MotionStatus::Moving => format!("moving {}", target),
            MotionStatus::Approaching => format!("approaching {}", target),
            MotionStatus::SeekingUp => "seeking up".to_string(),
            MotionStatus::SeekingDown => "seeking down".to_string(),
            MotionStatus::Failed => "failed".to_string(),
            MotionStatus::Other(code) => format!("unknown<{}>", code),
        }
    }
}

/// Error bits reported in the `e` status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorFlags(u8);

impl ErrorFlags {
    /// Initializing, position unknown.
    pub const INITIALIZING: u8 = 0x01;
    /// Ramp too long.
    pub const RAMP: u8 = 0x02;
    /// Position out of the marker.
    pub const OVERRUN: u8 = 0x04;
    /// Optical sensor failure.
    pub const SENSE: u8 = 0x08;
    /// Positioning timeout.
    pub const TIMEOUT: u8 = 0x10;
    /// Bad supply voltage. First of the blocking errors.
    pub const POWER: u8 = 0x20;
    /// Temperature too high.
    pub const OVERHEAT: u8 = 0x40;
    /// Motor blocked (detected by current).
    pub const BLOCKED: u8 = 0x80;

    const NAMES: [(u8, &'static str); 8] = [
        (Self::INITIALIZING, "init"),
        (Self::RAMP, "ramp"),
        (Self::OVERRUN, "overrun"),
        (Self::SENSE, "sense"),
        (Self::TIMEOUT, "timeout"),
        (Self::POWER, "power"),
        (Self::OVERHEAT, "overheat"),
        (Self::BLOCKED, "blocked"),
    ];

    /// Decode a reported error value (low byte).
    pub fn from_raw(raw: i64) -> Self {
        Self((raw & 0xff) as u8)
    }

    /// Raw bits.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// No error bit set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Check a single bit.
    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    /// Any error that prevents movement.
    pub fn is_blocking(self) -> bool {
        self.0 >= Self::POWER
    }

    /// Names of the set bits, lowest first.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Display for ErrorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join(", "))
    }
}

/// Firmware build date packed as `(year - 2024) * 512 + month * 32 + day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildDate {
    /// Calendar year.
    pub year: i64,
    /// Month, 1-12 for valid dates.
    pub month: u8,
    /// Day of month.
    pub day: u8,
}

impl BuildDate {
    /// Unpack a reported build date.
    pub fn from_raw(raw: i64) -> Self {
        Self {
            year: 2024 + raw / 512,
            month: ((raw % 512) / 32) as u8,
            day: (raw % 32) as u8,
        }
    }
}

impl fmt::Display for BuildDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MONTHS: [&str; 12] = [
            "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
        ];
        match self.month.checked_sub(1).and_then(|m| MONTHS.get(m as usize)) {
            Some(name) => write!(f, "{}{} {}", name, self.day, self.year),
            None => write!(f, "?{} {}", self.day, self.year),
        }
    }
}

/// Mains supply state reported in the `ac` monitoring field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainsState {
    /// Not measured.
    Unknown,
    /// Mains present.
    Good,
    /// Mains absent.
    Absent,
}

impl MainsState {
    /// Negative is unknown, positive is good, zero is absent.
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            r if r < 0 => MainsState::Unknown,
            0 => MainsState::Absent,
            _ => MainsState::Good,
        }
    }
}

impl fmt::Display for MainsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MainsState::Unknown => "unknown",
            MainsState::Good => "good",
            MainsState::Absent => "absent",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_offsets() {
        assert_eq!(Parameter::PositionUp.raw(5), 0x85);
        assert_eq!(Parameter::PositionDown.raw(-3), 125);
        assert_eq!(Parameter::MinSpeed.raw(5), 5);
        assert_eq!(Parameter::PositionUp.logical(0x85), 5);
        assert_eq!(Parameter::CurrentLimit.logical(40), 40);
    }

    #[test]
    fn test_parameter_clamps() {
        assert_eq!(Parameter::PositionUp.raw(127), 255);
        assert_eq!(Parameter::PositionUp.raw(128), 255);
        assert_eq!(Parameter::PositionDown.raw(-128), 0);
        assert_eq!(Parameter::PositionDown.raw(-129), 0);
        assert_eq!(Parameter::Acceleration.raw(-1), 0);
        assert_eq!(Parameter::Acceleration.raw(i64::MAX), 255);
    }

    #[test]
    fn test_parameter_step() {
        assert_eq!(Parameter::MinSpeed.step(20, 10), 30);
        assert_eq!(Parameter::MinSpeed.step(5, -10), 0);
        assert_eq!(Parameter::PositionUp.step(0, 1), 129);
        assert_eq!(Parameter::PositionUp.step(120, 10), 255);
    }

    #[test]
    fn test_parameter_from_tag() {
        for parameter in Parameter::ALL {
            assert_eq!(Parameter::from_tag(parameter.tag()), Some(parameter));
        }
        assert_eq!(Parameter::from_tag(adjustment::MODIFIED), None);
    }

    #[test]
    fn test_last_target_names_moves() {
        let last = LastTarget::default();
        assert_eq!(last.get(), Target::Unknown);
        assert_eq!(MotionStatus::from_raw(3).describe(last.get()), "moving unknown");

        last.record(2);
        assert_eq!(MotionStatus::from_raw(3).describe(last.get()), "moving down");
        last.record(1);
        assert_eq!(MotionStatus::from_raw(4).describe(last.get()), "approaching up");
        assert_eq!(manual_move(last.get()), Some(Command::MoveDown));
    }

    #[test]
    fn test_firmware_version() {
        let version = FirmwareVersion::from_raw(0x23);
        assert_eq!(version, FirmwareVersion { major: 2, minor: 3 });
        assert_eq!(version.to_string(), "v.2.3");
    }

    #[test]
    fn test_manual_move() {
        assert_eq!(manual_move(Target::Up), Some(Command::MoveDown));
        assert_eq!(manual_move(Target::Down), Some(Command::MoveUp));
        assert_eq!(manual_move(Target::Unknown), None);
        assert_eq!(Target::from_raw(1), Target::Up);
        assert_eq!(Target::from_raw(7), Target::Unknown);
    }

    #[test]
    fn test_motion_status() {
        assert_eq!(MotionStatus::from_raw(3), MotionStatus::Moving);
        assert_eq!(MotionStatus::Moving.describe(Target::Down), "moving down");
        assert_eq!(
            MotionStatus::from_raw(4).describe(Target::Unknown),
            "approaching unknown"
        );
        assert_eq!(MotionStatus::from_raw(9).describe(Target::Up), "unknown<9>");
    }

    #[test]
    fn test_error_flags() {
        assert_eq!(ErrorFlags::from_raw(0).to_string(), "none");
        let flags = ErrorFlags::from_raw(0x11);
        assert_eq!(flags.names(), vec!["init", "timeout"]);
        assert!(!flags.is_blocking());
        let blocked = ErrorFlags::from_raw(0x88);
        assert_eq!(blocked.to_string(), "sense, blocked");
        assert!(blocked.is_blocking());
        assert!(blocked.contains(ErrorFlags::BLOCKED));
    }

    #[test]
    fn test_build_date() {
        // 2025-03-14
        let raw = 512 + 3 * 32 + 14;
        let date = BuildDate::from_raw(raw);
        assert_eq!(
            date,
            BuildDate {
                year: 2025,
                month: 3,
                day: 14
            }
        );
        assert_eq!(date.to_string(), "Mar14 2025");
        assert_eq!(BuildDate::from_raw(5).to_string(), "?5 2024");
    }

    #[test]
    fn test_mains_state() {
        assert_eq!(MainsState::from_raw(-1), MainsState::Unknown);
        assert_eq!(MainsState::from_raw(0), MainsState::Absent);
        assert_eq!(MainsState::from_raw(1), MainsState::Good);
        assert_eq!(MainsState::from_raw(-1).to_string(), "unknown");
    }
}
