// MIT License - Copyright (c) 2026 Peter Wright
// Protocol constants and well-known enumerations

/// Lowest API schema version this client can speak.
pub const MIN_SERVER_SCHEMA_VERSION: u32 = 0;
/// Highest API schema version this client can speak.
pub const MAX_SERVER_SCHEMA_VERSION: u32 = 1;

/// Text frames above this size (bytes) are decoded off the receive loop.
pub const SIZE_PARSE_JSON_EXECUTOR: usize = 8192;

/// Fixed message IDs used during bootstrap, before the receive loop runs.
pub const SET_API_SCHEMA_MESSAGE_ID: &str = "set_api_schema";
pub const START_LISTENING_MESSAGE_ID: &str = "start_listening";

/// Alarm mode reported by a station in its `currentMode` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmMode {
    Away,
    Home,
    Disarmed,
    /// Any code this client does not know about.
    Unknown,
}

impl AlarmMode {
    /// Map a server code to a mode, falling back to `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Away,
            1 => Self::Home,
            63 => Self::Disarmed,
            _ => Self::Unknown,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Away => 0,
            Self::Home => 1,
            Self::Disarmed => 63,
            Self::Unknown => 99,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Away => "Away",
            Self::Home => "Home",
            Self::Disarmed => "Disarmed",
            Self::Unknown => "Unknown",
        }
    }
}

/// Guard mode reported by a station in its `guardMode` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardMode {
    Away,
    Home,
    Schedule,
    Custom1,
    Custom2,
    Custom3,
    Geo,
    Disarmed,
    /// Any code this client does not know about.
    Unknown,
}

impl GuardMode {
    /// Map a server code to a mode, falling back to `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Away,
            1 => Self::Home,
            2 => Self::Schedule,
            3 => Self::Custom1,
            4 => Self::Custom2,
            5 => Self::Custom3,
            47 => Self::Geo,
            63 => Self::Disarmed,
            _ => Self::Unknown,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Away => 0,
            Self::Home => 1,
            Self::Schedule => 2,
            Self::Custom1 => 3,
            Self::Custom2 => 4,
            Self::Custom3 => 5,
            Self::Geo => 47,
            Self::Disarmed => 63,
            Self::Unknown => 99,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Away => "Away",
            Self::Home => "Home",
            Self::Schedule => "Schedule",
            Self::Custom1 => "Custom 1",
            Self::Custom2 => "Custom 2",
            Self::Custom3 => "Custom 3",
            Self::Geo => "Geofencing",
            Self::Disarmed => "Disarmed",
            Self::Unknown => "Unknown",
        }
    }
}
