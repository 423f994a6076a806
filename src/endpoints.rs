//! Route constants for the StreamMagic device API.

/// Device metadata
pub const INFO: &str = "/system/info";
/// Available input sources
pub const SOURCES: &str = "/system/sources";
/// Zone state (power, volume, mute, selected source)
pub const ZONE_STATE: &str = "/zone/state";
/// Playback state and track metadata
pub const PLAY_STATE: &str = "/zone/play_state";
/// Playback position ticks
pub const POSITION: &str = "/zone/play_state/position";
/// Transport controls available for the current stream
pub const NOW_PLAYING: &str = "/zone/now_playing";
/// Power control
pub const POWER: &str = "/system/power";
/// Transport commands (play, pause, skip, seek)
pub const PLAY_CONTROL: &str = "/zone/play_control";
/// Audio settings, including the user EQ
pub const AUDIO: &str = "/zone/audio";
