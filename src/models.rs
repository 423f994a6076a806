use serde::{Deserialize, Serialize};

/// Device metadata reported by `/system/info`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Info {
    pub name: String,
    pub model: String,
    pub timezone: String,
    pub locale: String,
    pub udn: String,
    pub unit_id: String,
    #[serde(rename = "api")]
    pub api_version: String,
}

/// An input source reported by `/system/sources`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub default_name: String,
    pub nameable: bool,
    pub ui_selectable: bool,
    pub description: String,
    pub description_locale: String,
    #[serde(default)]
    pub preferred_order: Option<u32>,
}

/// Zone state reported by `/zone/state`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct State {
    pub source: String,
    pub power: bool,
    pub pre_amp_mode: bool,
    pub pre_amp_state: bool,
    #[serde(default)]
    pub volume_step: Option<i32>,
    #[serde(default)]
    pub volume_db: Option<i32>,
    #[serde(default)]
    pub volume_percent: Option<i32>,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub audio_output: Option<String>,
    #[serde(rename = "cbus", default = "default_control_bus")]
    pub control_bus: ControlBusMode,
    #[serde(default = "default_standby_mode")]
    pub standby_mode: StandbyMode,
    #[serde(rename = "auto_power_down", default = "default_auto_power_down")]
    pub auto_power_down_time: u32,
}

fn default_control_bus() -> ControlBusMode {
    ControlBusMode::Off
}

fn default_standby_mode() -> StandbyMode {
    StandbyMode::Network
}

fn default_auto_power_down() -> u32 {
    1200
}

/// Control bus mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlBusMode {
    Amplifier,
    Receiver,
    Off,
}

/// Standby mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StandbyMode {
    #[serde(rename = "ECO_MODE")]
    Eco,
    #[serde(rename = "NETWORK")]
    Network,
}

/// Track metadata carried inside the play state
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayStateMetadata {
    #[serde(rename = "class", default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub art_url: Option<String>,
    #[serde(default)]
    pub sample_format: Option<String>,
    #[serde(default)]
    pub mqa: Option<String>,
    #[serde(default)]
    pub signal: Option<bool>,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub lossless: Option<bool>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub bitrate: Option<u32>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub radio_id: Option<i64>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub station: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
}

/// Playback state reported by `/zone/play_state`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayState {
    #[serde(default = "default_play_state")]
    pub state: String,
    #[serde(default)]
    pub metadata: PlayStateMetadata,
    #[serde(default)]
    pub presettable: bool,
    #[serde(default)]
    pub position: Option<u64>,
    #[serde(default = "default_mode")]
    pub mode_repeat: String,
    #[serde(default = "default_mode")]
    pub mode_shuffle: String,
}

impl Default for PlayState {
    fn default() -> Self {
        Self {
            state: default_play_state(),
            metadata: PlayStateMetadata::default(),
            presettable: false,
            position: None,
            mode_repeat: default_mode(),
            mode_shuffle: default_mode(),
        }
    }
}

fn default_play_state() -> String {
    "not_ready".to_string()
}

fn default_mode() -> String {
    "off".to_string()
}

/// Transport controls currently offered by the stream, from `/zone/now_playing`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NowPlaying {
    #[serde(default)]
    pub controls: Vec<TransportControl>,
}

/// A transport control the device is willing to accept
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportControl {
    Pause,
    Play,
    PlayPause,
    ToggleShuffle,
    ToggleRepeat,
    TrackNext,
    TrackPrevious,
    Seek,
    Stop,
}

/// Shuffle mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleMode {
    Off,
    All,
    Toggle,
}

/// Repeat mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    Off,
    All,
    One,
    Toggle,
}

/// EQ filter shape
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EqFilter {
    Passthrough,
    Peaking,
    Lowshelf,
    Highshelf,
    Notch,
    Highpass,
    Lowpass,
    Allpass,
}

impl EqFilter {
    /// Wire spelling of the filter, as the device's parameter string expects
    pub fn as_str(&self) -> &'static str {
        match self {
            EqFilter::Passthrough => "PASSTHROUGH",
            EqFilter::Peaking => "PEAKING",
            EqFilter::Lowshelf => "LOWSHELF",
            EqFilter::Highshelf => "HIGHSHELF",
            EqFilter::Notch => "NOTCH",
            EqFilter::Highpass => "HIGHPASS",
            EqFilter::Lowpass => "LOWPASS",
            EqFilter::Allpass => "ALLPASS",
        }
    }
}

/// One band of the user EQ
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EqBand {
    pub index: u32,
    #[serde(default)]
    pub filter: Option<EqFilter>,
    #[serde(default)]
    pub freq: Option<u32>,
    #[serde(default)]
    pub gain: Option<f64>,
    #[serde(default)]
    pub q: Option<f64>,
}

/// Lowest gain the device accepts on an EQ band, in dB
pub const EQ_GAIN_MIN: f64 = -6.0;
/// Highest gain the device accepts on an EQ band, in dB
pub const EQ_GAIN_MAX: f64 = 3.0;

/// EQ preset definitions from the official StreamMagic app.
/// Each preset holds seven gain values (dB) for bands 0-6.
pub static EQ_PRESETS: [(&str, [f64; 7]); 9] = [
    ("flat", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("bass_boost", [3.0, 3.0, 1.0, 0.0, -1.0, -0.5, -0.3]),
    ("bass_reduction", [-4.6, -1.8, -0.6, 0.0, 0.6, 0.4, 0.0]),
    ("voice_clarity", [-6.0, -3.4, 3.0, 3.0, 3.0, 2.2, -1.4]),
    ("treble_boost", [0.0, 0.0, 0.0, 0.0, 0.6, 1.8, 3.0]),
    ("treble_reduction", [0.0, 0.0, 0.0, 0.0, 0.0, -1.2, -4.2]),
    ("tv", [-1.9, -0.8, 1.0, 1.0, 0.8, 0.0, -0.8]),
    ("movie", [0.0, 1.4, -0.4, -2.0, -0.6, 0.6, 1.1]),
    ("gaming", [3.0, 3.0, 1.0, -1.0, -1.0, 0.6, -0.2]),
];

/// Gain values for a named EQ preset, if it exists
pub fn eq_preset(name: &str) -> Option<&'static [f64; 7]> {
    EQ_PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, gains)| gains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn info_maps_api_alias() {
        let info: Info = serde_json::from_value(json!({
            "name": "Living Room",
            "model": "CXNv2",
            "timezone": "Europe/London",
            "locale": "en_GB",
            "udn": "uuid:0001",
            "unit_id": "ABC123",
            "api": "1.8",
        }))
        .unwrap();
        assert_eq!(info.api_version, "1.8");
        assert_eq!(info.model, "CXNv2");
    }

    #[test]
    fn state_fills_defaults() {
        let state: State = serde_json::from_value(json!({
            "source": "SPOTIFY",
            "power": true,
            "pre_amp_mode": false,
            "pre_amp_state": false,
        }))
        .unwrap();
        assert!(!state.mute);
        assert_eq!(state.control_bus, ControlBusMode::Off);
        assert_eq!(state.standby_mode, StandbyMode::Network);
        assert_eq!(state.auto_power_down_time, 1200);
        assert_eq!(state.volume_percent, None);
    }

    #[test]
    fn state_maps_wire_aliases() {
        let state: State = serde_json::from_value(json!({
            "source": "MEDIA_PLAYER",
            "power": true,
            "pre_amp_mode": true,
            "pre_amp_state": true,
            "cbus": "amplifier",
            "standby_mode": "ECO_MODE",
            "auto_power_down": 600,
        }))
        .unwrap();
        assert_eq!(state.control_bus, ControlBusMode::Amplifier);
        assert_eq!(state.standby_mode, StandbyMode::Eco);
        assert_eq!(state.auto_power_down_time, 600);
    }

    #[test]
    fn play_state_defaults_to_not_ready() {
        let play_state: PlayState = serde_json::from_value(json!({})).unwrap();
        assert_eq!(play_state.state, "not_ready");
        assert_eq!(play_state.mode_repeat, "off");
        assert_eq!(play_state.metadata.title, None);
    }

    #[test]
    fn now_playing_parses_controls() {
        let now_playing: NowPlaying = serde_json::from_value(json!({
            "controls": ["play", "pause", "play_pause", "track_next"],
        }))
        .unwrap();
        assert_eq!(
            now_playing.controls,
            vec![
                TransportControl::Play,
                TransportControl::Pause,
                TransportControl::PlayPause,
                TransportControl::TrackNext,
            ]
        );
    }

    #[test]
    fn presets_are_seven_bands_within_device_limits() {
        for (name, gains) in EQ_PRESETS {
            for gain in gains {
                assert!(
                    (EQ_GAIN_MIN..=EQ_GAIN_MAX).contains(&gain),
                    "preset {} gain {} out of range",
                    name,
                    gain
                );
            }
        }
        assert!(eq_preset("bass_boost").is_some());
        assert!(eq_preset("does_not_exist").is_none());
    }
}
