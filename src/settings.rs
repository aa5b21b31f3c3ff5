//! HTTP/2 SETTINGS parameters (RFC 7540 Section 6.5).

use std::collections::BTreeMap;

use tracing::warn;

use crate::frame::MAX_FRAME_LENGTH;

/// HTTP/2 SETTINGS identifiers (RFC 7540 Section 6.5.2)
pub mod settings_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;

/// The settings values carried by one SETTINGS frame, keyed by id.
///
/// A repeated id keeps the last value seen.
pub type SettingsMap = BTreeMap<u16, u32>;

/// Negotiated settings for one side of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// SETTINGS_HEADER_TABLE_SIZE (0x1). Default 4096.
    pub header_table_size: u32,
    /// SETTINGS_ENABLE_PUSH (0x2). Default enabled.
    pub enable_push: bool,
    /// SETTINGS_MAX_CONCURRENT_STREAMS (0x3). Default unlimited.
    pub max_concurrent_streams: Option<u32>,
    /// SETTINGS_INITIAL_WINDOW_SIZE (0x4). Default 65535.
    pub initial_window_size: u32,
    /// SETTINGS_MAX_FRAME_SIZE (0x5). Default 16384.
    pub max_frame_size: u32,
    /// SETTINGS_MAX_HEADER_LIST_SIZE (0x6). Default unlimited.
    pub max_header_list_size: Option<u32>,
    /// Ids this layer does not interpret. Stored, never acted on.
    pub other: SettingsMap,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            header_table_size: DEFAULT_HEADER_TABLE_SIZE,
            enable_push: true,
            max_concurrent_streams: None,
            initial_window_size: DEFAULT_INITIAL_WINDOW_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: None,
            other: SettingsMap::new(),
        }
    }
}

impl Settings {
    /// Apply the values present in `update`. Ids not in `update` keep their
    /// current value.
    pub fn merge(&mut self, update: &SettingsMap) {
        for (&id, &value) in update {
            match id {
                settings_id::HEADER_TABLE_SIZE => self.header_table_size = value,
                settings_id::ENABLE_PUSH => self.enable_push = value != 0,
                settings_id::MAX_CONCURRENT_STREAMS => self.max_concurrent_streams = Some(value),
                settings_id::INITIAL_WINDOW_SIZE => self.initial_window_size = value,
                settings_id::MAX_FRAME_SIZE => {
                    if value == 0 || value > MAX_FRAME_LENGTH {
                        warn!(value, "ignoring out-of-range SETTINGS_MAX_FRAME_SIZE");
                    } else {
                        self.max_frame_size = value;
                    }
                }
                settings_id::MAX_HEADER_LIST_SIZE => self.max_header_list_size = Some(value),
                _ => {
                    self.other.insert(id, value);
                }
            }
        }
    }

    /// The values that differ from the protocol defaults, as a SETTINGS map.
    pub fn to_map(&self) -> SettingsMap {
        let defaults = Settings::default();
        let mut map = SettingsMap::new();
        if self.header_table_size != defaults.header_table_size {
            map.insert(settings_id::HEADER_TABLE_SIZE, self.header_table_size);
        }
        if self.enable_push != defaults.enable_push {
            map.insert(settings_id::ENABLE_PUSH, u32::from(self.enable_push));
        }
        if let Some(v) = self.max_concurrent_streams {
            map.insert(settings_id::MAX_CONCURRENT_STREAMS, v);
        }
        if self.initial_window_size != defaults.initial_window_size {
            map.insert(settings_id::INITIAL_WINDOW_SIZE, self.initial_window_size);
        }
        if self.max_frame_size != defaults.max_frame_size {
            map.insert(settings_id::MAX_FRAME_SIZE, self.max_frame_size);
        }
        if let Some(v) = self.max_header_list_size {
            map.insert(settings_id::MAX_HEADER_LIST_SIZE, v);
        }
        map.extend(self.other.iter().map(|(&id, &v)| (id, v)));
        map
    }
}
