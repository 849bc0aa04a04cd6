//! Tracker configuration.

use std::num::NonZeroUsize;

use tracing::warn;

pub const DEFAULT_GROUP_PREFIX: &str = "resource/";
pub const DEFAULT_MAX_FRAMES: usize = 32;

pub const CAPTURE_STACKS_ENV: &str = "TETHER_CAPTURE_STACKS";
pub const MAX_FRAMES_ENV: &str = "TETHER_MAX_FRAMES";
pub const REGISTRY_ENV: &str = "TETHER_REGISTRY";
pub const GROUP_PREFIX_ENV: &str = "TETHER_GROUP_PREFIX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Capture an acquisition stack on every `track`.
    ///
    /// Has no effect when the `stack-capture` feature is off.
    pub capture_stacks: bool,
    /// Upper bound on frames kept per stack, counted from the `track` caller.
    pub max_frames: NonZeroUsize,
    /// Maintain the grouped live registry.
    pub registry: bool,
    /// Prepended to the fully qualified type name to form a group key.
    pub group_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture_stacks: true,
            max_frames: NonZeroUsize::new(DEFAULT_MAX_FRAMES)
                .unwrap_or(NonZeroUsize::MIN),
            registry: true,
            group_prefix: DEFAULT_GROUP_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by `TETHER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `TETHER_*` key.
    ///
    /// Malformed values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup(CAPTURE_STACKS_ENV) {
            match parse_flag(&value) {
                Some(flag) => config.capture_stacks = flag,
                None => warn!(key = CAPTURE_STACKS_ENV, %value, "ignoring malformed flag"),
            }
        }

        if let Some(value) = lookup(REGISTRY_ENV) {
            match parse_flag(&value) {
                Some(flag) => config.registry = flag,
                None => warn!(key = REGISTRY_ENV, %value, "ignoring malformed flag"),
            }
        }

        if let Some(value) = lookup(MAX_FRAMES_ENV) {
            match value.trim().parse::<NonZeroUsize>() {
                Ok(max_frames) => config.max_frames = max_frames,
                Err(e) => warn!(key = MAX_FRAMES_ENV, %value, %e, "ignoring malformed frame limit"),
            }
        }

        if let Some(value) = lookup(GROUP_PREFIX_ENV) {
            config.group_prefix = value;
        }

        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
