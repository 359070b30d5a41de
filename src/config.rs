//! Kernel-wide tunable limits.
//!
//! These are the implementation-defined constants the external interface
//! leaves to the host: table sizes and the pipe buffer size. Production
//! code uses [`Config::default`]; tests that want to exercise exhaustion
//! (a full process table, a tiny pipe buffer) build a custom `Config` or
//! load one from JSON via [`Config::from_json_str`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub max_proc: usize,
    pub max_fileid: usize,
    pub max_port: i32,
    pub pipe_buffer_size: usize,
    pub procinfo_max_args_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_proc: 128,
            max_fileid: 16,
            max_port: 1023,
            pipe_buffer_size: 4096,
            procinfo_max_args_size: 256,
        }
    }
}

impl Config {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_values() {
        let c = Config::default();
        assert_eq!(c.max_fileid, 16);
        assert_eq!(c.max_port, 1023);
    }

    #[test]
    fn round_trips_through_json() {
        let c = Config { max_proc: 4, ..Config::default() };
        let s = c.to_json_string().unwrap();
        let back = Config::from_json_str(&s).unwrap();
        assert_eq!(c, back);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c = Config::from_json_str(r#"{"max_proc": 4}"#).unwrap();
        assert_eq!(c.max_proc, 4);
        assert_eq!(c.pipe_buffer_size, Config::default().pipe_buffer_size);
    }
}
