use std::time::Duration;

use shared::packet::HEADER_SIZE;
use shared::SEND_MTU;
use thiserror::Error;

/// Maximum age of a cached server list packet, in frames.
pub const GAME_SERVER_LIST_AGE: u64 = 10;
/// Frames to wait for a probe reply before trying again.
pub const SERVER_QUERY_TIMEOUT: u64 = 5;
/// Probes sent to a candidate before giving up on it.
pub const SERVER_QUERY_ATTEMPTS: u32 = 3;
/// Safe threshold for MTUs, some networks don't like big ones.
pub const SAFE_MTU: usize = 1360;
pub const FRAME_DURATION: Duration = Duration::from_millis(100);

/// Smallest list packet: header, list version and entry count.
const MIN_LIST_PACKET: usize = HEADER_SIZE + 1 + 2;

#[derive(Debug, Clone)]
pub struct Config {
    pub list_age: u64,
    pub query_timeout: u64,
    pub query_attempts: u32,
    pub safe_mtu: usize,
    /// Wall-clock length of one frame in the server loop
    pub frame_duration: Duration,
    /// Fixed seed for session keys; `None` seeds from OS entropy
    pub session_seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            list_age: GAME_SERVER_LIST_AGE,
            query_timeout: SERVER_QUERY_TIMEOUT,
            query_attempts: SERVER_QUERY_ATTEMPTS,
            safe_mtu: SAFE_MTU,
            frame_duration: FRAME_DURATION,
            session_seed: None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("query timeout must be at least one frame")]
    ZeroQueryTimeout,
    #[error("at least one query attempt is required")]
    ZeroQueryAttempts,
    #[error("frame duration must be non-zero")]
    ZeroFrameDuration,
    #[error("safe MTU of {0} bytes cannot hold a server list (minimum {min})", min = MIN_LIST_PACKET)]
    MtuTooSmall(usize),
    #[error("safe MTU of {0} bytes exceeds the largest datagram peers receive ({max})", max = SEND_MTU)]
    MtuTooLarge(usize),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query_timeout == 0 {
            return Err(ConfigError::ZeroQueryTimeout);
        }
        if self.query_attempts == 0 {
            return Err(ConfigError::ZeroQueryAttempts);
        }
        if self.frame_duration.is_zero() {
            return Err(ConfigError::ZeroFrameDuration);
        }
        if self.safe_mtu < MIN_LIST_PACKET {
            return Err(ConfigError::MtuTooSmall(self.safe_mtu));
        }
        if self.safe_mtu > SEND_MTU {
            return Err(ConfigError::MtuTooLarge(self.safe_mtu));
        }
        Ok(())
    }

    /// Frames a candidate may stay unanswered before it is dropped.
    pub fn query_window(&self) -> u64 {
        self.query_timeout * self.query_attempts as u64
    }
}
