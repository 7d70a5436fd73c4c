// SPDX-License-Identifier: MIT

use std::time::Duration;

pub const MAX_NAME_LEN: usize = 12;
pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Events per second for one traffic stream. Zero, negative or non-finite disables the stream.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rate(pub f64);

impl Rate {
    pub const OFF: Self = Self(0.0);

    pub fn interval(self) -> Option<Duration> {
        if self.0.is_finite() && self.0 > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.0).ok()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub host: String,
    pub port: u16,
    pub lobby: String,
    /// Already sanitized.
    pub name: String,
    pub duration: Duration,
    pub chat_rate: Rate,
    pub input_rate: Rate,
    pub shoot_rate: Rate,
    /// Seeds every generator when set, so runs are reproducible.
    pub seed: Option<u64>,
    pub identity_timeout: Duration,
    pub connect_timeout: Duration,
}

impl BotConfig {
    /// A bot with every traffic stream disabled.
    pub fn new(host: impl Into<String>, port: u16, lobby: impl Into<String>, name: &str) -> Self {
        Self {
            host: host.into(),
            port,
            lobby: lobby.into(),
            name: sanitize_name(name),
            duration: Duration::ZERO,
            chat_rate: Rate::OFF,
            input_rate: Rate::OFF,
            shoot_rate: Rate::OFF,
            seed: None,
            identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Keep ASCII alphanumerics, '_' and '-', up to [`MAX_NAME_LEN`] characters.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(MAX_NAME_LEN)
        .collect()
}

/// Name for bot `index` of a pool of `pool_size`. A lone bot keeps the base name; pool members
/// get the index appended, with the base shortened so the index always fits.
pub fn pool_member_name(base: &str, index: usize, pool_size: usize) -> String {
    let base = sanitize_name(base);
    if pool_size <= 1 {
        return base;
    }

    let suffix = index.to_string();
    let keep = MAX_NAME_LEN.saturating_sub(suffix.len());
    let mut name: String = base.chars().take(keep).collect();
    name.push_str(&suffix);
    name
}

/// Text as ASCII bytes, dropping anything else.
pub fn ascii_bytes(text: &str) -> Vec<u8> {
    text.bytes().filter(u8::is_ascii).collect()
}
