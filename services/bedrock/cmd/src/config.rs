//! Configuration handling for the bedrock binary.
//!
//! Values come from an optional YAML file and are then overridden by
//! `BEDROCK_*` environment variables.

use anyhow::Result;
use bedrock_session::SessionConfig;
use bedrock_wire::BedrockPong;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Bedrock service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockConfig {
    /// Address the server binds
    pub bind_address: SocketAddr,
    /// Game protocol version of the packet table
    pub protocol_version: u32,
    /// First MOTD line
    pub motd: String,
    /// Second MOTD line
    pub sub_motd: String,
    /// Player limit advertised in the status record
    pub max_players: i32,
    /// Game mode advertised in the status record
    pub game_type: String,
    /// Flush interval
    pub tick_interval: Duration,
    /// Status ping timeout
    pub ping_timeout: Duration,
    /// Client connect timeout
    pub connect_timeout: Duration,
    /// Batch compression level
    pub compression_level: u32,
    /// Trace-log outbound packets
    pub log_packets: bool,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 19132)),
            protocol_version: 440,
            motd: "Dedicated Server".to_string(),
            sub_motd: "Bedrock level".to_string(),
            max_players: 20,
            game_type: "Survival".to_string(),
            tick_interval: session.tick_interval,
            ping_timeout: session.ping_timeout,
            connect_timeout: session.connect_timeout,
            compression_level: session.compression_level,
            log_packets: session.log_packets,
        }
    }
}

/// Root of the YAML file
#[derive(Debug, Deserialize)]
struct RootConfig {
    bedrock: Option<FileConfig>,
}

/// `bedrock:` section; durations use humantime syntax such as `50ms`
#[derive(Debug, Deserialize)]
struct FileConfig {
    bind_address: Option<SocketAddr>,
    protocol_version: Option<u32>,
    motd: Option<String>,
    sub_motd: Option<String>,
    max_players: Option<i32>,
    game_type: Option<String>,
    tick_interval: Option<String>,
    ping_timeout: Option<String>,
    connect_timeout: Option<String>,
    compression_level: Option<u32>,
    log_packets: Option<bool>,
}

fn parse_duration(name: &str, value: &str) -> Option<Duration> {
    match humantime::parse_duration(value) {
        Ok(duration) => Some(duration),
        Err(e) => {
            warn!("Ignoring invalid {} {:?}: {}", name, value, e);
            None
        }
    }
}

impl BedrockConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root) => {
                    if let Some(section) = root.bedrock {
                        config.apply_file_config(section);
                    }
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?}, using defaults: {}",
                    config_path.as_ref(),
                    e
                ),
            },
            Err(_) => warn!("Config file {:?} not found, using defaults", config_path.as_ref()),
        }

        config.apply_environment_overrides();

        info!(
            "Final bedrock configuration: bind={}, protocol={}, tick={:?}",
            config.bind_address, config.protocol_version, config.tick_interval
        );

        Ok(config)
    }

    fn apply_file_config(&mut self, file: FileConfig) {
        if let Some(address) = file.bind_address {
            self.bind_address = address;
        }
        if let Some(version) = file.protocol_version {
            self.protocol_version = version;
        }
        if let Some(motd) = file.motd {
            self.motd = motd;
        }
        if let Some(sub_motd) = file.sub_motd {
            self.sub_motd = sub_motd;
        }
        if let Some(max_players) = file.max_players {
            self.max_players = max_players;
        }
        if let Some(game_type) = file.game_type {
            self.game_type = game_type;
        }
        if let Some(interval) = file.tick_interval.and_then(|v| parse_duration("tick_interval", &v)) {
            self.tick_interval = interval;
        }
        if let Some(timeout) = file.ping_timeout.and_then(|v| parse_duration("ping_timeout", &v)) {
            self.ping_timeout = timeout;
        }
        if let Some(timeout) = file
            .connect_timeout
            .and_then(|v| parse_duration("connect_timeout", &v))
        {
            self.connect_timeout = timeout;
        }
        if let Some(level) = file.compression_level {
            self.compression_level = level;
        }
        if let Some(log_packets) = file.log_packets {
            self.log_packets = log_packets;
        }
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        if let Ok(address) = std::env::var("BEDROCK_BIND_ADDRESS") {
            if let Ok(address) = address.parse::<SocketAddr>() {
                self.bind_address = address;
                info!("Bind address overridden by environment: {}", address);
            }
        }

        if let Ok(version) = std::env::var("BEDROCK_PROTOCOL_VERSION") {
            if let Ok(version) = version.parse::<u32>() {
                self.protocol_version = version;
                info!("Protocol version overridden by environment: {}", version);
            }
        }

        if let Ok(motd) = std::env::var("BEDROCK_MOTD") {
            self.motd = motd;
            info!("MOTD overridden by environment: {}", self.motd);
        }

        if let Ok(interval) = std::env::var("BEDROCK_TICK_INTERVAL") {
            if let Some(interval) = parse_duration("BEDROCK_TICK_INTERVAL", &interval) {
                self.tick_interval = interval;
                info!("Tick interval overridden by environment: {:?}", interval);
            }
        }

        if let Ok(level) = std::env::var("BEDROCK_COMPRESSION_LEVEL") {
            if let Ok(level) = level.parse::<u32>() {
                self.compression_level = level;
                info!("Compression level overridden by environment: {}", level);
            }
        }
    }

    /// Session settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tick_interval: self.tick_interval,
            ping_timeout: self.ping_timeout,
            connect_timeout: self.connect_timeout,
            compression_level: self.compression_level,
            log_packets: self.log_packets,
        }
    }

    /// Status record advertised by the server
    pub fn pong(&self, minecraft_version: &str, player_count: i32) -> BedrockPong {
        BedrockPong {
            edition: Some("MCPE".to_string()),
            motd: Some(self.motd.clone()),
            protocol_version: i32::try_from(self.protocol_version).unwrap_or(-1),
            version: Some(minecraft_version.to_string()),
            player_count,
            maximum_player_count: self.max_players,
            sub_motd: Some(self.sub_motd.clone()),
            game_type: Some(self.game_type.clone()),
            ipv4_port: i32::from(self.bind_address.port()),
            ..BedrockPong::default()
        }
    }
}
