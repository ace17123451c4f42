//! Server status record returned by unconnected pings.
//!
//! ```text
//! MCPE;motd;protocol;version;players;max;server_id;sub_motd;game_type;limited;v4port;v6port;extras...;
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const FIELD_SEPARATOR: char = ';';
const FIXED_FIELDS: usize = 12;

/// Parsed server status record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedrockPong {
    /// Edition tag, e.g. `MCPE`
    pub edition: Option<String>,
    /// First MOTD line
    pub motd: Option<String>,
    /// Game protocol version, -1 if absent
    pub protocol_version: i32,
    /// Game version string
    pub version: Option<String>,
    /// Online players, -1 if absent
    pub player_count: i32,
    /// Player limit, -1 if absent
    pub maximum_player_count: i32,
    /// Server GUID
    pub server_id: i64,
    /// Second MOTD line
    pub sub_motd: Option<String>,
    /// Game mode name
    pub game_type: Option<String>,
    /// Restricted to Nintendo-limited clients
    pub nintendo_limited: bool,
    /// IPv4 game port, -1 if absent
    pub ipv4_port: i32,
    /// IPv6 game port, -1 if absent
    pub ipv6_port: i32,
    /// Fields past the fixed twelve
    pub extras: Vec<String>,
}

impl Default for BedrockPong {
    fn default() -> Self {
        Self {
            edition: None,
            motd: None,
            protocol_version: -1,
            version: None,
            player_count: -1,
            maximum_player_count: -1,
            server_id: 0,
            sub_motd: None,
            game_type: None,
            nintendo_limited: false,
            ipv4_port: -1,
            ipv6_port: -1,
            extras: Vec::new(),
        }
    }
}

fn parse_or<T: FromStr>(field: &str, default: T) -> T {
    field.parse().unwrap_or(default)
}

impl BedrockPong {
    /// Parse a status line.
    ///
    /// Missing fields keep their defaults and unparsable numbers are ignored.
    pub fn parse(line: &str) -> Self {
        let mut fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        while fields.last() == Some(&"") {
            fields.pop();
        }

        let mut pong = Self::default();
        let text = |i: usize| fields.get(i).map(|s| s.to_string());

        pong.edition = text(0);
        pong.motd = text(1);
        if let Some(field) = fields.get(2) {
            pong.protocol_version = parse_or(field, pong.protocol_version);
        }
        pong.version = text(3);
        if let Some(field) = fields.get(4) {
            pong.player_count = parse_or(field, pong.player_count);
        }
        if let Some(field) = fields.get(5) {
            pong.maximum_player_count = parse_or(field, pong.maximum_player_count);
        }
        if let Some(field) = fields.get(6) {
            pong.server_id = parse_or(field, pong.server_id);
        }
        pong.sub_motd = text(7);
        pong.game_type = text(8);
        if let Some(field) = fields.get(9) {
            pong.nintendo_limited = !field.eq_ignore_ascii_case("1");
        }
        if let Some(field) = fields.get(10) {
            pong.ipv4_port = parse_or(field, pong.ipv4_port);
        }
        if let Some(field) = fields.get(11) {
            pong.ipv6_port = parse_or(field, pong.ipv6_port);
        }
        if fields.len() > FIXED_FIELDS {
            pong.extras = fields[FIXED_FIELDS..].iter().map(|s| s.to_string()).collect();
        }

        pong
    }

    /// Parse a raw ping reply payload
    pub fn from_raknet(payload: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(payload))
    }

    /// Encode as a ping reply payload
    pub fn to_raknet(&self) -> Bytes {
        Bytes::from(self.to_string())
    }

    /// Port to connect to for an address family, if advertised
    pub fn port_for(&self, ipv6: bool) -> Option<u16> {
        let port = if ipv6 { self.ipv6_port } else { self.ipv4_port };
        u16::try_from(port).ok()
    }
}

impl fmt::Display for BedrockPong {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        let fixed = [
            text(&self.edition),
            text(&self.motd),
            self.protocol_version.to_string(),
            text(&self.version),
            self.player_count.to_string(),
            self.maximum_player_count.to_string(),
            self.server_id.to_string(),
            text(&self.sub_motd),
            text(&self.game_type),
            if self.nintendo_limited { "0" } else { "1" }.to_string(),
            self.ipv4_port.to_string(),
            self.ipv6_port.to_string(),
        ];

        for field in fixed.iter().chain(self.extras.iter()) {
            write!(f, "{}{}", field, FIELD_SEPARATOR)?;
        }
        Ok(())
    }
}

impl FromStr for BedrockPong {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "MCPE;Hello World;422;1.14.0;5;20;123456789;Survival;Game;1;19132;19133;";

    #[test]
    fn test_parse_full_record() {
        let pong = BedrockPong::parse(FULL);
        assert_eq!(pong.edition.as_deref(), Some("MCPE"));
        assert_eq!(pong.motd.as_deref(), Some("Hello World"));
        assert_eq!(pong.protocol_version, 422);
        assert_eq!(pong.version.as_deref(), Some("1.14.0"));
        assert_eq!(pong.player_count, 5);
        assert_eq!(pong.maximum_player_count, 20);
        assert_eq!(pong.server_id, 123456789);
        assert_eq!(pong.sub_motd.as_deref(), Some("Survival"));
        assert_eq!(pong.game_type.as_deref(), Some("Game"));
        assert!(!pong.nintendo_limited);
        assert_eq!(pong.ipv4_port, 19132);
        assert_eq!(pong.ipv6_port, 19133);
        assert!(pong.extras.is_empty());
        assert_eq!(pong.to_string(), FULL);
    }

    #[test]
    fn test_parse_short_record() {
        let pong = BedrockPong::parse("MCPE;Hi;400;");
        assert_eq!(pong.edition.as_deref(), Some("MCPE"));
        assert_eq!(pong.motd.as_deref(), Some("Hi"));
        assert_eq!(pong.protocol_version, 400);
        assert_eq!(pong.version, None);
        assert_eq!(pong.player_count, -1);
        assert_eq!(pong.maximum_player_count, -1);
        assert_eq!(pong.server_id, 0);
        assert_eq!(pong.ipv4_port, -1);
        assert_eq!(pong.ipv6_port, -1);
        assert!(!pong.nintendo_limited);
        assert_eq!(pong.port_for(false), None);
    }

    #[test]
    fn test_bad_numbers_keep_defaults() {
        let pong = BedrockPong::parse("MCPE;m;abc;1.0;x;y;z;;;0;port;19133;");
        assert_eq!(pong.protocol_version, -1);
        assert_eq!(pong.player_count, -1);
        assert_eq!(pong.server_id, 0);
        assert!(pong.nintendo_limited);
        assert_eq!(pong.ipv4_port, -1);
        assert_eq!(pong.port_for(true), Some(19133));
    }

    #[test]
    fn test_extras_survive() {
        let line = format!("{}extra1;extra2;", FULL);
        let pong = BedrockPong::from_raknet(line.as_bytes());
        assert_eq!(pong.extras, vec!["extra1".to_string(), "extra2".to_string()]);
        assert_eq!(&pong.to_raknet()[..], line.as_bytes());
    }

    #[test]
    fn test_default_serializes_placeholders() {
        assert_eq!(BedrockPong::default().to_string(), ";;-1;;-1;-1;0;;;1;-1;-1;");
    }
}
