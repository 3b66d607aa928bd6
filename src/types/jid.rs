//! WhatsApp JID (Jabber ID) types.
//!
//! A JID addresses a user (`user@server`) or one linked device of that user
//! (`user:device@server`, or the AD form `user.agent:device@server`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Known JID servers on WhatsApp
pub mod servers {
    pub const DEFAULT_USER: &str = "s.whatsapp.net";
    pub const GROUP: &str = "g.us";
    pub const LEGACY_USER: &str = "c.us";
    pub const BROADCAST: &str = "broadcast";
    pub const HIDDEN_USER: &str = "lid";
}

/// JID represents a WhatsApp user or device address.
///
/// The default value is the empty JID: no user, no server. Its string form is
/// the empty string, which is what the webhook payload carries when an event
/// has no destination device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct JID {
    pub user: String,
    pub raw_agent: u8,
    pub device: u16,
    pub server: String,
}

impl JID {
    /// Creates a new regular (non-device) JID.
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
            ..Default::default()
        }
    }

    /// Creates a JID for a specific linked device of a user.
    pub fn new_device(user: impl Into<String>, device: u16) -> Self {
        Self {
            user: user.into(),
            device,
            server: servers::DEFAULT_USER.to_string(),
            ..Default::default()
        }
    }

    /// Returns a version of the JID without agent and device.
    pub fn to_non_ad(&self) -> Self {
        Self::new(self.user.clone(), self.server.clone())
    }

    /// Returns true if the JID is empty (no server).
    pub fn is_empty(&self) -> bool {
        self.server.is_empty()
    }

    /// Returns true if the JID carries a user part, i.e. it can be messaged.
    pub fn has_user(&self) -> bool {
        !self.user.is_empty()
    }

    /// Returns true if this JID addresses a group chat.
    pub fn is_group(&self) -> bool {
        self.server == servers::GROUP
    }
}

impl fmt::Display for JID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw_agent > 0 {
            write!(f, "{}.{}:{}@{}", self.user, self.raw_agent, self.device, self.server)
        } else if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else if !self.user.is_empty() {
            write!(f, "{}@{}", self.user, self.server)
        } else {
            write!(f, "{}", self.server)
        }
    }
}

/// Error type for JID parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to parse JID: {0}")]
pub struct ParseJIDError(pub String);

impl FromStr for JID {
    type Err = ParseJIDError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((user_part, server)) = s.split_once('@') else {
            return Ok(JID::new("", s));
        };
        if server.contains('@') {
            return Err(ParseJIDError("unexpected number of @ in JID".to_string()));
        }

        let mut jid = JID::new(user_part, server);

        // AD form: user.agent:device@server
        if let Some((user, ad)) = user_part.split_once('.') {
            if ad.contains('.') {
                return Err(ParseJIDError("unexpected number of dots in JID".to_string()));
            }
            jid.user = user.to_string();
            let (agent, device) = match ad.split_once(':') {
                Some((agent, device)) => (agent, Some(device)),
                None => (ad, None),
            };
            jid.raw_agent = agent
                .parse()
                .map_err(|_| ParseJIDError("failed to parse agent from JID".to_string()))?;
            if let Some(device) = device {
                jid.device = device
                    .parse()
                    .map_err(|_| ParseJIDError("failed to parse device from JID".to_string()))?;
            }
        } else if let Some((user, device)) = user_part.split_once(':') {
            jid.user = user.to_string();
            jid.device = device
                .parse()
                .map_err(|_| ParseJIDError("failed to parse device from JID".to_string()))?;
        }

        Ok(jid)
    }
}

impl Serialize for JID {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JID {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_jid() {
        let jid: JID = "1234567890@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.server, servers::DEFAULT_USER);
        assert_eq!(jid.device, 0);
        assert_eq!(jid.raw_agent, 0);
    }

    #[test]
    fn test_parse_device_jid() {
        let jid: JID = "1234567890:2@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.device, 2);
        assert_eq!(jid.to_non_ad(), JID::new("1234567890", servers::DEFAULT_USER));
    }

    #[test]
    fn test_parse_ad_jid() {
        let jid: JID = "1234567890.0:1@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "1234567890");
        assert_eq!(jid.raw_agent, 0);
        assert_eq!(jid.device, 1);
    }

    #[test]
    fn test_parse_rejects_bad_device() {
        assert!("123:abc@s.whatsapp.net".parse::<JID>().is_err());
        assert!("1.2.3@s.whatsapp.net".parse::<JID>().is_err());
    }

    #[test]
    fn test_empty_jid_formats_as_empty_string() {
        let jid = JID::default();
        assert!(jid.is_empty());
        assert!(!jid.has_user());
        assert_eq!(jid.to_string(), "");
        assert_eq!("".parse::<JID>().unwrap(), jid);
    }

    #[test]
    fn test_jid_to_string() {
        let jid = JID::new("1234567890", servers::DEFAULT_USER);
        assert_eq!(jid.to_string(), "1234567890@s.whatsapp.net");
        assert_eq!(JID::new_device("1234567890", 2).to_string(), "1234567890:2@s.whatsapp.net");
    }

    #[test]
    fn test_group_jid() {
        let jid: JID = "123456789-1234567890@g.us".parse().unwrap();
        assert_eq!(jid.user, "123456789-1234567890");
        assert!(jid.is_group());
    }

    #[test]
    fn test_jid_serde_uses_string_form() {
        let jid = JID::new_device("6281234", 7);
        let encoded = serde_json::to_string(&jid).unwrap();
        assert_eq!(encoded, "\"6281234:7@s.whatsapp.net\"");
        let decoded: JID = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, jid);
    }
}
