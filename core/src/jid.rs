use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
pub const GROUP_SERVER: &str = "g.us";
pub const BROADCAST_SERVER: &str = "broadcast";
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Source-side address: `user[:device]@server`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    pub user: String,
    pub server: String,
    pub device: u16,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
            device: 0,
        }
    }

    pub fn user(user: impl Into<String>) -> Self {
        Self::new(user, DEFAULT_USER_SERVER)
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self::new(id, GROUP_SERVER)
    }

    pub fn status_broadcast() -> Self {
        Self::new("status", BROADCAST_SERVER)
    }

    /// Same address without the device part.
    pub fn to_non_ad(&self) -> Jid {
        Jid {
            user: self.user.clone(),
            server: self.server.clone(),
            device: 0,
        }
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    pub fn is_user(&self) -> bool {
        self.server == DEFAULT_USER_SERVER
    }

    pub fn is_status_broadcast(&self) -> bool {
        self.user == "status" && self.server == BROADCAST_SERVER
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device > 0 {
            write!(f, "{}:{}@{}", self.user, self.device, self.server)
        } else if self.user.is_empty() {
            write!(f, "{}", self.server)
        } else {
            write!(f, "{}@{}", self.user, self.server)
        }
    }
}

impl FromStr for Jid {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CoreError::InvalidArgument("empty jid".to_string()));
        }
        let Some((user_part, server)) = raw.split_once('@') else {
            return Ok(Jid::new("", raw));
        };
        if server.is_empty() {
            return Err(CoreError::InvalidArgument(format!("jid missing server: {}", raw)));
        }
        let (user, device) = match user_part.split_once(':') {
            Some((user, device)) => {
                let device = device
                    .parse::<u16>()
                    .map_err(|_| CoreError::InvalidArgument(format!("bad device in jid: {}", raw)))?;
                (user, device)
            }
            None => (user_part, 0),
        };
        Ok(Jid {
            user: user.to_string(),
            server: server.to_string(),
            device,
        })
    }
}

impl TryFrom<String> for Jid {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Jid> for String {
    fn from(value: Jid) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_jid_and_strips_device() {
        let jid: Jid = "15550001111:12@s.whatsapp.net".parse().expect("parse");
        assert_eq!(jid.user, "15550001111");
        assert_eq!(jid.device, 12);
        assert_eq!(jid.to_non_ad().to_string(), "15550001111@s.whatsapp.net");
    }

    #[test]
    fn recognises_groups_and_status() {
        let group: Jid = "120363000000@g.us".parse().expect("group");
        assert!(group.is_group());
        let status: Jid = STATUS_BROADCAST.parse().expect("status");
        assert!(status.is_status_broadcast());
        assert_eq!(status.to_string(), STATUS_BROADCAST);
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<Jid>().is_err());
        assert!("abc@".parse::<Jid>().is_err());
        assert!("abc:x@s.whatsapp.net".parse::<Jid>().is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        let jid = Jid::group("42");
        let json = serde_json::to_string(&jid).expect("json");
        assert_eq!(json, "\"42@g.us\"");
        let back: Jid = serde_json::from_str(&json).expect("back");
        assert_eq!(back, jid);
    }
}
