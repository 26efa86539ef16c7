//! ID tag domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ID tag authorization status (OCPP 1.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdTagStatus {
    Accepted,
    Blocked,
    Expired,
    Invalid,
    ConcurrentTx,
}

impl std::fmt::Display for IdTagStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Accepted => "Accepted",
            Self::Blocked => "Blocked",
            Self::Expired => "Expired",
            Self::Invalid => "Invalid",
            Self::ConcurrentTx => "ConcurrentTx",
        };
        f.write_str(s)
    }
}

impl IdTagStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Accepted" => Some(Self::Accepted),
            "Blocked" => Some(Self::Blocked),
            "Expired" => Some(Self::Expired),
            "Invalid" => Some(Self::Invalid),
            "ConcurrentTx" => Some(Self::ConcurrentTx),
            _ => None,
        }
    }
}

/// Authorization verdict returned to charge points (`idTagInfo`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTagInfo {
    pub status: IdTagStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id_tag: Option<String>,
}

impl IdTagInfo {
    pub fn new(status: IdTagStatus) -> Self {
        Self {
            status,
            expiry_date: None,
            parent_id_tag: None,
        }
    }

    pub fn accepted() -> Self {
        Self::new(IdTagStatus::Accepted)
    }

    pub fn is_accepted(&self) -> bool {
        self.status == IdTagStatus::Accepted
    }
}

/// RFID card / app token registered with the Central System
#[derive(Debug, Clone)]
pub struct IdTag {
    pub value: String,
    pub status: IdTagStatus,
    pub expiry_date: Option<DateTime<Utc>>,
    /// Parent tag for group authorization
    pub parent_id_tag: Option<String>,
}

impl IdTag {
    pub fn new(value: impl Into<String>, status: IdTagStatus) -> Self {
        Self {
            value: value.into(),
            status,
            expiry_date: None,
            parent_id_tag: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_tag_info_serializes_without_empty_fields() {
        let info = IdTagInfo::accepted();
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            serde_json::json!({"status": "Accepted"})
        );
    }

    #[test]
    fn id_tag_info_serializes_parent() {
        let mut info = IdTagInfo::new(IdTagStatus::ConcurrentTx);
        info.parent_id_tag = Some("FLEET1".to_string());
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            serde_json::json!({"status": "ConcurrentTx", "parentIdTag": "FLEET1"})
        );
    }

    #[test]
    fn status_roundtrip() {
        for status in [
            IdTagStatus::Accepted,
            IdTagStatus::Blocked,
            IdTagStatus::Expired,
            IdTagStatus::Invalid,
            IdTagStatus::ConcurrentTx,
        ] {
            assert_eq!(IdTagStatus::from_str(&status.to_string()), Some(status));
        }
        assert_eq!(IdTagStatus::from_str("nope"), None);
    }
}
