use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::format::{format_distance_km_short, format_total_time};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserStats {
    /// Meters.
    pub total_distance: f64,
    /// Seconds.
    pub total_time: u64,
    pub total_walks: u64,
}

/// Account record without credentials. This is what the session pointer holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub username: String,
    pub display_name: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    #[serde(default)]
    pub stats: UserStats,
}

impl PublicUser {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at).single()
    }

    pub fn display_total_distance(&self) -> String {
        format_distance_km_short(self.stats.total_distance)
    }

    pub fn display_total_time(&self) -> String {
        format_total_time(self.stats.total_time)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAccount {
    #[serde(flatten)]
    pub profile: PublicUser,
    /// Argon2 PHC string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    /// Cleartext from older records; replaced by a hash on the next login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Keyed by normalized username.
pub type UserTable = BTreeMap<String, StoredAccount>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_records_with_cleartext_passwords_still_parse() {
        let raw = r#"{
            "ada": {
                "username": "ada",
                "displayName": "Ada",
                "createdAt": 1700000000000,
                "stats": { "totalDistance": 1500.5, "totalTime": 600, "totalWalks": 2 },
                "password": "hunter2"
            }
        }"#;
        let table: UserTable = serde_json::from_str(raw).unwrap();
        let account = &table["ada"];

        assert_eq!(account.profile.display_name, "Ada");
        assert_eq!(account.profile.stats.total_walks, 2);
        assert_eq!(account.password.as_deref(), Some("hunter2"));
        assert!(account.password_hash.is_none());
        assert_eq!(account.profile.display_total_distance(), "1.5");
        assert_eq!(account.profile.display_total_time(), "10m");
    }

    #[test]
    fn public_record_never_carries_credentials() {
        let account = StoredAccount {
            profile: PublicUser {
                username: "ada".into(),
                display_name: "Ada".into(),
                created_at: 0,
                stats: UserStats::default(),
            },
            password_hash: Some("$argon2id$...".into()),
            password: None,
        };
        let json = serde_json::to_value(&account.profile).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password").is_none());
        assert_eq!(json["stats"]["totalWalks"], 0);
    }
}
