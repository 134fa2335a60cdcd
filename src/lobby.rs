//! Private lobby join codes. Only the code format is handled here; lobbies
//! themselves live elsewhere.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const JOIN_CODE_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("join code must be 6 letters or digits, got {0:?}")]
    InvalidJoinCode(String),
}

/// Six uppercase ASCII letters or digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JoinCode(String);

impl JoinCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JoinCode {
    type Err = LobbyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        validate_join_code(raw)
    }
}

impl TryFrom<String> for JoinCode {
    type Error = LobbyError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        validate_join_code(&raw)
    }
}

impl From<JoinCode> for String {
    fn from(code: JoinCode) -> Self {
        code.0
    }
}

/// Trims and uppercases `raw`, then requires exactly six ASCII alphanumerics.
pub fn validate_join_code(raw: &str) -> Result<JoinCode, LobbyError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() != JOIN_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(LobbyError::InvalidJoinCode(raw.to_string()));
    }
    Ok(JoinCode(code))
}
