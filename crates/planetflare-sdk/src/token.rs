/// Access tokens handed out by the publisher
/// A token is 128 random bits rendered as 32 lowercase hex characters. It carries
/// no bounty or provider affinity, so any provider may redeem any token once.
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SdkError};

pub const TOKEN_BYTES: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token([u8; TOKEN_BYTES]);

impl Token {
    /// Draw a fresh token from the OS CSPRNG
    pub fn random() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; TOKEN_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TOKEN_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.to_hex())
    }
}

impl FromStr for Token {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != TOKEN_BYTES * 2 {
            return Err(SdkError::InvalidInput(format!(
                "token must be {} hex characters, got {}",
                TOKEN_BYTES * 2,
                s.len()
            )));
        }
        let mut bytes = [0u8; TOKEN_BYTES];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| SdkError::InvalidInput(format!("token is not valid hex: {}", e)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Body of `GET /get_tokens`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokensResponse {
    pub tokens: Vec<Token>,
}
