//! Record keys
//!
//! A key is `{flags}-{userId}-{id}`. The flag prefix tells the server how a
//! record is serialized and which file family it lives in, and the user id
//! picks the per-user directory, so both must be recoverable from the key
//! alone.
//!
//! ```text
//!   10100-alice-01HZX3K5Q7V0000000000000
//!   │││││ │     └─ id (may contain '-')
//!   │││││ └─ user id
//!   ││││└─ isFile
//!   │││└─ isHash
//!   ││└─ isObject
//!   │└─ isList
//!   └─ isJSON
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NoloError, Result};

const FLAG_COUNT: usize = 5;

/// Serialization flags packed into the key prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyFlags {
    pub is_json: bool,
    pub is_list: bool,
    pub is_object: bool,
    pub is_hash: bool,
    pub is_file: bool,
}

impl KeyFlags {
    pub fn json() -> Self {
        Self {
            is_json: true,
            ..Self::default()
        }
    }

    pub fn object() -> Self {
        Self {
            is_json: true,
            is_object: true,
            ..Self::default()
        }
    }

    pub fn hash() -> Self {
        Self {
            is_hash: true,
            ..Self::default()
        }
    }

    /// Every flag combination, in encoded (lexicographic) order
    pub fn all() -> impl Iterator<Item = KeyFlags> {
        (0u8..1 << FLAG_COUNT).map(|n| {
            let bit = |i: usize| n & (1 << (FLAG_COUNT - 1 - i)) != 0;
            Self {
                is_json: bit(0),
                is_list: bit(1),
                is_object: bit(2),
                is_hash: bit(3),
                is_file: bit(4),
            }
        })
    }

    fn bits(&self) -> [bool; FLAG_COUNT] {
        [
            self.is_json,
            self.is_list,
            self.is_object,
            self.is_hash,
            self.is_file,
        ]
    }

    fn encode(&self) -> String {
        self.bits()
            .iter()
            .map(|bit| if *bit { '1' } else { '0' })
            .collect()
    }

    fn decode(s: &str) -> Result<Self> {
        if s.len() != FLAG_COUNT || !s.bytes().all(|b| b == b'0' || b == b'1') {
            return Err(NoloError::InvalidKey(format!(
                "flag prefix must be {} binary digits, got {:?}",
                FLAG_COUNT, s
            )));
        }
        let b: Vec<bool> = s.bytes().map(|b| b == b'1').collect();
        Ok(Self {
            is_json: b[0],
            is_list: b[1],
            is_object: b[2],
            is_hash: b[3],
            is_file: b[4],
        })
    }
}

/// A parsed record key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbKey {
    pub flags: KeyFlags,
    pub user_id: String,
    pub id: String,
}

impl DbKey {
    /// Build a key, validating each component
    pub fn new(flags: KeyFlags, user_id: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        let key = Self {
            flags,
            user_id: user_id.into(),
            id: id.into(),
        };
        validate_user_id(&key.user_id)?;
        validate_id(&key.id)?;
        Ok(key)
    }

    /// Build a key with a freshly generated ULID id
    pub fn generate(flags: KeyFlags, user_id: impl Into<String>) -> Result<Self> {
        Self::new(flags, user_id, ulid::Ulid::new().to_string())
    }

    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '-');
        let (flags, user_id, id) = match (parts.next(), parts.next(), parts.next()) {
            (Some(f), Some(u), Some(i)) => (f, u, i),
            _ => {
                return Err(NoloError::InvalidKey(format!(
                    "expected {{flags}}-{{userId}}-{{id}}, got {:?}",
                    s
                )))
            }
        };
        Self::new(KeyFlags::decode(flags)?, user_id, id)
    }

    /// Key prefix shared by every record of `user_id` with exactly `flags`
    pub fn user_prefix(flags: KeyFlags, user_id: &str) -> String {
        format!("{}-{}-", flags.encode(), user_id)
    }
}

impl fmt::Display for DbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.flags.encode(), self.user_id, self.id)
    }
}

impl FromStr for DbKey {
    type Err = NoloError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(NoloError::InvalidKey("user id is empty".to_string()));
    }
    if user_id
        .chars()
        .any(|c| c == '-' || c == '/' || c == '\\' || c == '.' || c.is_whitespace())
    {
        return Err(NoloError::InvalidKey(format!(
            "user id contains a reserved character: {:?}",
            user_id
        )));
    }
    Ok(())
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(NoloError::InvalidKey("id is empty".to_string()));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(NoloError::InvalidKey(format!(
            "id contains whitespace: {:?}",
            id
        )));
    }
    Ok(())
}
