//! Data types exchanged with the lumio-social contract.
//!
//! These mirror what the contract returns from its queries and accepts in its
//! transactions. Account ids travel as canonical `0x`-prefixed lowercase hex.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

pub const MAX_POST_LEN: usize = 280;
pub const MAX_COMMENT_LEN: usize = 500;
pub const MAX_USERNAME_LEN: usize = 50;
pub const MAX_SOCIAL_HANDLE_LEN: usize = 30;
pub const MAX_BIO_LEN: usize = 160;

/// 32-byte account or program identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ActorId([u8; 32]);

impl ActorId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; 32] {
        self.0
    }

    /// Canonical `0x` + 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses only the canonical hex form (prefix optional, any case).
    pub fn from_hex(raw: &str) -> Option<Self> {
        let body = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        if body.len() != 64 {
            return None;
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(body, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl From<[u8; 32]> for ActorId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.to_hex())
    }
}

impl Serialize for ActorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ActorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ActorIdVisitor;

        impl<'de> Visitor<'de> for ActorIdVisitor {
            type Value = ActorId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 32-byte hex string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<ActorId, E> {
                ActorId::from_hex(value)
                    .ok_or_else(|| E::custom(format!("invalid actor id: {value}")))
            }
        }

        deserializer.deserialize_str(ActorIdVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub id: u64,
    pub author: ActorId,
    pub text: String,
    #[serde(default)]
    pub image_uri: Option<String>,
    pub created_at: u64,
    pub upvotes: u32,
    #[serde(default)]
    pub comment_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: u64,
    pub post_id: u64,
    /// `None` for top-level comments.
    #[serde(default)]
    pub parent_id: Option<u64>,
    pub author: ActorId,
    pub text: String,
    #[serde(default)]
    pub image_uri: Option<String>,
    pub created_at: u64,
    pub upvotes: u32,
    #[serde(default)]
    pub reply_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileView {
    pub wallet: ActorId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub social_handle: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar_uri: Option<String>,
    pub created_at: u64,
    pub total_posts: u32,
    #[serde(default)]
    pub total_vibes_earned: u128,
}

impl ProfileView {
    /// Placeholder for a wallet that has never saved a profile.
    pub fn empty(wallet: ActorId) -> Self {
        Self {
            wallet,
            username: None,
            social_handle: None,
            description: None,
            avatar_uri: None,
            created_at: 0,
            total_posts: 0,
            total_vibes_earned: 0,
        }
    }

    /// True when there is nothing worth rendering beyond the address.
    pub fn is_thin(&self) -> bool {
        self.username.is_none() && self.avatar_uri.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub social_handle: Option<String>,
    pub description: Option<String>,
    pub avatar_uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpvoteToggle {
    pub upvotes: u32,
    pub is_upvoted: bool,
}
