//! Locally derived "vibes earned" ledger.
//!
//! The contract only exposes a running total for the actions it tracks
//! itself, so the client keeps its own per-action record for each
//! `(account, contract instance)` pair. The record is optimistic: it is
//! written after a transaction succeeds and is never reconciled against the
//! chain, so it can drift when a transaction partially fails or another
//! device acts on the same account.

use crate::database::models::LocalStateRecord;
use crate::database::repositories::LocalStateRepository;
use crate::database::Database;
use crate::error::{ClientError, ClientResult};
use crate::utils::now_millis;
use lumio_io::ActorId;
use serde::{Deserialize, Serialize};

const KEY_PREFIX: &str = "vibes_earned_";

pub const POST_VIBES: u64 = 50;
pub const COMMENT_VIBES: u64 = 25;
pub const POST_UPVOTE_VIBES: u64 = 10;
pub const COMMENT_UPVOTE_VIBES: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Post,
    Comment,
    PostUpvote,
    CommentUpvote,
}

impl ActionKind {
    pub fn weight(self) -> u64 {
        match self {
            Self::Post => POST_VIBES,
            Self::Comment => COMMENT_VIBES,
            Self::PostUpvote => POST_UPVOTE_VIBES,
            Self::CommentUpvote => COMMENT_UPVOTE_VIBES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvoteTarget {
    Post,
    Comment,
}

impl UpvoteTarget {
    fn action_kind(self) -> ActionKind {
        match self {
            Self::Post => ActionKind::PostUpvote,
            Self::Comment => ActionKind::CommentUpvote,
        }
    }
}

/// Persisted shape; field names match what earlier clients wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub posts: Vec<String>,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub upvoted_posts: Vec<String>,
    #[serde(default)]
    pub upvoted_comments: Vec<String>,
}

impl LedgerRecord {
    fn fresh(contract: &ActorId) -> Self {
        Self {
            contract_address: Some(contract.to_hex()),
            ..Self::default()
        }
    }

    pub fn set(&self, kind: ActionKind) -> &[String] {
        match kind {
            ActionKind::Post => &self.posts,
            ActionKind::Comment => &self.comments,
            ActionKind::PostUpvote => &self.upvoted_posts,
            ActionKind::CommentUpvote => &self.upvoted_comments,
        }
    }

    fn set_mut(&mut self, kind: ActionKind) -> &mut Vec<String> {
        match kind {
            ActionKind::Post => &mut self.posts,
            ActionKind::Comment => &mut self.comments,
            ActionKind::PostUpvote => &mut self.upvoted_posts,
            ActionKind::CommentUpvote => &mut self.upvoted_comments,
        }
    }

    pub fn contains(&self, kind: ActionKind, id: &str) -> bool {
        self.set(kind).iter().any(|entry| entry == id)
    }

    fn insert(&mut self, kind: ActionKind, id: &str) -> bool {
        let set = self.set_mut(kind);
        if set.iter().any(|entry| entry == id) {
            return false;
        }
        set.push(id.to_string());
        true
    }

    fn remove(&mut self, kind: ActionKind, id: &str) -> bool {
        let set = self.set_mut(kind);
        let before = set.len();
        set.retain(|entry| entry != id);
        set.len() != before
    }

    pub fn total(&self) -> u64 {
        [
            ActionKind::Post,
            ActionKind::Comment,
            ActionKind::PostUpvote,
            ActionKind::CommentUpvote,
        ]
        .into_iter()
        .map(|kind| self.set(kind).len() as u64 * kind.weight())
        .sum()
    }

    pub fn action_count(&self) -> usize {
        self.posts.len() + self.comments.len() + self.upvoted_posts.len() + self.upvoted_comments.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvoteChange {
    pub added: bool,
    pub total: u64,
}

#[derive(Clone)]
pub struct RewardLedger {
    database: Database,
}

impl RewardLedger {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// All-empty when nothing is stored or the stored record belongs to
    /// another contract instance. Never writes; a stale record stays until
    /// the next write under `contract` replaces it.
    pub fn load(&self, account: &ActorId, contract: &ActorId) -> ClientResult<LedgerRecord> {
        let stored = self
            .database
            .with_repositories(|repos| repos.local_state().get(&ledger_key(account)))?;
        let Some(stored) = stored else {
            return Ok(LedgerRecord::fresh(contract));
        };
        match decode_record(&stored.value, contract) {
            Ok(record) => Ok(record),
            Err(ClientError::PersistedStateStale { stored, expected }) => {
                tracing::debug!(
                    account = %account,
                    stored = %stored,
                    expected = %expected,
                    "discarding ledger record from another contract"
                );
                Ok(LedgerRecord::fresh(contract))
            }
            Err(err) => {
                tracing::warn!(account = %account, error = %err, "unreadable ledger record, starting fresh");
                Ok(LedgerRecord::fresh(contract))
            }
        }
    }

    pub fn total(&self, account: &ActorId, contract: &ActorId) -> ClientResult<u64> {
        Ok(self.load(account, contract)?.total())
    }

    /// Adds `action_id` to the set for `kind` and returns the new total.
    pub fn record_action(
        &self,
        account: &ActorId,
        contract: &ActorId,
        kind: ActionKind,
        action_id: &str,
    ) -> ClientResult<u64> {
        let mut record = self.load(account, contract)?;
        if record.insert(kind, action_id) {
            self.store(account, &record)?;
        }
        Ok(record.total())
    }

    pub fn has_upvoted(
        &self,
        account: &ActorId,
        contract: &ActorId,
        target: UpvoteTarget,
        target_id: &str,
    ) -> ClientResult<bool> {
        Ok(self
            .load(account, contract)?
            .contains(target.action_kind(), target_id))
    }

    /// Forces membership to `upvoted`. Callers read `has_upvoted` before
    /// sending the transaction and apply the flip once it succeeds.
    pub fn set_upvoted(
        &self,
        account: &ActorId,
        contract: &ActorId,
        target: UpvoteTarget,
        target_id: &str,
        upvoted: bool,
    ) -> ClientResult<UpvoteChange> {
        let kind = target.action_kind();
        let mut record = self.load(account, contract)?;
        let changed = if upvoted {
            record.insert(kind, target_id)
        } else {
            record.remove(kind, target_id)
        };
        if changed {
            self.store(account, &record)?;
        }
        Ok(UpvoteChange {
            added: upvoted,
            total: record.total(),
        })
    }

    /// Flips the upvote membership based on what is persisted right now.
    pub fn toggle_upvote_action(
        &self,
        account: &ActorId,
        contract: &ActorId,
        target: UpvoteTarget,
        target_id: &str,
    ) -> ClientResult<UpvoteChange> {
        let currently = self.has_upvoted(account, contract, target, target_id)?;
        self.set_upvoted(account, contract, target, target_id, !currently)
    }

    /// Accounts that have a ledger record on this device.
    pub fn known_accounts(&self) -> ClientResult<Vec<String>> {
        let records = self
            .database
            .with_repositories(|repos| repos.local_state().list_with_prefix(KEY_PREFIX))?;
        Ok(records
            .into_iter()
            .filter_map(|record| record.key.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect())
    }

    fn store(&self, account: &ActorId, record: &LedgerRecord) -> ClientResult<()> {
        let value = serde_json::to_string(record).map_err(anyhow::Error::from)?;
        let row = LocalStateRecord {
            key: ledger_key(account),
            value,
            updated_at: Some(now_millis().to_string()),
        };
        self.database
            .with_repositories(|repos| repos.local_state().put(&row))?;
        Ok(())
    }
}

fn ledger_key(account: &ActorId) -> String {
    format!("{KEY_PREFIX}{}", account.to_hex())
}

fn decode_record(raw: &str, contract: &ActorId) -> ClientResult<LedgerRecord> {
    let record: LedgerRecord = serde_json::from_str(raw).map_err(anyhow::Error::from)?;
    let expected = contract.to_hex();
    match record.contract_address.as_deref() {
        Some(stored) if stored.eq_ignore_ascii_case(&expected) => Ok(record),
        stored => Err(ClientError::PersistedStateStale {
            stored: stored.unwrap_or("<untagged>").to_string(),
            expected,
        }),
    }
}
