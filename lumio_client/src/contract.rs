//! Contract query/transaction surface.
//!
//! The real binding (SCALE encoding, RPC transport, signing) lives outside
//! this crate; everything here talks to the contract through
//! [`ForumContract`]. [`LocalForum`] is an in-process implementation with the
//! same rules as the deployed program, used by the shell and the tests. It
//! can keep its state in the local database so ids survive a restart.

use crate::database::models::LocalStateRecord;
use crate::database::repositories::LocalStateRepository;
use crate::database::Database;
use crate::error::{ClientError, ClientResult};
use crate::utils::now_millis;
use async_trait::async_trait;
use lumio_io::{
    ActorId, CommentView, PostView, ProfileUpdate, ProfileView, UpvoteToggle, MAX_BIO_LEN,
    MAX_COMMENT_LEN, MAX_POST_LEN, MAX_SOCIAL_HANDLE_LEN, MAX_USERNAME_LEN,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

#[async_trait]
pub trait ForumContract: Send + Sync {
    /// Identifier of the deployed program instance.
    fn program_id(&self) -> ActorId;

    async fn create_post(
        &self,
        signer: &ActorId,
        text: &str,
        image_uri: Option<&str>,
    ) -> ClientResult<u64>;

    async fn create_comment(
        &self,
        signer: &ActorId,
        post_id: u64,
        parent_id: Option<u64>,
        text: &str,
        image_uri: Option<&str>,
    ) -> ClientResult<u64>;

    async fn toggle_upvote(&self, signer: &ActorId, post_id: u64) -> ClientResult<UpvoteToggle>;

    async fn toggle_comment_upvote(
        &self,
        signer: &ActorId,
        comment_id: u64,
    ) -> ClientResult<UpvoteToggle>;

    async fn update_profile(&self, signer: &ActorId, update: &ProfileUpdate) -> ClientResult<()>;

    /// Newest first.
    async fn get_all_posts(&self) -> ClientResult<Vec<PostView>>;

    /// Oldest first, as stored.
    async fn get_comments(&self, post_id: u64) -> ClientResult<Vec<CommentView>>;

    async fn get_profile(&self, wallet: &ActorId) -> ClientResult<Option<ProfileView>>;

    async fn get_vibes_balance(&self, wallet: &ActorId) -> ClientResult<u128>;
}

const SNAPSHOT_PREFIX: &str = "local_forum_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ForumState {
    next_id: u64,
    posts: BTreeMap<u64, PostView>,
    comments: BTreeMap<u64, CommentView>,
    post_upvotes: HashSet<(u64, ActorId)>,
    comment_upvotes: HashSet<(u64, ActorId)>,
    profiles: HashMap<ActorId, ProfileView>,
    balances: HashMap<ActorId, u128>,
}

impl ForumState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    fn credit(&mut self, wallet: &ActorId, amount: u128, is_post: bool) {
        let balance = self.balances.entry(*wallet).or_default();
        *balance = balance.saturating_add(amount);
        if let Some(profile) = self.profiles.get_mut(wallet) {
            profile.total_vibes_earned = profile.total_vibes_earned.saturating_add(amount);
            if is_post {
                profile.total_posts = profile.total_posts.saturating_add(1);
            }
        }
    }
}

/// Posts and comments earn vibes on-chain; upvotes are only tracked by the
/// client ledger.
const POST_REWARD: u128 = 50;
const COMMENT_REWARD: u128 = 25;

pub struct LocalForum {
    program_id: ActorId,
    state: Mutex<ForumState>,
    database: Option<Database>,
}

impl LocalForum {
    /// Memory-only forum; everything is gone when it is dropped.
    pub fn new(program_id: ActorId) -> Self {
        Self {
            program_id,
            state: Mutex::new(ForumState::default()),
            database: None,
        }
    }

    /// Forum whose state is kept in `database`, one snapshot per program id.
    pub fn open(program_id: ActorId, database: Database) -> ClientResult<Self> {
        let key = snapshot_key(&program_id);
        let stored = database.with_repositories(|repos| repos.local_state().get(&key))?;
        let state = match stored {
            Some(record) => serde_json::from_str(&record.value).map_err(anyhow::Error::from)?,
            None => ForumState::default(),
        };
        tracing::debug!(program = %program_id, next_id = state.next_id, "local forum opened");
        Ok(Self {
            program_id,
            state: Mutex::new(state),
            database: Some(database),
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ForumState) -> ClientResult<T>) -> ClientResult<T> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| ClientError::remote("forum state poisoned"))?;
        f(&mut guard)
    }

    /// Applies `f` to a copy and only keeps it once the snapshot is stored.
    fn transact<T>(&self, f: impl FnOnce(&mut ForumState) -> ClientResult<T>) -> ClientResult<T> {
        self.with_state(|state| {
            let mut next = state.clone();
            let out = f(&mut next)?;
            self.persist(&next)?;
            *state = next;
            Ok(out)
        })
    }

    fn persist(&self, state: &ForumState) -> ClientResult<()> {
        let Some(database) = &self.database else {
            return Ok(());
        };
        let row = LocalStateRecord {
            key: snapshot_key(&self.program_id),
            value: serde_json::to_string(state).map_err(anyhow::Error::from)?,
            updated_at: Some(now_millis().to_string()),
        };
        database.with_repositories(|repos| repos.local_state().put(&row))?;
        Ok(())
    }
}

fn snapshot_key(program_id: &ActorId) -> String {
    format!("{SNAPSHOT_PREFIX}{}", program_id.to_hex())
}

#[async_trait]
impl ForumContract for LocalForum {
    fn program_id(&self) -> ActorId {
        self.program_id
    }

    async fn create_post(
        &self,
        signer: &ActorId,
        text: &str,
        image_uri: Option<&str>,
    ) -> ClientResult<u64> {
        let text = validate_text(text, MAX_POST_LEN, "Post")?;
        let image_uri = clean_optional(image_uri);
        self.transact(|state| {
            let id = state.next_id();
            state.posts.insert(
                id,
                PostView {
                    id,
                    author: *signer,
                    text,
                    image_uri,
                    created_at: now_millis(),
                    upvotes: 0,
                    comment_count: 0,
                },
            );
            state.credit(signer, POST_REWARD, true);
            Ok(id)
        })
    }

    async fn create_comment(
        &self,
        signer: &ActorId,
        post_id: u64,
        parent_id: Option<u64>,
        text: &str,
        image_uri: Option<&str>,
    ) -> ClientResult<u64> {
        let text = validate_text(text, MAX_COMMENT_LEN, "Comment")?;
        let image_uri = clean_optional(image_uri);
        self.transact(|state| {
            if !state.posts.contains_key(&post_id) {
                return Err(ClientError::NotFound(format!("Post {post_id}")));
            }
            if let Some(parent_id) = parent_id {
                match state.comments.get(&parent_id) {
                    Some(parent) if parent.post_id == post_id => {}
                    Some(_) => {
                        return Err(ClientError::remote("Parent comment belongs to another post"))
                    }
                    None => return Err(ClientError::NotFound(format!("Parent comment {parent_id}"))),
                }
            }
            let id = state.next_id();
            state.comments.insert(
                id,
                CommentView {
                    id,
                    post_id,
                    parent_id,
                    author: *signer,
                    text,
                    image_uri,
                    created_at: now_millis(),
                    upvotes: 0,
                    reply_count: 0,
                },
            );
            if let Some(post) = state.posts.get_mut(&post_id) {
                post.comment_count = post.comment_count.saturating_add(1);
            }
            if let Some(parent) = parent_id.and_then(|pid| state.comments.get_mut(&pid)) {
                parent.reply_count = parent.reply_count.saturating_add(1);
            }
            state.credit(signer, COMMENT_REWARD, false);
            Ok(id)
        })
    }

    async fn toggle_upvote(&self, signer: &ActorId, post_id: u64) -> ClientResult<UpvoteToggle> {
        self.transact(|state| {
            let Some(post) = state.posts.get_mut(&post_id) else {
                return Err(ClientError::NotFound(format!("Post {post_id}")));
            };
            let key = (post_id, *signer);
            if state.post_upvotes.remove(&key) {
                post.upvotes = post.upvotes.saturating_sub(1);
                return Ok(UpvoteToggle {
                    upvotes: post.upvotes,
                    is_upvoted: false,
                });
            }
            state.post_upvotes.insert(key);
            post.upvotes = post.upvotes.saturating_add(1);
            Ok(UpvoteToggle {
                upvotes: post.upvotes,
                is_upvoted: true,
            })
        })
    }

    async fn toggle_comment_upvote(
        &self,
        signer: &ActorId,
        comment_id: u64,
    ) -> ClientResult<UpvoteToggle> {
        self.transact(|state| {
            let Some(comment) = state.comments.get_mut(&comment_id) else {
                return Err(ClientError::NotFound(format!("Comment {comment_id}")));
            };
            let key = (comment_id, *signer);
            if state.comment_upvotes.remove(&key) {
                comment.upvotes = comment.upvotes.saturating_sub(1);
                return Ok(UpvoteToggle {
                    upvotes: comment.upvotes,
                    is_upvoted: false,
                });
            }
            state.comment_upvotes.insert(key);
            comment.upvotes = comment.upvotes.saturating_add(1);
            Ok(UpvoteToggle {
                upvotes: comment.upvotes,
                is_upvoted: true,
            })
        })
    }

    async fn update_profile(&self, signer: &ActorId, update: &ProfileUpdate) -> ClientResult<()> {
        let username = validate_field(update.username.as_deref(), MAX_USERNAME_LEN, "Username")?;
        let social_handle =
            validate_field(update.social_handle.as_deref(), MAX_SOCIAL_HANDLE_LEN, "Social handle")?;
        let description = validate_field(update.description.as_deref(), MAX_BIO_LEN, "Bio")?;
        let avatar_uri = clean_optional(update.avatar_uri.as_deref());
        self.transact(|state| {
            let total_posts = state
                .posts
                .values()
                .filter(|post| post.author == *signer)
                .count() as u32;
            let earned = state.balances.get(signer).copied().unwrap_or_default();
            let profile = state.profiles.entry(*signer).or_insert_with(|| ProfileView {
                created_at: now_millis(),
                total_posts,
                total_vibes_earned: earned,
                ..ProfileView::empty(*signer)
            });
            profile.username = username;
            profile.social_handle = social_handle;
            profile.description = description;
            profile.avatar_uri = avatar_uri;
            Ok(())
        })
    }

    async fn get_all_posts(&self) -> ClientResult<Vec<PostView>> {
        self.with_state(|state| Ok(state.posts.values().rev().cloned().collect()))
    }

    async fn get_comments(&self, post_id: u64) -> ClientResult<Vec<CommentView>> {
        self.with_state(|state| {
            Ok(state
                .comments
                .values()
                .filter(|comment| comment.post_id == post_id)
                .cloned()
                .collect())
        })
    }

    async fn get_profile(&self, wallet: &ActorId) -> ClientResult<Option<ProfileView>> {
        self.with_state(|state| Ok(state.profiles.get(wallet).cloned()))
    }

    async fn get_vibes_balance(&self, wallet: &ActorId) -> ClientResult<u128> {
        self.with_state(|state| Ok(state.balances.get(wallet).copied().unwrap_or_default()))
    }
}

fn validate_text(text: &str, max_len: usize, what: &str) -> ClientResult<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ClientError::remote(format!("{what} text is empty")));
    }
    if trimmed.len() > max_len {
        return Err(ClientError::remote(format!(
            "{what} too long (max {max_len} chars)"
        )));
    }
    Ok(trimmed.to_string())
}

fn validate_field(value: Option<&str>, max_len: usize, what: &str) -> ClientResult<Option<String>> {
    let value = clean_optional(value);
    if let Some(value) = value.as_deref() {
        if value.chars().count() > max_len {
            return Err(ClientError::remote(format!(
                "{what} too long (max {max_len} chars)"
            )));
        }
    }
    Ok(value)
}

fn clean_optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forum() -> LocalForum {
        LocalForum::new(ActorId::new([0x77; 32]))
    }

    fn actor(byte: u8) -> ActorId {
        ActorId::new([byte; 32])
    }

    #[tokio::test]
    async fn create_post_trims_and_rejects_empty() {
        let forum = forum();
        let id = forum.create_post(&actor(1), "  hello  ", None).await.unwrap();
        let posts = forum.get_all_posts().await.unwrap();
        assert_eq!(posts[0].id, id);
        assert_eq!(posts[0].text, "hello");

        let err = forum.create_post(&actor(1), "   ", None).await.unwrap_err();
        assert_eq!(err.user_message(), "Post text is empty");
        let long = "x".repeat(MAX_POST_LEN + 1);
        let err = forum.create_post(&actor(1), &long, None).await.unwrap_err();
        assert_eq!(err.user_message(), "Post too long (max 280 chars)");
    }

    #[tokio::test]
    async fn persisted_forum_resumes_ids_and_balances() {
        let database = Database::open_in_memory().unwrap();
        let program = actor(0x77);
        let forum = LocalForum::open(program, database.clone()).unwrap();
        let first = forum.create_post(&actor(1), "before restart", None).await.unwrap();
        forum
            .create_comment(&actor(2), first, None, "reply", None)
            .await
            .unwrap();
        forum.toggle_upvote(&actor(2), first).await.unwrap();
        drop(forum);

        let reopened = LocalForum::open(program, database.clone()).unwrap();
        let second = reopened.create_post(&actor(1), "after restart", None).await.unwrap();
        assert!(second > first);
        let posts = reopened.get_all_posts().await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[1].upvotes, 1);
        assert_eq!(reopened.get_vibes_balance(&actor(1)).await.unwrap(), 100);

        // another program id starts from nothing
        let other = LocalForum::open(actor(0x78), database).unwrap();
        assert!(other.get_all_posts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_transaction_is_not_persisted() {
        let database = Database::open_in_memory().unwrap();
        let forum = LocalForum::open(actor(0x77), database.clone()).unwrap();
        assert!(forum.create_post(&actor(1), "   ", None).await.is_err());
        assert!(forum.toggle_upvote(&actor(1), 9).await.is_err());
        let reopened = LocalForum::open(actor(0x77), database).unwrap();
        assert_eq!(reopened.create_post(&actor(1), "first", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn posts_are_listed_newest_first() {
        let forum = forum();
        let first = forum.create_post(&actor(1), "first", None).await.unwrap();
        let second = forum.create_post(&actor(1), "second", None).await.unwrap();
        let ids: Vec<u64> = forum
            .get_all_posts()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[tokio::test]
    async fn upvote_toggles_per_voter() {
        let forum = forum();
        let post = forum.create_post(&actor(1), "vote me", None).await.unwrap();
        let on = forum.toggle_upvote(&actor(2), post).await.unwrap();
        assert_eq!(on, UpvoteToggle { upvotes: 1, is_upvoted: true });
        let other = forum.toggle_upvote(&actor(3), post).await.unwrap();
        assert_eq!(other.upvotes, 2);
        let off = forum.toggle_upvote(&actor(2), post).await.unwrap();
        assert_eq!(off, UpvoteToggle { upvotes: 1, is_upvoted: false });
        assert!(forum.toggle_upvote(&actor(2), 999).await.is_err());
    }

    #[tokio::test]
    async fn comments_update_counters() {
        let forum = forum();
        let post = forum.create_post(&actor(1), "post", None).await.unwrap();
        let root = forum
            .create_comment(&actor(2), post, None, "root", None)
            .await
            .unwrap();
        forum
            .create_comment(&actor(3), post, Some(root), "reply", None)
            .await
            .unwrap();
        let posts = forum.get_all_posts().await.unwrap();
        assert_eq!(posts[0].comment_count, 2);
        let comments = forum.get_comments(post).await.unwrap();
        assert_eq!(comments[0].reply_count, 1);
        assert!(forum
            .create_comment(&actor(3), post, Some(12345), "lost", None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn profile_and_balance_track_contract_rewards() {
        let forum = forum();
        let me = actor(4);
        assert!(forum.get_profile(&me).await.unwrap().is_none());
        forum.create_post(&me, "gm", None).await.unwrap();
        forum
            .update_profile(
                &me,
                &ProfileUpdate {
                    username: Some(" vibe ".into()),
                    social_handle: Some("".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        let profile = forum.get_profile(&me).await.unwrap().expect("profile");
        assert_eq!(profile.username.as_deref(), Some("vibe"));
        assert_eq!(profile.social_handle, None);
        assert_eq!(profile.total_posts, 1);
        assert_eq!(profile.total_vibes_earned, 50);
        assert_eq!(forum.get_vibes_balance(&me).await.unwrap(), 50);

        let too_long = ProfileUpdate {
            description: Some("b".repeat(MAX_BIO_LEN + 1)),
            ..ProfileUpdate::default()
        };
        assert!(forum.update_profile(&me, &too_long).await.is_err());
    }
}
