use crate::address;
use crate::config::LumioConfig;
use crate::contract::{ForumContract, LocalForum};
use crate::database::Database;
use crate::error::{ClientError, ClientResult};
use crate::ledger::{ActionKind, LedgerRecord, RewardLedger, UpvoteTarget};
use crate::media::MediaStore;
use crate::profiles::{ProfileLookup, ProfileResolver};
use crate::threading::{build_comment_tree, ThreadedComment};
use lumio_io::{ActorId, PostView, ProfileUpdate, ProfileView, UpvoteToggle};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct FeedComment {
    pub thread: ThreadedComment,
    pub author: ProfileLookup,
}

#[derive(Debug, Clone)]
pub struct FeedPost {
    pub post: PostView,
    pub author: ProfileLookup,
    pub comments: Vec<FeedComment>,
}

#[derive(Debug, Clone, Default)]
pub struct Feed {
    pub posts: Vec<FeedPost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VibesSummary {
    pub account: ActorId,
    /// Balance tracked by the contract (posts and comments only).
    pub contract_balance: u128,
    /// Device-local total, including upvotes given.
    pub local_total: u64,
    pub posts: usize,
    pub comments: usize,
    pub post_upvotes: usize,
    pub comment_upvotes: usize,
}

impl VibesSummary {
    fn new(account: ActorId, contract_balance: u128, record: &LedgerRecord) -> Self {
        Self {
            account,
            contract_balance,
            local_total: record.total(),
            posts: record.posts.len(),
            comments: record.comments.len(),
            post_upvotes: record.upvoted_posts.len(),
            comment_upvotes: record.upvoted_comments.len(),
        }
    }
}

#[derive(Clone)]
pub struct LumioClient {
    config: LumioConfig,
    program_id: ActorId,
    contract: Arc<dyn ForumContract>,
    profiles: ProfileResolver,
    ledger: RewardLedger,
    media: MediaStore,
    account: Option<ActorId>,
    own_profile: Arc<RwLock<Option<ProfileView>>>,
    latest_feed: Arc<RwLock<Option<Feed>>>,
}

impl LumioClient {
    pub fn new(
        config: LumioConfig,
        contract: Arc<dyn ForumContract>,
        database: Database,
    ) -> ClientResult<Self> {
        let program_id = match config.program_id {
            Some(configured) => {
                if configured != contract.program_id() {
                    tracing::warn!(
                        configured = %configured,
                        contract = %contract.program_id(),
                        "configured program id differs from the contract binding"
                    );
                }
                configured
            }
            None => contract.program_id(),
        };
        let media = MediaStore::new(config.media.clone())?;
        Ok(Self {
            profiles: ProfileResolver::new(contract.clone()),
            ledger: RewardLedger::new(database),
            media,
            program_id,
            contract,
            config,
            account: None,
            own_profile: Arc::new(RwLock::new(None)),
            latest_feed: Arc::new(RwLock::new(None)),
        })
    }

    /// Client over the on-disk database with a [`LocalForum`] stored in the
    /// same file. Without a configured program id an all-zero id is used.
    pub fn open_local(config: LumioConfig) -> ClientResult<Self> {
        let database = Database::connect(&config.paths)?;
        if database.ensure_migrations()? {
            tracing::info!(path = %config.paths.db_path.display(), "created local state database");
        }
        let program_id = config.program_id.unwrap_or_default();
        let contract = Arc::new(LocalForum::open(program_id, database.clone())?);
        Self::new(config, contract, database)
    }

    pub fn config(&self) -> &LumioConfig {
        &self.config
    }

    pub fn program_id(&self) -> ActorId {
        self.program_id
    }

    pub fn account(&self) -> Option<ActorId> {
        self.account
    }

    pub fn profiles(&self) -> &ProfileResolver {
        &self.profiles
    }

    pub fn ledger(&self) -> &RewardLedger {
        &self.ledger
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    /// Selects the signing account. Accepts hex or SS58.
    pub fn connect(&mut self, raw: &str) -> ClientResult<ActorId> {
        let account = address::parse_account(raw)?;
        if self.account != Some(account) {
            self.set_own_profile(None);
        }
        self.account = Some(account);
        tracing::info!(
            account = %account,
            ss58 = %address::encode_ss58(&account, self.config.ss58_prefix),
            "wallet connected"
        );
        Ok(account)
    }

    pub fn disconnect(&mut self) {
        self.account = None;
        self.set_own_profile(None);
    }

    fn require_account(&self) -> ClientResult<ActorId> {
        self.account.ok_or(ClientError::WalletNotConnected)
    }

    pub async fn create_post(&self, text: &str, image_uri: Option<&str>) -> ClientResult<u64> {
        let account = self.require_account()?;
        let post_id = self
            .contract
            .create_post(&account, text, image_uri)
            .await
            .inspect_err(|err| tracing::warn!(error = %err, "create post failed"))?;
        let total = self.record_reward(&account, ActionKind::Post, post_id);
        tracing::info!(post_id, vibes = ?total, "post created");
        self.schedule_feed_reload();
        Ok(post_id)
    }

    pub async fn create_comment(
        &self,
        post_id: u64,
        parent_id: Option<u64>,
        text: &str,
        image_uri: Option<&str>,
    ) -> ClientResult<u64> {
        let account = self.require_account()?;
        let comment_id = self
            .contract
            .create_comment(&account, post_id, parent_id, text, image_uri)
            .await
            .inspect_err(|err| tracing::warn!(post_id, error = %err, "create comment failed"))?;
        let total = self.record_reward(&account, ActionKind::Comment, comment_id);
        tracing::info!(post_id, comment_id, vibes = ?total, "comment created");
        self.schedule_feed_reload();
        Ok(comment_id)
    }

    pub async fn toggle_post_upvote(&self, post_id: u64) -> ClientResult<UpvoteToggle> {
        self.toggle(UpvoteTarget::Post, post_id).await
    }

    pub async fn toggle_comment_upvote(&self, comment_id: u64) -> ClientResult<UpvoteToggle> {
        self.toggle(UpvoteTarget::Comment, comment_id).await
    }

    async fn toggle(&self, target: UpvoteTarget, target_id: u64) -> ClientResult<UpvoteToggle> {
        let account = self.require_account()?;
        let key = target_id.to_string();
        let was_upvoted = self
            .ledger
            .has_upvoted(&account, &self.program_id, target, &key)
            .unwrap_or_else(|err| {
                tracing::warn!(target_id, error = %err, "failed to read upvote ledger");
                false
            });

        let result = match target {
            UpvoteTarget::Post => self.contract.toggle_upvote(&account, target_id).await,
            UpvoteTarget::Comment => {
                self.contract
                    .toggle_comment_upvote(&account, target_id)
                    .await
            }
        }
        .inspect_err(|err| tracing::warn!(target_id, error = %err, "upvote failed"))?;

        match self
            .ledger
            .set_upvoted(&account, &self.program_id, target, &key, !was_upvoted)
        {
            Ok(change) => {
                if change.added != result.is_upvoted {
                    tracing::debug!(
                        target_id,
                        local = change.added,
                        contract = result.is_upvoted,
                        "local upvote ledger disagrees with contract"
                    );
                }
                tracing::info!(target_id, upvotes = result.upvotes, vibes = change.total, "upvote toggled");
            }
            Err(err) => {
                tracing::warn!(target_id, error = %err, "upvote sent but ledger update failed");
            }
        }
        self.schedule_feed_reload();
        Ok(result)
    }

    /// Ledger writes follow a committed transaction, so a failure here is
    /// logged and never reported as a failed action.
    fn record_reward(&self, account: &ActorId, kind: ActionKind, action_id: u64) -> Option<u64> {
        self.ledger
            .record_action(account, &self.program_id, kind, &action_id.to_string())
            .inspect_err(|err| {
                tracing::warn!(action_id, error = %err, "transaction sent but ledger update failed")
            })
            .ok()
    }

    /// Sends the update and re-reads the profile once the chain has had
    /// time to include it.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> ClientResult<Option<JoinHandle<()>>> {
        let account = self.require_account()?;
        self.contract
            .update_profile(&account, update)
            .await
            .inspect_err(|err| tracing::warn!(error = %err, "profile update failed"))?;
        tracing::info!(account = %account, "profile update sent");

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return Ok(None);
        };
        let client = self.clone();
        let delay = self.config.timing.profile_reload_delay;
        Ok(Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = client.load_own_profile().await {
                tracing::warn!(error = %err, "profile reload failed");
            }
        })))
    }

    pub async fn load_own_profile(&self) -> ClientResult<ProfileLookup> {
        let account = self.require_account()?;
        match self.contract.get_profile(&account).await? {
            Some(profile) => {
                self.profiles.insert(profile.clone());
                self.set_own_profile(Some(profile.clone()));
                Ok(ProfileLookup::Found(profile))
            }
            None => Ok(ProfileLookup::Empty(account)),
        }
    }

    pub fn own_profile(&self) -> Option<ProfileView> {
        self.own_profile.read().ok().and_then(|guard| guard.clone())
    }

    fn set_own_profile(&self, profile: Option<ProfileView>) {
        if let Ok(mut guard) = self.own_profile.write() {
            *guard = profile;
        }
    }

    /// Posts with their threaded comments and whatever the profile cache
    /// knows about each author. A post whose comments fail to load is kept
    /// with an empty thread.
    pub async fn load_feed(&self) -> ClientResult<Feed> {
        let posts = self.contract.get_all_posts().await?;
        let own = self.own_profile();
        let mut feed = Feed::default();
        for post in posts {
            let comments = match self.contract.get_comments(post.id).await {
                Ok(comments) => comments,
                Err(err) => {
                    tracing::warn!(post_id = post.id, error = %err, "failed to load comments");
                    Vec::new()
                }
            };
            let comments = build_comment_tree(&comments)
                .into_iter()
                .map(|thread| FeedComment {
                    author: self.author_lookup(own.as_ref(), &thread.comment.author),
                    thread,
                })
                .collect();
            feed.posts.push(FeedPost {
                author: self.author_lookup(own.as_ref(), &post.author),
                post,
                comments,
            });
        }
        if let Ok(mut latest) = self.latest_feed.write() {
            *latest = Some(feed.clone());
        }
        Ok(feed)
    }

    /// Last feed produced by `load_feed`, including background reloads.
    pub fn latest_feed(&self) -> Option<Feed> {
        self.latest_feed.read().ok().and_then(|guard| guard.clone())
    }

    /// Reloads the feed after the configured delay. Returns `None` outside a
    /// runtime.
    pub fn schedule_feed_reload(&self) -> Option<JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        let client = self.clone();
        let delay = self.config.timing.reload_delay;
        Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = client.load_feed().await {
                tracing::warn!(error = %err, "feed reload failed");
            }
        }))
    }

    fn author_lookup(&self, own: Option<&ProfileView>, author: &ActorId) -> ProfileLookup {
        match own {
            Some(profile) if profile.wallet == *author => ProfileLookup::Found(profile.clone()),
            _ => self.profiles.resolve(&author.to_hex()).lookup,
        }
    }

    /// Posts authored by `wallet`, newest first.
    pub async fn user_posts(&self, wallet: &ActorId) -> ClientResult<Vec<PostView>> {
        let mut posts: Vec<PostView> = self
            .contract
            .get_all_posts()
            .await?
            .into_iter()
            .filter(|post| post.author == *wallet)
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(posts)
    }

    pub async fn vibes_summary(&self, account: &ActorId) -> ClientResult<VibesSummary> {
        let contract_balance = self.contract.get_vibes_balance(account).await?;
        let record = self.ledger.load(account, &self.program_id)?;
        Ok(VibesSummary::new(*account, contract_balance, &record))
    }

    pub async fn upload_media(&self, path: &Path) -> ClientResult<String> {
        let bytes = tokio::fs::read(path).await.map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => ClientError::NotFound(format!("File {}", path.display())),
            _ => ClientError::Validation(format!("failed to read {}: {err}", path.display())),
        })?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload");
        self.media.upload(file_name, bytes, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LumioPaths, TimingConfig};

    fn client() -> LumioClient {
        let contract = Arc::new(LocalForum::new(ActorId::new([9; 32])));
        let config = LumioConfig::new(LumioPaths::default(), None).with_timing(TimingConfig::immediate());
        LumioClient::new(config, contract, Database::open_in_memory().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn actions_require_a_wallet() {
        let client = client();
        let err = client.create_post("hello", None).await.unwrap_err();
        assert!(matches!(err, ClientError::WalletNotConnected));
        assert!(client.toggle_post_upvote(1).await.is_err());
    }

    #[tokio::test]
    async fn ledger_storage_failure_does_not_fail_the_action() {
        let contract = Arc::new(LocalForum::new(ActorId::new([9; 32])));
        // no migrations, so every ledger read and write errors
        let broken = Database::from_connection(rusqlite::Connection::open_in_memory().unwrap(), true);
        let config = LumioConfig::new(LumioPaths::default(), None).with_timing(TimingConfig::immediate());
        let mut client = LumioClient::new(config, contract.clone(), broken).unwrap();
        let account = client.connect(&ActorId::new([5; 32]).to_hex()).unwrap();

        let post_id = client.create_post("still posted", None).await.unwrap();
        client.create_comment(post_id, None, "and commented", None).await.unwrap();
        let toggle = client.toggle_post_upvote(post_id).await.unwrap();
        assert!(toggle.is_upvoted);

        let posts = client.user_posts(&account).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].comment_count, 1);
        assert!(client.schedule_feed_reload().is_some());
    }

    #[tokio::test]
    async fn failed_transaction_leaves_ledger_alone() {
        let mut client = client();
        let account = client.connect(&ActorId::new([1; 32]).to_hex()).unwrap();
        assert!(client.create_post("   ", None).await.is_err());
        assert!(client.toggle_post_upvote(404).await.is_err());
        let summary = client.vibes_summary(&account).await.unwrap();
        assert_eq!(summary.local_total, 0);
    }

    #[tokio::test]
    async fn missing_targets_report_not_found() {
        let mut client = client();
        client.connect(&ActorId::new([6; 32]).to_hex()).unwrap();
        let err = client.toggle_post_upvote(404).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
        assert_eq!(err.user_message(), "Post 404 not found");

        let err = client
            .upload_media(Path::new("/nonexistent/lumio/avatar.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
    }

    #[tokio::test]
    async fn own_profile_wins_for_own_posts() {
        let mut client = client();
        let account = client.connect(&ActorId::new([2; 32]).to_hex()).unwrap();
        client
            .update_profile(&ProfileUpdate {
                username: Some("me".into()),
                ..ProfileUpdate::default()
            })
            .await
            .unwrap();
        client.load_own_profile().await.unwrap();
        client.create_post("mine", None).await.unwrap();

        let feed = client.load_feed().await.unwrap();
        let author = feed.posts[0].author.profile().unwrap();
        assert_eq!(author.wallet, account);
        assert_eq!(author.username.as_deref(), Some("me"));
    }

    #[tokio::test]
    async fn user_posts_filters_by_author() {
        let mut client = client();
        let alice = ActorId::new([3; 32]);
        client.connect(&alice.to_hex()).unwrap();
        client.create_post("one", None).await.unwrap();
        client.create_post("two", None).await.unwrap();
        client.connect(&ActorId::new([4; 32]).to_hex()).unwrap();
        client.create_post("other", None).await.unwrap();

        let posts = client.user_posts(&alice).await.unwrap();
        let texts: Vec<_> = posts.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["two", "one"]);
    }
}
