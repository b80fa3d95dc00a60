use crate::address;
use crate::client::{Feed, LumioClient};
use crate::profiles::ProfileLookup;
use crate::utils::{display_handle, format_address};
use anyhow::{anyhow, Result};
use lumio_io::{ActorId, ProfileUpdate};
use std::io::{self, Write};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Run the interactive shell for posting, commenting, and checking vibes.
pub async fn run_shell(client: LumioClient) -> Result<()> {
    let mut session = CliSession { client };

    println!("Lumio shell ready. Type 'help' for a list of commands.");
    println!("Program: {}", session.client.program_id());

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);

    loop {
        print!("lumio> ");
        io::stdout().flush()?;

        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            println!("Exiting");
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let tokens = match shell_words::split(trimmed) {
            Ok(tokens) if !tokens.is_empty() => tokens,
            Ok(_) => continue,
            Err(err) => {
                println!("Unable to parse command: {err}");
                continue;
            }
        };

        match session.handle_command(&tokens).await {
            Ok(LoopAction::Continue) => {}
            Ok(LoopAction::Exit) => break,
            Err(err) => {
                println!("Error: {err:#}");
            }
        }
    }
    Ok(())
}

struct CliSession {
    client: LumioClient,
}

enum LoopAction {
    Continue,
    Exit,
}

impl CliSession {
    async fn handle_command(&mut self, tokens: &[String]) -> Result<LoopAction> {
        let command = tokens[0].as_str();
        let (image, args) = take_flag(&tokens[1..], "--image");
        match command {
            "help" => {
                self.print_help();
                Ok(LoopAction::Continue)
            }
            "connect" => {
                let Some(raw) = args.first() else {
                    println!("Usage: connect <address>");
                    return Ok(LoopAction::Continue);
                };
                let account = self.client.connect(raw)?;
                println!("Connected as {}", format_address(&account.to_hex()));
                if let ProfileLookup::Found(profile) = self.client.load_own_profile().await? {
                    println!("Welcome back, {}", label(&ProfileLookup::Found(profile), &account));
                }
                Ok(LoopAction::Continue)
            }
            "whoami" => {
                match self.client.account() {
                    Some(account) => {
                        println!("{}", account);
                        println!(
                            "{}",
                            address::encode_ss58(&account, self.client.config().ss58_prefix)
                        );
                    }
                    None => println!("Not connected. Use 'connect <address>'."),
                }
                Ok(LoopAction::Continue)
            }
            "post" => {
                if args.is_empty() {
                    println!("Usage: post \"message\" [--image <ref>]");
                    return Ok(LoopAction::Continue);
                }
                let id = self
                    .client
                    .create_post(&args.join(" "), image.as_deref())
                    .await?;
                println!("Posted #{id} (+50 vibes)");
                Ok(LoopAction::Continue)
            }
            "comment" | "reply" => {
                let (parent, args) = take_flag(&args, "--parent");
                if args.len() < 2 {
                    println!("Usage: comment <post_id> \"message\" [--parent <comment_id>] [--image <ref>]");
                    return Ok(LoopAction::Continue);
                }
                let post_id = parse_id(&args[0])?;
                let parent_id = parent.as_deref().map(parse_id).transpose()?;
                let id = self
                    .client
                    .create_comment(post_id, parent_id, &args[1..].join(" "), image.as_deref())
                    .await?;
                println!("Commented #{id} (+25 vibes)");
                Ok(LoopAction::Continue)
            }
            "upvote" | "upvote-comment" => {
                let Some(raw) = args.first() else {
                    println!("Usage: {command} <id>");
                    return Ok(LoopAction::Continue);
                };
                let id = parse_id(raw)?;
                let result = if command == "upvote" {
                    self.client.toggle_post_upvote(id).await?
                } else {
                    self.client.toggle_comment_upvote(id).await?
                };
                let state = if result.is_upvoted { "upvoted" } else { "removed upvote" };
                println!("#{id} {state} ({} total)", result.upvotes);
                Ok(LoopAction::Continue)
            }
            "feed" => {
                let feed = self.client.load_feed().await?;
                self.print_feed(&feed);
                Ok(LoopAction::Continue)
            }
            "profile" => {
                let account = self.target_account(&args)?;
                self.print_profile(&account).await?;
                Ok(LoopAction::Continue)
            }
            "set-profile" => {
                if args.is_empty() {
                    println!("Usage: set-profile username=NAME handle=HANDLE bio=TEXT avatar=REF");
                    return Ok(LoopAction::Continue);
                }
                let update = parse_profile_update(&args)?;
                self.client.update_profile(&update).await?;
                println!("Profile update sent; it will refresh shortly.");
                Ok(LoopAction::Continue)
            }
            "posts" => {
                let account = self.target_account(&args)?;
                let posts = self.client.user_posts(&account).await?;
                if posts.is_empty() {
                    println!("No posts yet.");
                }
                for post in posts {
                    println!(
                        "  [{}] {} (upvotes: {}, comments: {})",
                        post.id, post.text, post.upvotes, post.comment_count
                    );
                }
                Ok(LoopAction::Continue)
            }
            "vibes" => {
                let account = self.target_account(&args)?;
                let summary = self.client.vibes_summary(&account).await?;
                println!("Contract balance: {}", summary.contract_balance);
                println!("Earned on this device: {}", summary.local_total);
                println!(
                    "  posts {} / comments {} / upvoted posts {} / upvoted comments {}",
                    summary.posts, summary.comments, summary.post_upvotes, summary.comment_upvotes
                );
                Ok(LoopAction::Continue)
            }
            "accounts" => {
                let accounts = self.client.ledger().known_accounts()?;
                if accounts.is_empty() {
                    println!("No accounts have earned vibes on this device.");
                }
                for account in accounts {
                    println!("  {account}");
                }
                Ok(LoopAction::Continue)
            }
            "upload" => {
                let Some(path) = args.first() else {
                    println!("Usage: upload <path>");
                    return Ok(LoopAction::Continue);
                };
                let reference = self.client.upload_media(Path::new(path)).await?;
                println!("{reference}");
                println!("{}", self.client.media().gateway_url(&reference));
                Ok(LoopAction::Continue)
            }
            "normalize" => {
                let Some(raw) = args.first() else {
                    println!("Usage: normalize <address>");
                    return Ok(LoopAction::Continue);
                };
                println!("{}", address::canonicalize(raw)?);
                Ok(LoopAction::Continue)
            }
            "quit" | "exit" => Ok(LoopAction::Exit),
            "clear" => {
                print!("\x1B[2J\x1B[1;1H");
                Ok(LoopAction::Continue)
            }
            other => {
                println!("Unknown command '{other}'. Type 'help' for a list of commands.");
                Ok(LoopAction::Continue)
            }
        }
    }

    fn print_help(&self) {
        println!("Available commands:");
        println!("  help                      Show this help message");
        println!("  connect <address>         Select the signing account (hex or SS58)");
        println!("  whoami                    Print the connected account");
        println!("  post MSG [--image REF]    Create a post");
        println!("  comment <post_id> MSG [--parent ID] [--image REF]");
        println!("                            Comment on a post or reply to a comment");
        println!("  upvote <post_id>          Toggle your upvote on a post");
        println!("  upvote-comment <id>       Toggle your upvote on a comment");
        println!("  feed                      Show posts with threaded comments");
        println!("  profile [address]         Show a profile");
        println!("  posts [address]           List posts by an account");
        println!("  set-profile key=value...  Update username, handle, bio, avatar");
        println!("  vibes [address]           Show vibes earned");
        println!("  accounts                  List accounts with local vibes records");
        println!("  upload <path>             Pin a file and print its reference");
        println!("  normalize <address>       Print the canonical hex form");
        println!("  clear                     Clear the screen");
        println!("  exit                      Quit the shell");
    }

    /// The account named in `args`, else the connected one.
    fn target_account(&self, args: &[String]) -> Result<ActorId> {
        match args.first() {
            Some(raw) => Ok(address::parse_account(raw)?),
            None => self
                .client
                .account()
                .ok_or_else(|| anyhow!("connect a wallet or pass an address")),
        }
    }

    fn print_feed(&self, feed: &Feed) {
        if feed.posts.is_empty() {
            println!("No posts yet. Use 'post' to create one.");
            return;
        }
        for entry in &feed.posts {
            let post = &entry.post;
            println!();
            println!(
                "[{}] {} (upvotes: {}, comments: {})",
                post.id,
                label(&entry.author, &post.author),
                post.upvotes,
                post.comment_count
            );
            println!("  {}", post.text);
            if let Some(image) = &post.image_uri {
                println!("  image: {}", self.client.media().gateway_url(image));
            }
            for comment in &entry.comments {
                let indent = "  ".repeat(comment.thread.depth + 2);
                let view = &comment.thread.comment;
                println!(
                    "{indent}#{} {}: {} (upvotes: {})",
                    view.id,
                    label(&comment.author, &view.author),
                    view.text,
                    view.upvotes
                );
            }
        }
    }

    async fn print_profile(&self, account: &ActorId) -> Result<()> {
        let lookup = self.client.profiles().refresh(&account.to_hex()).await;
        println!("{}", label(&lookup, account));
        println!("  {}", address::encode_ss58(account, self.client.config().ss58_prefix));
        match lookup.profile() {
            Some(profile) => {
                if let Some(bio) = &profile.description {
                    println!("  {bio}");
                }
                if let Some(avatar) = &profile.avatar_uri {
                    println!("  avatar: {}", self.client.media().gateway_url(avatar));
                }
                println!(
                    "  posts: {}, vibes: {}",
                    profile.total_posts, profile.total_vibes_earned
                );
            }
            None => println!("  (no profile yet)"),
        }
        Ok(())
    }
}

/// `name @handle`, falling back to the shortened address.
fn label(lookup: &ProfileLookup, wallet: &ActorId) -> String {
    let hex = wallet.to_hex();
    match lookup.profile() {
        Some(profile) => {
            let name = profile
                .username
                .clone()
                .unwrap_or_else(|| format_address(&hex));
            format!("{name} {}", display_handle(profile.social_handle.as_deref(), &hex))
        }
        None => format!("{} {}", format_address(&hex), display_handle(None, &hex)),
    }
}

fn parse_id(raw: &str) -> Result<u64> {
    raw.trim_start_matches('#')
        .parse()
        .map_err(|_| anyhow!("'{raw}' is not a valid id"))
}

/// Removes `flag <value>` from `tokens`, returning the value and the rest.
fn take_flag(tokens: &[String], flag: &str) -> (Option<String>, Vec<String>) {
    let mut value = None;
    let mut rest = Vec::with_capacity(tokens.len());
    let mut iter = tokens.iter();
    while let Some(token) = iter.next() {
        if token == flag && value.is_none() {
            value = iter.next().cloned();
        } else {
            rest.push(token.clone());
        }
    }
    (value, rest)
}

fn parse_profile_update(args: &[String]) -> Result<ProfileUpdate> {
    let mut update = ProfileUpdate::default();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| anyhow!("expected key=value, got '{arg}'"))?;
        let value = Some(value.to_string());
        match key {
            "username" | "name" => update.username = value,
            "handle" | "social" => update.social_handle = value,
            "bio" | "description" => update.description = value,
            "avatar" => update.avatar_uri = value,
            other => return Err(anyhow!("unknown profile field '{other}'")),
        }
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(raw: &str) -> Vec<String> {
        shell_words::split(raw).unwrap()
    }

    #[test]
    fn flags_are_pulled_out_of_the_message() {
        let (image, rest) = take_flag(&words("hello --image ipfs://QmX world"), "--image");
        assert_eq!(image.as_deref(), Some("ipfs://QmX"));
        assert_eq!(rest, words("hello world"));
    }

    #[test]
    fn profile_update_from_pairs() {
        let update = parse_profile_update(&words("username=alice 'bio=hi there'")).unwrap();
        assert_eq!(update.username.as_deref(), Some("alice"));
        assert_eq!(update.description.as_deref(), Some("hi there"));
        assert!(parse_profile_update(&words("colour=blue")).is_err());
    }
}
