use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use base64::Engine;
use sha2::{Digest, Sha256};

use parley_client::api::{HttpMessagingApi, MessagingApi};
use parley_client::auth::AuthService;
use parley_client::config::ClientConfig;
use parley_client::context::SessionContext;
use parley_client::error::ClientError;
use parley_client::session::{MessageSession, Timeline};
use parley_client::sync::{parse_timestamp, DisplayMessage};
use parley_crypto::storage::{KvStore, SqliteStore};
use parley_shared::ids::Username;
use tokio::sync::watch;

use crate::Command;

struct App<'a> {
    config: &'a ClientConfig,
    store: Arc<dyn KvStore>,
    api: Arc<dyn MessagingApi>,
}

impl<'a> App<'a> {
    fn new(config: &'a ClientConfig) -> Result<Self, ClientError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            ClientError::Storage(format!(
                "failed to create {}: {e}",
                config.data_dir.display()
            ))
        })?;
        let store: Arc<dyn KvStore> = Arc::new(SqliteStore::open(&config.db_path())?);
        tracing::debug!(
            db = %config.db_path().display(),
            api = %config.api_base_url,
            encryption = %config.encryption,
            "client initialised"
        );
        let api: Arc<dyn MessagingApi> = Arc::new(
            HttpMessagingApi::new(config.api_base_url.clone(), config.request_timeout())
                .map_err(|e| ClientError::Config(e.to_string()))?,
        );
        Ok(Self { config, store, api })
    }

    fn auth(&self) -> AuthService {
        AuthService::new(
            self.api.clone(),
            self.store.clone(),
            self.config.clear_keys_on_logout,
        )
    }

    fn context(&self) -> Result<SessionContext, ClientError> {
        SessionContext::resume(self.store.clone())?
            .ok_or_else(|| ClientError::Auth("not logged in; run `parley login` first".into()))
    }

    fn session(&self) -> Result<MessageSession, ClientError> {
        Ok(MessageSession::new(
            Arc::new(self.context()?),
            self.api.clone(),
            self.config.encryption,
            self.config.self_echo_window(),
        ))
    }
}

pub async fn run(command: Command, config: &ClientConfig) -> Result<(), ClientError> {
    let app = App::new(config)?;

    match command {
        Command::Register {
            username,
            password,
            confirm_password,
        } => {
            let ctx = app
                .auth()
                .register(&username, &password, &confirm_password)
                .await?;
            println!("Registered and logged in as {}", ctx.username());
        }
        Command::Login { username, password } => {
            let ctx = app.auth().login(&username, &password).await?;
            if ctx.private_key().is_none() {
                println!(
                    "Logged in as {}. This device has no key for the account; \
                     incoming encrypted messages cannot be read here.",
                    ctx.username()
                );
            } else {
                println!("Logged in as {}", ctx.username());
            }
        }
        Command::Logout => match SessionContext::resume(app.store.clone())? {
            Some(ctx) => {
                let name = ctx.username().clone();
                app.auth().logout(ctx)?;
                println!("Logged out {name}");
            }
            None => println!("Not logged in"),
        },
        Command::Whoami => {
            let ctx = app.context()?;
            match ctx.key_store().public_key()? {
                Some(public_key) => println!(
                    "{} (key fingerprint {})",
                    ctx.username(),
                    fingerprint(&public_key)
                ),
                None => println!("{} (no key on this device)", ctx.username()),
            }
        }
        Command::Partners => {
            let partners = app.session()?.partners().await?;
            if partners.is_empty() {
                println!("No conversations yet");
            }
            for partner in partners {
                println!("{partner}");
            }
        }
        Command::Send { peer, message } => {
            let peer = Username::parse(peer)?;
            let text = message.join(" ");
            match app.session()?.send(&peer, &text).await.into_result()? {
                Some(_) => println!("Sent to {peer}"),
                None => println!("Nothing to send"),
            }
        }
        Command::Open { peer } => {
            let peer = Username::parse(peer)?;
            let timeline = app.session()?.open(&peer).await?;
            if timeline.is_empty() {
                println!("No messages with {peer}");
            }
            for message in &timeline {
                print_message(message);
            }
        }
        Command::Watch { peer } => watch(&app, Username::parse(peer)?).await?,
    }
    Ok(())
}

async fn watch(app: &App<'_>, peer: Username) -> Result<(), ClientError> {
    let session = app.session()?;
    let mut shown = HashSet::new();
    for message in session.open(&peer).await? {
        shown.insert(message.id.clone());
        print_message(&message);
    }

    let mut updates = session.subscribe();
    let poll = session.start_polling(app.config.poll_interval());
    eprintln!("Watching conversation with {peer}; press Ctrl-C to stop");

    follow(&mut updates, tokio::signal::ctrl_c(), &mut shown, print_message).await;

    poll.stop();
    session.close();
    Ok(())
}

/// Emit every message not yet in `shown` as timeline updates arrive, until
/// `shutdown` resolves or the session goes away.
async fn follow<F: Future>(
    updates: &mut watch::Receiver<Timeline>,
    shutdown: F,
    shown: &mut HashSet<String>,
    mut emit: impl FnMut(&DisplayMessage),
) {
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let timeline = updates.borrow_and_update().clone();
                for message in &timeline.messages {
                    if shown.insert(message.id.clone()) {
                        emit(message);
                    }
                }
            }
        }
    }
}

fn print_message(message: &DisplayMessage) {
    let when = parse_timestamp(&message.timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| message.timestamp.clone());
    let who = if message.is_mine { "you" } else { message.sender.as_str() };
    let marker = if message.decrypted { "" } else { " (unreadable)" };
    println!("[{when}] {who}: {}{marker}", message.content);
}

/// SHA-256 over the DER public key, as groups of four hex digits.
fn fingerprint(public_key: &str) -> String {
    let der = base64::engine::general_purpose::STANDARD
        .decode(public_key)
        .unwrap_or_else(|_| public_key.as_bytes().to_vec());
    let hex = format!("{:x}", Sha256::digest(&der));
    hex.as_bytes()
        .chunks(4)
        .take(8)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
