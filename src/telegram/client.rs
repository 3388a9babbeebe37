//! Telegram client wrapper implementing the messaging gateway.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grammers_client::client::{LoginToken, PasswordToken, UpdatesConfiguration};
use grammers_client::types::{Dialog, Peer, PeerRef};
use grammers_client::update::Update;
use grammers_client::{Client, InvocationError, SenderPool, SignInError, sender};
use grammers_session::storages::SqliteSession;
use grammers_session::updates::UpdatesLike;
use grammers_tl_types as tl;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{
    DialogInfo, EntityInfo, GatewayError, InboundMessage, MessagingGateway, RateLimiter,
    StoredMessage,
};
use crate::config::{PeerTarget, TelegramConfig};

/// Re-export types for external use.
pub use grammers_client::client::{LoginToken as Token, PasswordToken as PwdToken};

/// Raw update feed handed out by the sender pool.
pub type RawUpdatesReceiver = mpsc::UnboundedReceiver<UpdatesLike>;

/// Capacity of the inbound message channel.
const INBOUND_BUFFER: usize = 256;

/// First and longest pause before reading the update stream again after a failure.
const UPDATE_RETRY_BASE: Duration = Duration::from_secs(1);
const UPDATE_RETRY_MAX: Duration = Duration::from_secs(60);

/// Errors that can occur while connecting or signing in.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Not authorized. Please sign in first.")]
    NotAuthorized,

    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Password required for 2FA")]
    PasswordRequired(PasswordToken),

    #[error("Invalid password")]
    InvalidPassword(PasswordToken),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Update stream already taken")]
    UpdatesTaken,
}

impl From<InvocationError> for GatewayError {
    fn from(err: InvocationError) -> Self {
        let err_str = err.to_string();

        // Check for flood wait errors
        if (err_str.contains("FLOOD_WAIT") || err_str.contains("flood"))
            && let Some(seconds) = extract_flood_wait_seconds(&err_str)
        {
            return Self::FloodWait(seconds);
        }

        if err_str.contains("AUTH_KEY_UNREGISTERED") || err_str.contains("SESSION_REVOKED") {
            return Self::NotAuthorized;
        }

        Self::Invocation(err_str)
    }
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["FLOOD_WAIT_", "flood wait ", "FLOOD_WAIT (value: "];
    let lowered = err_msg.to_lowercase();

    for pattern in patterns {
        if let Some(idx) = lowered.find(&pattern.to_lowercase()) {
            let start = idx + pattern.len();
            let num_str: String = lowered[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// Peers seen in dialogs and updates, keyed by bot-API style id.
type PeerCache = Arc<RwLock<HashMap<i64, Peer>>>;

/// High-level Telegram client wrapper.
pub struct TelegramBot {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Raw updates until [`Self::start_updates`] takes them.
    updates: std::sync::Mutex<Option<RawUpdatesReceiver>>,

    /// Paces sends, forwards and deletions.
    rate_limiter: RateLimiter,

    peers: PeerCache,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl TelegramBot {
    /// Connects to Telegram with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if connection fails.
    pub async fn connect(
        config: &TelegramConfig,
        min_send_interval: Duration,
    ) -> Result<Self, TelegramError> {
        info!("Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(&config.session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), config.api_id);

        let client = Client::new(handle.clone());

        // Spawn the sender pool runner
        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;

        info!("Connected to Telegram. Authorized: {}", is_authorized);

        Ok(Self {
            client,
            handle: handle.thin,
            updates: std::sync::Mutex::new(Some(updates)),
            rate_limiter: RateLimiter::new(min_send_interval),
            peers: Arc::new(RwLock::new(HashMap::new())),
            _pool_task: pool_task,
        })
    }

    /// Checks if the client is authorized.
    ///
    /// # Errors
    ///
    /// Returns an error if the check fails.
    pub async fn is_authorized(&self) -> Result<bool, TelegramError> {
        self.client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))
    }

    /// Requests a login code to be sent to the phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn request_login_code(
        &self,
        phone: &str,
        api_hash: &str,
    ) -> Result<LoginToken, TelegramError> {
        info!("Requesting login code for phone: {}...", mask_phone(phone));

        self.client
            .request_login_code(phone, api_hash)
            .await
            .map_err(|e| TelegramError::SignInFailed(e.to_string()))
    }

    /// Signs in with the login code.
    ///
    /// # Errors
    ///
    /// Returns an error if sign in fails.
    pub async fn sign_in(&self, token: &LoginToken, code: &str) -> Result<(), TelegramError> {
        info!("Signing in with login code...");

        match self.client.sign_in(token, code).await {
            Ok(_user) => {
                info!("Successfully signed in!");
                Ok(())
            }
            Err(SignInError::PasswordRequired(password_token)) => {
                debug!("2FA password required, hint: {:?}", password_token.hint());
                Err(TelegramError::PasswordRequired(password_token))
            }
            Err(SignInError::InvalidCode) => {
                Err(TelegramError::SignInFailed("Invalid code".to_owned()))
            }
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Checks the 2FA password.
    ///
    /// # Errors
    ///
    /// Returns an error if the password is invalid.
    pub async fn check_password(
        &self,
        password_token: PasswordToken,
        password: &str,
    ) -> Result<(), TelegramError> {
        info!("Checking 2FA password...");

        match self.client.check_password(password_token, password).await {
            Ok(_user) => {
                info!("Successfully authenticated with 2FA!");
                Ok(())
            }
            Err(SignInError::InvalidPassword(token)) => Err(TelegramError::InvalidPassword(token)),
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Starts pumping incoming messages into a channel.
    ///
    /// Only messages sent by others are delivered. Stream failures are
    /// retried with a growing pause; the pump ends once the receiver is
    /// dropped. Can be called once.
    ///
    /// # Errors
    ///
    /// Returns an error if the update stream was already taken.
    pub fn start_updates(&self) -> Result<mpsc::Receiver<InboundMessage>, TelegramError> {
        let updates = self
            .updates
            .lock()
            .map_err(|_| TelegramError::UpdatesTaken)?
            .take()
            .ok_or(TelegramError::UpdatesTaken)?;

        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let client = self.client.clone();
        let peers = Arc::clone(&self.peers);

        tokio::spawn(async move {
            let mut stream = client
                .stream_updates(
                    updates,
                    UpdatesConfiguration {
                        catch_up: false,
                        ..Default::default()
                    },
                )
                .await;

            let mut failures: u32 = 0;
            loop {
                let update = match stream.next().await {
                    Ok(update) => {
                        failures = 0;
                        update
                    }
                    Err(e) => {
                        if tx.is_closed() {
                            break;
                        }
                        failures = failures.saturating_add(1);
                        let delay = retry_delay(failures);
                        error!(
                            "Update stream failed ({} in a row), retrying in {:?}: {}",
                            failures, delay, e
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                };

                let Update::NewMessage(message) = update else {
                    continue;
                };

                let chat = message.peer().cloned();
                let sender = message.sender().cloned();
                let Some(inbound) = accept_inbound(
                    message.outgoing(),
                    InboundMessage {
                        id: message.id(),
                        chat_id: message.peer_id().bot_api_dialog_id(),
                        sender_id: message.sender_id().map(|id| id.bot_api_dialog_id()),
                        text: Some(message.text().to_owned()),
                        chat: chat.as_ref().map(entity_of),
                        sender: sender.as_ref().map(entity_of),
                    },
                ) else {
                    continue;
                };

                {
                    let mut cache = peers.write().await;
                    for peer in chat.iter().chain(sender.iter()) {
                        cache.insert(peer_id(peer), peer.clone());
                    }
                }

                if tx.send(inbound).await.is_err() {
                    debug!("Inbound channel closed, stopping update pump");
                    break;
                }
            }

            stream.sync_update_state().await;
        });

        Ok(rx)
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }

    /// Maps a target to something the client can address.
    async fn peer_ref(&self, target: &PeerTarget) -> Result<PeerRef, GatewayError> {
        let peer = match target {
            PeerTarget::SavedMessages => Peer::User(self.client.get_me().await?),
            PeerTarget::ById(id) => self.cached_or_dialog(|p| peer_id(p) == *id).await?,
            PeerTarget::ByTitle(_) => {
                self.cached_or_dialog(|p| {
                    target.matches(peer_id(p), p.username(), p.name().unwrap_or_default())
                })
                .await?
            }
            PeerTarget::ByUsername(name) => match self.client.resolve_username(name).await? {
                Some(peer) => peer,
                None => return Err(GatewayError::NotFound(target.to_string())),
            },
        };

        self.peers.write().await.insert(peer_id(&peer), peer.clone());
        to_ref(&peer)
            .await
            .ok_or_else(|| GatewayError::NotFound(target.to_string()))
    }

    /// Looks in the peer cache first, then refreshes it from the dialogs.
    async fn cached_or_dialog(&self, wanted: impl Fn(&Peer) -> bool) -> Result<Peer, GatewayError> {
        if let Some(peer) = self.peers.read().await.values().find(|p| wanted(p)) {
            return Ok(peer.clone());
        }

        self.load_dialogs()
            .await?
            .into_iter()
            .map(|d| d.peer().clone())
            .find(|p| wanted(p))
            .ok_or_else(|| GatewayError::NotFound("peer not in dialogs".to_owned()))
    }

    /// Fetches every dialog and caches their peers.
    async fn load_dialogs(&self) -> Result<Vec<Dialog>, GatewayError> {
        let mut dialogs = Vec::new();
        let mut iter = self.client.iter_dialogs();
        while let Some(dialog) = iter.next().await? {
            dialogs.push(dialog);
        }

        let mut cache = self.peers.write().await;
        for dialog in &dialogs {
            cache.insert(peer_id(dialog.peer()), dialog.peer().clone());
        }
        debug!("Loaded {} dialogs", dialogs.len());

        Ok(dialogs)
    }

    /// Paces an outbound call and records any flood wait it triggers.
    async fn paced<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, InvocationError>>,
    {
        self.rate_limiter.wait_and_acquire().await;
        match call.await {
            Ok(value) => Ok(value),
            Err(e) => {
                let err = GatewayError::from(e);
                if let GatewayError::FloodWait(seconds) = &err {
                    self.rate_limiter.handle_flood_wait(*seconds).await;
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl MessagingGateway for TelegramBot {
    async fn list_dialogs(&self) -> Result<Vec<DialogInfo>, GatewayError> {
        Ok(self.load_dialogs().await?.iter().map(dialog_info).collect())
    }

    async fn get_entity(&self, peer: &PeerTarget) -> Result<EntityInfo, GatewayError> {
        let found = match peer {
            PeerTarget::SavedMessages => Peer::User(self.client.get_me().await?),
            PeerTarget::ByUsername(name) => self
                .client
                .resolve_username(name)
                .await?
                .ok_or_else(|| GatewayError::NotFound(peer.to_string()))?,
            PeerTarget::ById(id) => self
                .peers
                .read()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| GatewayError::NotFound(peer.to_string()))?,
            PeerTarget::ByTitle(_) => {
                self.cached_or_dialog(|p| {
                    peer.matches(peer_id(p), p.username(), p.name().unwrap_or_default())
                })
                .await?
            }
        };
        Ok(entity_of(&found))
    }

    async fn get_messages(
        &self,
        peer: &PeerTarget,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, GatewayError> {
        let peer = self.peer_ref(peer).await?;
        let mut iter = self.client.iter_messages(peer).limit(limit);

        let mut messages = Vec::with_capacity(limit);
        while let Some(message) = iter.next().await? {
            messages.push(StoredMessage {
                id: message.id(),
                text: message.text().to_owned(),
                sender_id: message.sender_id().map(|id| id.bot_api_dialog_id()),
            });
        }
        Ok(messages)
    }

    async fn send_message(&self, peer: &PeerTarget, text: &str) -> Result<(), GatewayError> {
        let peer = self.peer_ref(peer).await?;
        self.paced(self.client.send_message(peer, text)).await?;
        Ok(())
    }

    async fn forward_messages(
        &self,
        destination: &PeerTarget,
        message_ids: &[i32],
        source: &PeerTarget,
    ) -> Result<Vec<i32>, GatewayError> {
        let destination = self.peer_ref(destination).await?;
        let source = self.peer_ref(source).await?;

        let forwarded = self
            .paced(self.client.forward_messages(destination, message_ids, source))
            .await?;
        Ok(forwarded.iter().flatten().map(|m| m.id()).collect())
    }

    async fn delete_messages(
        &self,
        peer: &PeerTarget,
        message_ids: &[i32],
    ) -> Result<(), GatewayError> {
        let peer = self.peer_ref(peer).await?;
        let deleted = self
            .paced(self.client.delete_messages(peer, message_ids))
            .await?;
        if deleted < message_ids.len() {
            warn!("Deleted {} of {} messages", deleted, message_ids.len());
        }
        Ok(())
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// Keeps messages sent by others. Empty text becomes `None`.
fn accept_inbound(outgoing: bool, mut inbound: InboundMessage) -> Option<InboundMessage> {
    if outgoing {
        return None;
    }
    inbound.text = inbound.text.filter(|text| !text.is_empty());
    Some(inbound)
}

/// Pause after `failures` consecutive update stream errors.
fn retry_delay(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(6);
    UPDATE_RETRY_BASE
        .saturating_mul(1 << exponent)
        .min(UPDATE_RETRY_MAX)
}

fn peer_id(peer: &Peer) -> i64 {
    peer.id().bot_api_dialog_id()
}

async fn to_ref(peer: &Peer) -> Option<PeerRef> {
    peer.to_ref().await
}

fn entity_of(peer: &Peer) -> EntityInfo {
    let mut entity = EntityInfo {
        id: peer_id(peer),
        username: peer.username().map(str::to_owned),
        ..EntityInfo::default()
    };

    match peer {
        Peer::User(user) => {
            entity.first_name = user.first_name().map(str::to_owned);
            entity.last_name = user.last_name().map(str::to_owned);
        }
        Peer::Group(_) | Peer::Channel(_) => {
            entity.title = peer.name().map(str::to_owned);
        }
    }
    entity
}

fn dialog_info(dialog: &Dialog) -> DialogInfo {
    let peer = dialog.peer();
    let folder_id = match &dialog.raw {
        tl::enums::Dialog::Dialog(raw) => raw.folder_id,
        tl::enums::Dialog::Folder(_) => None,
    };

    DialogInfo {
        id: peer_id(peer),
        title: peer.name().unwrap_or_default().to_owned(),
        username: peer.username().map(str::to_owned),
        is_group: matches!(peer, Peer::Group(_)),
        is_channel: matches!(peer, Peer::Channel(_)),
        folder_id,
    }
}

/// Masks a phone number for logging (shows last 4 digits).
fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > 4 {
        format!("***{}", &digits[digits.len() - 4..])
    } else {
        "****".to_owned()
    }
}
