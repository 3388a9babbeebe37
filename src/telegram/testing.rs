//! In-memory gateway for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use async_trait::async_trait;

use super::{DialogInfo, EntityInfo, GatewayError, MessagingGateway, StoredMessage};
use crate::config::PeerTarget;

/// Records every outbound call and serves canned dialogs, users and
/// saved messages.
#[derive(Debug, Default)]
pub struct FakeGateway {
    dialogs: Mutex<Vec<DialogInfo>>,
    users: Mutex<HashMap<i64, EntityInfo>>,
    saved: Mutex<Vec<StoredMessage>>,
    sent: Mutex<Vec<(PeerTarget, String)>>,
    forwarded: Mutex<Vec<(PeerTarget, Vec<i32>)>>,
    deleted: Mutex<Vec<(PeerTarget, Vec<i32>)>>,
    next_id: AtomicI32,
    pub fail_list_dialogs: AtomicBool,
    pub fail_get_entity: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_forward: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Forwards succeed but report no copy ids.
    pub forward_without_copies: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(1000),
            ..Self::default()
        }
    }

    pub fn add_group(&self, id: i64, title: &str, username: Option<&str>, folder_id: Option<i32>) {
        self.dialogs.lock().unwrap().push(DialogInfo {
            id,
            title: title.to_owned(),
            username: username.map(str::to_owned),
            is_group: true,
            is_channel: false,
            folder_id,
        });
    }

    pub fn add_private_chat(&self, id: i64, title: &str, folder_id: Option<i32>) {
        self.dialogs.lock().unwrap().push(DialogInfo {
            id,
            title: title.to_owned(),
            username: None,
            is_group: false,
            is_channel: false,
            folder_id,
        });
    }

    pub fn remove_dialog(&self, id: i64) {
        self.dialogs.lock().unwrap().retain(|d| d.id != id);
    }

    pub fn add_user(&self, id: i64, username: Option<&str>, first: Option<&str>, last: Option<&str>) {
        self.users.lock().unwrap().insert(
            id,
            EntityInfo {
                id,
                username: username.map(str::to_owned),
                first_name: first.map(str::to_owned),
                last_name: last.map(str::to_owned),
                title: None,
            },
        );
    }

    /// Saves a message; the most recently saved one is returned first.
    pub fn save_message(&self, id: i32, text: &str) {
        self.saved.lock().unwrap().insert(
            0,
            StoredMessage {
                id,
                text: text.to_owned(),
                sender_id: None,
            },
        );
    }

    pub fn sent(&self) -> Vec<(PeerTarget, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn forwarded(&self) -> Vec<(PeerTarget, Vec<i32>)> {
        self.forwarded.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(PeerTarget, Vec<i32>)> {
        self.deleted.lock().unwrap().clone()
    }

    fn failing(flag: &AtomicBool, op: &str) -> Result<(), GatewayError> {
        if flag.load(Ordering::SeqCst) {
            Err(GatewayError::Invocation(format!("{op} failed")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MessagingGateway for FakeGateway {
    async fn list_dialogs(&self) -> Result<Vec<DialogInfo>, GatewayError> {
        Self::failing(&self.fail_list_dialogs, "list_dialogs")?;
        Ok(self.dialogs.lock().unwrap().clone())
    }

    async fn get_entity(&self, peer: &PeerTarget) -> Result<EntityInfo, GatewayError> {
        Self::failing(&self.fail_get_entity, "get_entity")?;
        let users = self.users.lock().unwrap();
        let found = users.values().find(|u| match peer {
            PeerTarget::ById(id) => u.id == *id,
            PeerTarget::ByUsername(name) => u.username.as_deref() == Some(name.as_str()),
            _ => false,
        });
        if let Some(user) = found {
            return Ok(user.clone());
        }

        self.dialogs
            .lock()
            .unwrap()
            .iter()
            .find(|d| peer.matches(d.id, d.username.as_deref(), &d.title))
            .map(|d| EntityInfo {
                id: d.id,
                username: d.username.clone(),
                title: Some(d.title.clone()),
                ..EntityInfo::default()
            })
            .ok_or_else(|| GatewayError::NotFound(peer.to_string()))
    }

    async fn get_messages(
        &self,
        peer: &PeerTarget,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, GatewayError> {
        if *peer != PeerTarget::SavedMessages {
            return Ok(Vec::new());
        }
        Ok(self.saved.lock().unwrap().iter().take(limit).cloned().collect())
    }

    async fn send_message(&self, peer: &PeerTarget, text: &str) -> Result<(), GatewayError> {
        Self::failing(&self.fail_send, "send_message")?;
        self.sent.lock().unwrap().push((peer.clone(), text.to_owned()));
        Ok(())
    }

    async fn forward_messages(
        &self,
        destination: &PeerTarget,
        message_ids: &[i32],
        _source: &PeerTarget,
    ) -> Result<Vec<i32>, GatewayError> {
        Self::failing(&self.fail_forward, "forward_messages")?;
        self.forwarded
            .lock()
            .unwrap()
            .push((destination.clone(), message_ids.to_vec()));
        if self.forward_without_copies.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(message_ids
            .iter()
            .map(|_| self.next_id.fetch_add(1, Ordering::SeqCst))
            .collect())
    }

    async fn delete_messages(
        &self,
        peer: &PeerTarget,
        message_ids: &[i32],
    ) -> Result<(), GatewayError> {
        Self::failing(&self.fail_delete, "delete_messages")?;
        self.deleted
            .lock()
            .unwrap()
            .push((peer.clone(), message_ids.to_vec()));
        Ok(())
    }
}
