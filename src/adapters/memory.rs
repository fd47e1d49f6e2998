//! In-memory platform.
//!
//! Keeps dialogs and histories in process memory and records every outbound
//! action so tests can assert on what the scanner did. Individual operations
//! can be made to fail to exercise error paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    Account, ChatMessage, Dialog, DialogKind, FileMeta, Peer, Platform, PlatformError,
    PlatformResult,
};

/// Chat id used for saved messages inside the in-memory store
pub const SAVED_MESSAGES_ID: i64 = 0;

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Dialogs,
    Messages,
    Send,
    Edit,
    Forward,
    Delete,
    CreateChannel,
}

/// Outbound action recorded by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Sent { peer: Peer, text: String },
    Edited { peer: Peer, message_id: i64, text: String },
    Forwarded { to: Peer, from: Peer, message_id: i64 },
    Deleted { peer: Peer, message_id: i64 },
}

type ActionHook = Box<dyn Fn(&Action) + Send + Sync>;

/// In-memory platform
pub struct MemoryPlatform {
    account: Account,
    dialogs: Mutex<Vec<Dialog>>,
    /// Chat histories, oldest first
    histories: Mutex<HashMap<i64, Vec<ChatMessage>>>,
    actions: Mutex<Vec<Action>>,
    failing: Mutex<HashSet<Op>>,
    hook: Mutex<Option<ActionHook>>,
    next_id: AtomicI64,
    connected: AtomicBool,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self {
            account: Account {
                id: 1,
                username: Some("operator".to_string()),
            },
            dialogs: Mutex::new(Vec::new()),
            histories: Mutex::new(HashMap::new()),
            actions: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            hook: Mutex::new(None),
            next_id: AtomicI64::new(1),
            connected: AtomicBool::new(true),
        }
    }

    fn chat_key(peer: Peer) -> i64 {
        match peer {
            Peer::SavedMessages => SAVED_MESSAGES_ID,
            Peer::Chat(id) => id,
        }
    }

    fn alloc_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn check(&self, op: Op) -> PlatformResult<()> {
        if self.failing.lock().unwrap_or_else(|e| e.into_inner()).contains(&op) {
            return Err(PlatformError::Api(format!("injected {:?} failure", op)));
        }
        Ok(())
    }

    fn record(&self, action: Action) {
        if let Some(hook) = self.hook.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            hook(&action);
        }
        self.actions.lock().unwrap_or_else(|e| e.into_inner()).push(action);
    }

    fn append(&self, chat_id: i64, text: Option<String>, file: Option<FileMeta>, outgoing: bool) -> i64 {
        let id = self.alloc_id();
        let message = ChatMessage {
            id,
            chat_id,
            text,
            file,
            outgoing,
            date: Utc::now(),
        };
        self.histories
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(chat_id)
            .or_default()
            .push(message);
        id
    }

    /// Register a broadcast channel
    pub fn add_channel(&self, id: i64, title: &str) {
        self.dialogs.lock().unwrap_or_else(|e| e.into_inner()).push(Dialog {
            id,
            title: title.to_string(),
            username: None,
            kind: DialogKind::Channel,
            members: None,
        });
    }

    /// Register a group
    pub fn add_group(&self, id: i64, title: &str, members: Option<u64>) {
        self.dialogs.lock().unwrap_or_else(|e| e.into_inner()).push(Dialog {
            id,
            title: title.to_string(),
            username: None,
            kind: DialogKind::Group,
            members,
        });
    }

    /// Post a text message into a chat, returning its id
    pub fn post(&self, chat_id: i64, text: &str) -> i64 {
        self.append(chat_id, Some(text.to_string()), None, false)
    }

    /// Post a file message into a chat, returning its id
    pub fn post_file(&self, chat_id: i64, file_name: &str, size: u64) -> i64 {
        self.append(
            chat_id,
            None,
            Some(FileMeta {
                file_name: Some(file_name.to_string()),
                size,
            }),
            false,
        )
    }

    /// Write into saved messages as the operator, returning the id
    pub fn post_saved(&self, text: &str) -> i64 {
        self.append(SAVED_MESSAGES_ID, Some(text.to_string()), None, true)
    }

    /// Current text of saved messages, oldest first
    pub fn saved_texts(&self) -> Vec<String> {
        self.histories
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&SAVED_MESSAGES_ID)
            .map(|h| h.iter().filter_map(|m| m.text.clone()).collect())
            .unwrap_or_default()
    }

    /// Saved message by id
    pub fn saved_message(&self, id: i64) -> Option<ChatMessage> {
        self.histories
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&SAVED_MESSAGES_ID)
            .and_then(|h| h.iter().find(|m| m.id == id).cloned())
    }

    /// All recorded actions
    pub fn actions(&self) -> Vec<Action> {
        self.actions.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Texts sent to a peer
    pub fn sent_to(&self, peer: Peer) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Sent { peer: p, text } if p == peer => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Message ids forwarded to a peer
    pub fn forwarded_to(&self, peer: Peer) -> Vec<i64> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Forwarded { to, message_id, .. } if to == peer => Some(message_id),
                _ => None,
            })
            .collect()
    }

    /// Make an operation fail until cleared
    pub fn fail(&self, op: Op) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).insert(op);
    }

    /// Stop failing an operation
    pub fn recover(&self, op: Op) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).remove(&op);
    }

    /// Run a callback on every outbound action
    pub fn on_action<F>(&self, hook: F)
    where
        F: Fn(&Action) + Send + Sync + 'static,
    {
        *self.hook.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(hook));
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl Platform for MemoryPlatform {
    fn name(&self) -> &str {
        "memory"
    }

    async fn me(&self) -> PlatformResult<Account> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PlatformError::Disconnected);
        }
        Ok(self.account.clone())
    }

    async fn dialogs(&self) -> PlatformResult<Vec<Dialog>> {
        self.check(Op::Dialogs)?;
        Ok(self.dialogs.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn messages(&self, peer: Peer, limit: usize) -> PlatformResult<Vec<ChatMessage>> {
        self.check(Op::Messages)?;
        let histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        Ok(histories
            .get(&Self::chat_key(peer))
            .map(|h| h.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn saved_messages_after(&self, after_id: i64) -> PlatformResult<Vec<ChatMessage>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PlatformError::Disconnected);
        }
        self.check(Op::Messages)?;
        let histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        Ok(histories
            .get(&SAVED_MESSAGES_ID)
            .map(|h| h.iter().filter(|m| m.id > after_id).cloned().collect())
            .unwrap_or_default())
    }

    async fn send_message(&self, peer: Peer, text: &str) -> PlatformResult<i64> {
        self.check(Op::Send)?;
        let id = self.append(Self::chat_key(peer), Some(text.to_string()), None, true);
        self.record(Action::Sent {
            peer,
            text: text.to_string(),
        });
        Ok(id)
    }

    async fn edit_message(&self, peer: Peer, message_id: i64, text: &str) -> PlatformResult<()> {
        self.check(Op::Edit)?;
        {
            let mut histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
            let message = histories
                .get_mut(&Self::chat_key(peer))
                .and_then(|h| h.iter_mut().find(|m| m.id == message_id))
                .ok_or_else(|| PlatformError::MessageNotFound {
                    chat: peer.to_string(),
                    message_id,
                })?;
            message.text = Some(text.to_string());
        }
        self.record(Action::Edited {
            peer,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn forward_message(&self, to: Peer, from: Peer, message_id: i64) -> PlatformResult<()> {
        self.check(Op::Forward)?;
        let original = {
            let histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
            histories
                .get(&Self::chat_key(from))
                .and_then(|h| h.iter().find(|m| m.id == message_id).cloned())
                .ok_or_else(|| PlatformError::MessageNotFound {
                    chat: from.to_string(),
                    message_id,
                })?
        };
        self.append(Self::chat_key(to), original.text, original.file, true);
        self.record(Action::Forwarded {
            to,
            from,
            message_id,
        });
        Ok(())
    }

    async fn delete_message(&self, peer: Peer, message_id: i64) -> PlatformResult<()> {
        self.check(Op::Delete)?;
        {
            let mut histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(history) = histories.get_mut(&Self::chat_key(peer)) {
                history.retain(|m| m.id != message_id);
            }
        }
        self.record(Action::Deleted { peer, message_id });
        Ok(())
    }

    async fn create_channel(&self, title: &str, _about: &str) -> PlatformResult<i64> {
        self.check(Op::CreateChannel)?;
        let id = -1_000_000 - self.alloc_id();
        self.add_channel(id, title);
        Ok(id)
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
