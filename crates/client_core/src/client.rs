use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{FixedOffset, Local};
use shared::domain::{ConversationId, Message, MessageId, ParticipantRole, ServiceId, UserId};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{
    backend::ConversationBackend,
    error::ChatError,
    store::MessageStore,
    view::{project_rows, Row},
};

pub const DEFAULT_PAGE_SIZE: u32 = 30;
/// Focus-regain can fire in rapid bursts when the app is backgrounded and
/// foregrounded; read syncs within this window are suppressed.
const READ_SYNC_MIN_INTERVAL: Duration = Duration::from_secs(2);

/// The viewer's identity for this session. Passed in explicitly: the same
/// conversation is viewed from the provider's app and the customer's app, so
/// nothing in the core may assume a fixed role.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub role: ParticipantRole,
    pub user_id: UserId,
}

/// How the hosting view identifies the conversation it wants: either an id
/// it already holds, or the (provider, service) pair to resolve one from.
#[derive(Debug, Clone, Default)]
pub struct ConversationTarget {
    pub existing: Option<ConversationId>,
    pub provider_id: Option<UserId>,
    pub service_id: Option<ServiceId>,
}

impl ConversationTarget {
    pub fn existing(id: ConversationId) -> Self {
        Self {
            existing: Some(id),
            ..Self::default()
        }
    }

    pub fn for_service(provider_id: UserId, service_id: ServiceId) -> Self {
        Self {
            existing: None,
            provider_id: Some(provider_id),
            service_id: Some(service_id),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ChatEvent {
    ConversationResolved {
        conversation_id: ConversationId,
    },
    HistoryLoaded {
        appended: usize,
    },
    OlderPageLoaded {
        appended: usize,
    },
    /// An optimistic entry entered the store; the input field can clear now.
    MessagePending {
        message: Message,
    },
    MessageConfirmed {
        local_id: MessageId,
        message: Message,
    },
    SendRolledBack {
        local_id: MessageId,
    },
}

/// The messaging client core for one conversation view: resolves the
/// conversation, loads and paginates history, sends optimistically with
/// rollback on failure, and keeps read receipts synced.
pub struct ConversationClient {
    backend: Arc<dyn ConversationBackend>,
    session: SessionContext,
    inner: Mutex<ClientState>,
    events: broadcast::Sender<ChatEvent>,
}

struct ClientState {
    target: ConversationTarget,
    conversation_id: Option<ConversationId>,
    store: MessageStore,
    next_cursor: Option<String>,
    page_size: u32,
    send_in_flight: bool,
    /// Bumped by `close()`. Async results snapshot it before suspending and
    /// are discarded on arrival if it moved, so a detached store is never
    /// mutated by a late page or resolution.
    generation: u64,
    last_read_sync: Option<Instant>,
}

impl ConversationClient {
    pub fn new(
        backend: Arc<dyn ConversationBackend>,
        session: SessionContext,
        target: ConversationTarget,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let conversation_id = target.existing.clone();
        Arc::new(Self {
            backend,
            session,
            inner: Mutex::new(ClientState {
                target,
                conversation_id,
                store: MessageStore::new(),
                next_cursor: None,
                page_size: DEFAULT_PAGE_SIZE,
                send_in_flight: false,
                generation: 0,
                last_read_sync: None,
            }),
            events,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub async fn conversation_id(&self) -> Option<ConversationId> {
        self.inner.lock().await.conversation_id.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.inner.lock().await.store.messages().to_vec()
    }

    pub async fn is_sending(&self) -> bool {
        self.inner.lock().await.send_in_flight
    }

    /// Whether older pages remain beyond what has been loaded.
    pub async fn has_older_pages(&self) -> bool {
        self.inner.lock().await.next_cursor.is_some()
    }

    /// Idempotently yields the conversation id. A cached or caller-supplied
    /// id is returned without a network call; otherwise the (provider,
    /// service) pair is resolved through the backend and the id cached for
    /// the rest of the session.
    pub async fn resolve_conversation(&self) -> Result<ConversationId, ChatError> {
        let (provider_id, service_id, generation) = {
            let guard = self.inner.lock().await;
            if let Some(id) = guard.conversation_id.clone() {
                return Ok(id);
            }
            let provider_id = guard
                .target
                .provider_id
                .clone()
                .ok_or(ChatError::Precondition {
                    field: "provider id",
                })?;
            let service_id = guard
                .target
                .service_id
                .clone()
                .ok_or(ChatError::Precondition { field: "service id" })?;
            (provider_id, service_id, guard.generation)
        };

        let conversation_id = self
            .backend
            .resolve_conversation(&provider_id, &service_id)
            .await
            .map_err(|source| ChatError::ConversationUnavailable { source })?;

        {
            let mut guard = self.inner.lock().await;
            if guard.generation == generation {
                guard.conversation_id = Some(conversation_id.clone());
            }
        }
        info!(
            conversation_id = %conversation_id,
            provider_id = %provider_id,
            service_id = %service_id,
            "chat: conversation resolved"
        );
        let _ = self.events.send(ChatEvent::ConversationResolved {
            conversation_id: conversation_id.clone(),
        });
        Ok(conversation_id)
    }

    /// Called by the hosting view when it opens: resolves the conversation,
    /// loads the latest history page and fires the initial read sync.
    pub async fn initialize(&self, page_size: u32) -> Result<(), ChatError> {
        let conversation_id = self.resolve_conversation().await?;
        let generation = {
            let mut guard = self.inner.lock().await;
            guard.page_size = page_size;
            guard.generation
        };

        let page = self
            .backend
            .fetch_messages(&conversation_id, page_size, None)
            .await
            .map_err(|source| ChatError::HistoryLoadFailed { source })?;

        let appended = {
            let mut guard = self.inner.lock().await;
            if guard.generation != generation {
                info!(
                    conversation_id = %conversation_id,
                    "chat: discarding history page that arrived after close"
                );
                return Ok(());
            }
            guard.next_cursor = page.next_cursor;
            let conversation_id = conversation_id.clone();
            guard.store.merge(
                page.messages
                    .into_iter()
                    .map(|record| record.into_message(conversation_id.clone())),
            )
        };
        let _ = self.events.send(ChatEvent::HistoryLoaded { appended });

        self.sync_read_receipt(conversation_id).await;
        Ok(())
    }

    /// Loads the next older page using the stored cursor. Without a cursor
    /// (or a conversation) this is a no-op. Already-merged ids are skipped,
    /// so repeating a cursor adds nothing. Returns the newly added count.
    pub async fn load_older(&self) -> Result<usize, ChatError> {
        let (conversation_id, cursor, page_size, generation) = {
            let guard = self.inner.lock().await;
            let Some(conversation_id) = guard.conversation_id.clone() else {
                return Ok(0);
            };
            let Some(cursor) = guard.next_cursor.clone() else {
                return Ok(0);
            };
            (conversation_id, cursor, guard.page_size, guard.generation)
        };

        let page = self
            .backend
            .fetch_messages(&conversation_id, page_size, Some(&cursor))
            .await
            .map_err(|source| ChatError::HistoryLoadFailed { source })?;

        let appended = {
            let mut guard = self.inner.lock().await;
            if guard.generation != generation {
                info!(
                    conversation_id = %conversation_id,
                    "chat: discarding older page that arrived after close"
                );
                return Ok(0);
            }
            guard.next_cursor = page.next_cursor;
            let conversation_id = conversation_id.clone();
            guard.store.merge(
                page.messages
                    .into_iter()
                    .map(|record| record.into_message(conversation_id.clone())),
            )
        };
        let _ = self.events.send(ChatEvent::OlderPageLoaded { appended });
        Ok(appended)
    }

    /// Called by the hosting view whenever it regains focus while showing
    /// this conversation. No-op until a conversation id exists.
    pub async fn on_focus_regained(&self) {
        let conversation_id = { self.inner.lock().await.conversation_id.clone() };
        let Some(conversation_id) = conversation_id else {
            return;
        };
        self.sync_read_receipt(conversation_id).await;
    }

    /// Fire-and-forget read receipt sync. Must never block or delay another
    /// operation; failures are logged and swallowed because read state is
    /// best-effort. Bursts within `READ_SYNC_MIN_INTERVAL` are suppressed.
    async fn sync_read_receipt(&self, conversation_id: ConversationId) {
        {
            let mut guard = self.inner.lock().await;
            if let Some(last) = guard.last_read_sync {
                if last.elapsed() < READ_SYNC_MIN_INTERVAL {
                    return;
                }
            }
            guard.last_read_sync = Some(Instant::now());
        }

        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            if let Err(err) = backend.mark_read(&conversation_id).await {
                warn!(
                    conversation_id = %conversation_id,
                    "chat: read receipt sync failed: {err}"
                );
            }
        });
    }

    /// Sends a composed message. At most one send is in flight per
    /// conversation: a concurrent call is refused outright, not queued. The
    /// optimistic entry is substituted by the server record on success and
    /// removed entirely on failure; either way the in-flight guard is
    /// released before returning.
    pub async fn send(&self, raw_text: &str) -> Result<(), ChatError> {
        let text = raw_text.trim();
        if text.is_empty() {
            return Ok(());
        }

        {
            let mut guard = self.inner.lock().await;
            if guard.send_in_flight {
                info!("chat: send refused while another send is in flight");
                return Ok(());
            }
            guard.send_in_flight = true;
        }

        let result = self.send_guarded(text).await;

        self.inner.lock().await.send_in_flight = false;
        result
    }

    async fn send_guarded(&self, text: &str) -> Result<(), ChatError> {
        // Resolution failures abort before any store mutation.
        let conversation_id = self.resolve_conversation().await?;

        let pending = Message::outgoing(conversation_id.clone(), self.session.role, text);
        let local_id = pending.id.clone();
        {
            let mut guard = self.inner.lock().await;
            guard.store.insert(pending.clone());
        }
        let _ = self
            .events
            .send(ChatEvent::MessagePending { message: pending });

        // No generation check on the way back: a send still in flight when
        // the view closes must reconcile, or the message would silently
        // disappear from the user's account.
        match self.backend.post_message(&conversation_id, text).await {
            Ok(record) => {
                let confirmed = record.into_message(conversation_id.clone());
                {
                    let mut guard = self.inner.lock().await;
                    guard.store.confirm(&local_id, confirmed.clone());
                }
                info!(
                    conversation_id = %conversation_id,
                    message_id = %confirmed.id,
                    "chat: send confirmed"
                );
                let _ = self.events.send(ChatEvent::MessageConfirmed {
                    local_id,
                    message: confirmed,
                });
                Ok(())
            }
            Err(source) => {
                {
                    let mut guard = self.inner.lock().await;
                    guard.store.remove(&local_id);
                }
                warn!(
                    conversation_id = %conversation_id,
                    "chat: send failed, optimistic entry rolled back: {source}"
                );
                let _ = self.events.send(ChatEvent::SendRolledBack { local_id });
                Err(ChatError::SendFailed {
                    text: text.to_string(),
                    source,
                })
            }
        }
    }

    /// Called when the hosting view closes. Late resolve and history results
    /// are discarded on arrival; there is no network-level abort.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        guard.generation = guard.generation.wrapping_add(1);
    }

    /// The display projection in the device-local timezone.
    pub async fn rows(&self) -> Vec<Row> {
        self.rows_at_offset(*Local::now().offset()).await
    }

    pub async fn rows_at_offset(&self, offset: FixedOffset) -> Vec<Row> {
        let guard = self.inner.lock().await;
        project_rows(guard.store.messages(), self.session.role, offset)
    }
}
