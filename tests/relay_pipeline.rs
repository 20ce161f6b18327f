//! End-to-end pipeline tests with a recording platform mock and an
//! in-memory store: relay routing, comment seeding, edit propagation, and
//! the missing-copy fallback.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use tag_relay::comments::CommentSeeder;
use tag_relay::likes::LikeCounter;
use tag_relay::message::{Entity, EntityKind, InboundMessage, MediaKind};
use tag_relay::models::{Channel, Group, RelayRecord};
use tag_relay::platform::{PlatformError, RelayPlatform, SendOptions};
use tag_relay::relay::{RelayEngine, RelayStore};
use tag_relay::storage::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Forward { to: i64, from: i64, message_id: i32 },
    SendText { chat: i64 },
    SendPhoto { chat: i64, file_id: String },
    SendMedia { chat: i64 },
    EditText { chat: i64, message_id: i32 },
    EditCaption { chat: i64, message_id: i32 },
    Delete { chat: i64, message_id: i32 },
    Comment { channel: i64 },
}

/// Records every platform call and hands out fresh message ids from 1000.
/// Edit targets listed in `missing` answer with `NotFound`.
struct MockPlatform {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicI32,
    missing: Mutex<HashSet<(i64, i32)>>,
}

impl MockPlatform {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicI32::new(1000),
            missing: Mutex::new(HashSet::new()),
        }
    }

    fn mark_missing(&self, chat: i64, message_id: i32) {
        self.missing
            .lock()
            .expect("missing lock")
            .insert((chat, message_id));
    }

    fn record(&self, call: Call) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn record_with_id(&self, call: Call) -> i32 {
        self.record(call);
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn is_missing(&self, chat: i64, message_id: i32) -> bool {
        self.missing
            .lock()
            .expect("missing lock")
            .contains(&(chat, message_id))
    }
}

#[async_trait]
impl RelayPlatform for MockPlatform {
    async fn forward_message(
        &self,
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
    ) -> Result<i32, PlatformError> {
        Ok(self.record_with_id(Call::Forward {
            to: to_chat,
            from: from_chat,
            message_id,
        }))
    }

    async fn send_text(&self, chat: i64, _opts: &SendOptions) -> Result<i32, PlatformError> {
        Ok(self.record_with_id(Call::SendText { chat }))
    }

    async fn send_audio(
        &self,
        chat: i64,
        _file_id: &str,
        _opts: &SendOptions,
    ) -> Result<i32, PlatformError> {
        Ok(self.record_with_id(Call::SendMedia { chat }))
    }

    async fn send_document(
        &self,
        chat: i64,
        _file_id: &str,
        _opts: &SendOptions,
    ) -> Result<i32, PlatformError> {
        Ok(self.record_with_id(Call::SendMedia { chat }))
    }

    async fn send_photo(
        &self,
        chat: i64,
        file_id: &str,
        _opts: &SendOptions,
    ) -> Result<i32, PlatformError> {
        Ok(self.record_with_id(Call::SendPhoto {
            chat,
            file_id: file_id.to_owned(),
        }))
    }

    async fn send_video(
        &self,
        chat: i64,
        _file_id: &str,
        _opts: &SendOptions,
    ) -> Result<i32, PlatformError> {
        Ok(self.record_with_id(Call::SendMedia { chat }))
    }

    async fn edit_message_text(
        &self,
        chat: i64,
        message_id: i32,
        _opts: &SendOptions,
    ) -> Result<(), PlatformError> {
        self.record(Call::EditText { chat, message_id });
        if self.is_missing(chat, message_id) {
            return Err(PlatformError::NotFound);
        }
        Ok(())
    }

    async fn edit_message_caption(
        &self,
        chat: i64,
        message_id: i32,
        _opts: &SendOptions,
    ) -> Result<(), PlatformError> {
        self.record(Call::EditCaption { chat, message_id });
        if self.is_missing(chat, message_id) {
            return Err(PlatformError::NotFound);
        }
        Ok(())
    }

    async fn delete_message(&self, chat: i64, message_id: i32) -> Result<(), PlatformError> {
        self.record(Call::Delete { chat, message_id });
        Ok(())
    }
}

#[async_trait]
impl CommentSeeder for MockPlatform {
    async fn create_comment(
        &self,
        channel_id: i64,
        _caption_html: &str,
        _admins: &[i64],
    ) -> Result<(), PlatformError> {
        self.record(Call::Comment {
            channel: channel_id,
        });
        Ok(())
    }
}

#[async_trait]
impl LikeCounter for MockPlatform {
    async fn count_likes(
        &self,
        _chat_id: i64,
        _message_id: i32,
    ) -> Result<(u32, u32), StorageError> {
        Ok((0, 0))
    }
}

#[derive(Default)]
struct MemStore {
    groups: Mutex<HashMap<i64, Group>>,
    channels: Mutex<HashMap<i64, Channel>>,
    relays: Mutex<HashMap<(i64, i32), Vec<RelayRecord>>>,
}

impl MemStore {
    fn with_group(group: Group) -> Self {
        let store = Self::default();
        store
            .groups
            .lock()
            .expect("groups lock")
            .insert(group.chat_id, group);
        store
    }

    fn seed_record(&self, record: RelayRecord) {
        self.relays
            .lock()
            .expect("relays lock")
            .entry((record.chat_id, record.message_id))
            .or_default()
            .push(record);
    }

    fn records(&self, chat_id: i64, message_id: i32) -> Vec<RelayRecord> {
        self.relays
            .lock()
            .expect("relays lock")
            .get(&(chat_id, message_id))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RelayStore for MemStore {
    async fn group(&self, chat_id: i64) -> Result<Option<Group>, StorageError> {
        Ok(self.groups.lock().expect("groups lock").get(&chat_id).cloned())
    }

    async fn channel(&self, chat_id: i64) -> Result<Option<Channel>, StorageError> {
        Ok(self
            .channels
            .lock()
            .expect("channels lock")
            .get(&chat_id)
            .cloned())
    }

    async fn record_relay(&self, record: &RelayRecord) -> Result<(), StorageError> {
        self.seed_record(record.clone());
        Ok(())
    }

    async fn relays_for(
        &self,
        chat_id: i64,
        message_id: i32,
    ) -> Result<Vec<RelayRecord>, StorageError> {
        Ok(self.records(chat_id, message_id))
    }
}

const CHAT: i64 = -1001234567890;

fn group(forwards: bool, comments: bool) -> Group {
    let mut group = Group::new(CHAT);
    group.settings.forwards = forwards;
    group.settings.comments = comments;
    group.settings.link = false;
    group.settings.likes = false;
    group
}

fn engine(platform: Arc<MockPlatform>, store: Arc<MemStore>) -> RelayEngine {
    RelayEngine::new(platform.clone(), store, platform.clone(), platform)
}

fn tagged(message_id: i32, text: &str, spans: &[(usize, usize)]) -> InboundMessage {
    InboundMessage {
        chat_id: CHAT,
        chat_username: None,
        message_id,
        text: text.to_owned(),
        entities: spans
            .iter()
            .map(|&(offset, length)| Entity::new(EntityKind::Hashtag, offset, length))
            .collect(),
        media: MediaKind::Text,
        forwarded: false,
        reply_to: None,
    }
}

#[tokio::test]
async fn forward_mode_relays_to_each_bound_channel() {
    let mut g = group(true, false);
    g.bind("foo", 100);
    g.bind("foo", 200);
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(g));
    let engine = engine(platform.clone(), store.clone());

    engine
        .handle_message(&tagged(10, "#foo hi", &[(0, 4)]))
        .await
        .expect("relay");

    assert_eq!(
        platform.calls(),
        vec![
            Call::Forward {
                to: 100,
                from: CHAT,
                message_id: 10
            },
            Call::Forward {
                to: 200,
                from: CHAT,
                message_id: 10
            },
        ]
    );
    let records = store.records(CHAT, 10);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].channel_id, 100);
    assert_eq!(records[0].channel_message_id, 1000);
    assert_eq!(records[1].channel_id, 200);
    assert_eq!(records[1].channel_message_id, 1001);
}

#[tokio::test]
async fn unbound_tag_relays_nowhere() {
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(group(true, false)));
    let engine = engine(platform.clone(), store.clone());

    engine
        .handle_message(&tagged(10, "#nope", &[(0, 5)]))
        .await
        .expect("relay");

    assert!(platform.calls().is_empty());
    assert!(store.records(CHAT, 10).is_empty());
}

#[tokio::test]
async fn resend_text_seeds_comment_before_send() {
    let mut g = group(false, true);
    g.bind("foo", 100);
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(g));
    let engine = engine(platform.clone(), store.clone());

    engine
        .handle_message(&tagged(10, "#foo hello", &[(0, 4)]))
        .await
        .expect("relay");

    assert_eq!(
        platform.calls(),
        vec![Call::Comment { channel: 100 }, Call::SendText { chat: 100 }]
    );
}

#[tokio::test]
async fn resend_photo_uses_highest_resolution_variant() {
    let mut g = group(false, false);
    g.bind("foo", 100);
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(g));
    let engine = engine(platform.clone(), store.clone());

    let mut msg = tagged(10, "#foo pic", &[(0, 4)]);
    msg.media = MediaKind::Photo {
        sizes: vec!["thumb".to_owned(), "full".to_owned()],
    };
    engine.handle_message(&msg).await.expect("relay");

    assert_eq!(
        platform.calls(),
        vec![Call::SendPhoto {
            chat: 100,
            file_id: "full".to_owned()
        }]
    );
}

#[tokio::test]
async fn resend_photo_with_comments_seeds_exactly_one_comment_first() {
    let mut g = group(false, true);
    g.bind("foo", 100);
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(g));
    let engine = engine(platform.clone(), store.clone());

    let mut msg = tagged(10, "#foo pic", &[(0, 4)]);
    msg.media = MediaKind::Photo {
        sizes: vec!["full".to_owned()],
    };
    engine.handle_message(&msg).await.expect("relay");

    assert_eq!(
        platform.calls(),
        vec![
            Call::Comment { channel: 100 },
            Call::SendPhoto {
                chat: 100,
                file_id: "full".to_owned()
            },
        ]
    );
}

#[tokio::test]
async fn bare_tag_reply_relays_the_parent_message() {
    let mut g = group(true, false);
    g.bind("foo", 100);
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(g));
    let engine = engine(platform.clone(), store.clone());

    let mut msg = tagged(50, "#foo", &[(0, 4)]);
    msg.reply_to = Some(Box::new(tagged(42, "the actual content", &[])));
    engine.handle_message(&msg).await.expect("relay");

    assert_eq!(
        platform.calls(),
        vec![Call::Forward {
            to: 100,
            from: CHAT,
            message_id: 42
        }]
    );
    let records = store.records(CHAT, 42);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].message_id, 42);
}

#[tokio::test]
async fn edit_without_records_or_hashtags_does_nothing() {
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(group(true, false)));
    let engine = engine(platform.clone(), store.clone());

    engine
        .handle_edit(&tagged(10, "plain edit", &[]))
        .await
        .expect("edit");

    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn edit_that_introduces_a_hashtag_relays_fresh() {
    let mut g = group(true, false);
    g.bind("foo", 100);
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(g));
    let engine = engine(platform.clone(), store.clone());

    engine
        .handle_edit(&tagged(10, "#foo now tagged", &[(0, 4)]))
        .await
        .expect("edit");

    assert_eq!(
        platform.calls(),
        vec![Call::Forward {
            to: 100,
            from: CHAT,
            message_id: 10
        }]
    );
    assert_eq!(store.records(CHAT, 10).len(), 1);
}

#[tokio::test]
async fn forward_mode_edit_reforwards_and_drops_old_copy() {
    let mut g = group(true, false);
    g.bind("foo", 100);
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(g));
    store.seed_record(RelayRecord::new(CHAT, 10, 100, 5));
    let engine = engine(platform.clone(), store.clone());

    engine
        .handle_edit(&tagged(10, "#foo edited", &[(0, 4)]))
        .await
        .expect("edit");

    assert_eq!(
        platform.calls(),
        vec![
            Call::Forward {
                to: 100,
                from: CHAT,
                message_id: 10
            },
            Call::Delete {
                chat: 100,
                message_id: 5
            },
        ]
    );
    // The superseded record stays; the new copy is appended after it.
    let records = store.records(CHAT, 10);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].channel_message_id, 1000);
}

#[tokio::test]
async fn resend_mode_edit_updates_each_copy_in_place() {
    let mut g = group(false, false);
    g.bind("foo", 100);
    g.bind("foo", 200);
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(g));
    store.seed_record(RelayRecord::new(CHAT, 10, 100, 5));
    store.seed_record(RelayRecord::new(CHAT, 10, 200, 6));
    let engine = engine(platform.clone(), store.clone());

    engine
        .handle_edit(&tagged(10, "#foo edited", &[(0, 4)]))
        .await
        .expect("edit");

    assert_eq!(
        platform.calls(),
        vec![
            Call::EditText {
                chat: 100,
                message_id: 5
            },
            Call::EditText {
                chat: 200,
                message_id: 6
            },
        ]
    );
    // Nothing vanished, so no new ledger records.
    assert_eq!(store.records(CHAT, 10).len(), 2);
}

#[tokio::test]
async fn missing_copy_falls_back_to_a_fresh_relay() {
    let mut g = group(false, false);
    g.bind("foo", 100);
    g.bind("foo", 200);
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(g));
    store.seed_record(RelayRecord::new(CHAT, 10, 100, 5));
    store.seed_record(RelayRecord::new(CHAT, 10, 200, 6));
    platform.mark_missing(100, 5);
    let engine = engine(platform.clone(), store.clone());

    engine
        .handle_edit(&tagged(10, "#foo edited", &[(0, 4)]))
        .await
        .expect("edit");

    assert_eq!(
        platform.calls(),
        vec![
            Call::EditText {
                chat: 100,
                message_id: 5
            },
            Call::SendText { chat: 100 },
            Call::EditText {
                chat: 200,
                message_id: 6
            },
        ]
    );
    // One new record for the re-relayed copy; the stale one stays put.
    let records = store.records(CHAT, 10);
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].channel_id, 100);
    assert_eq!(records[2].channel_message_id, 1000);
}

#[tokio::test]
async fn edit_targets_only_the_latest_record_per_channel() {
    let mut g = group(false, false);
    g.bind("foo", 100);
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(g));
    // An earlier fallback left a stale record behind.
    store.seed_record(RelayRecord::new(CHAT, 10, 100, 5));
    store.seed_record(RelayRecord::new(CHAT, 10, 100, 9));
    let engine = engine(platform.clone(), store.clone());

    engine
        .handle_edit(&tagged(10, "#foo edited", &[(0, 4)]))
        .await
        .expect("edit");

    assert_eq!(
        platform.calls(),
        vec![Call::EditText {
            chat: 100,
            message_id: 9
        }]
    );
}

#[tokio::test]
async fn edited_caption_media_uses_caption_edit() {
    let mut g = group(false, false);
    g.bind("foo", 100);
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(g));
    store.seed_record(RelayRecord::new(CHAT, 10, 100, 5));
    let engine = engine(platform.clone(), store.clone());

    let mut msg = tagged(10, "#foo edited", &[(0, 4)]);
    msg.media = MediaKind::Photo {
        sizes: vec!["full".to_owned()],
    };
    engine.handle_edit(&msg).await.expect("edit");

    assert_eq!(
        platform.calls(),
        vec![Call::EditCaption {
            chat: 100,
            message_id: 5
        }]
    );
}

#[tokio::test]
async fn forwarded_messages_are_never_relayed() {
    let mut g = group(true, false);
    g.bind("foo", 100);
    let platform = Arc::new(MockPlatform::new());
    let store = Arc::new(MemStore::with_group(g));
    let engine = engine(platform.clone(), store.clone());

    let mut msg = tagged(10, "#foo hi", &[(0, 4)]);
    msg.forwarded = true;
    engine.handle_message(&msg).await.expect("relay");

    assert!(platform.calls().is_empty());
}
