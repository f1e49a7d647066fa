use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{InputError, SubmitError, MAX_MESSAGE_CHARS};
use crate::gate::{ActionKind, ActorKey, GateDecision, SubmissionGate};
use crate::identity::{self, Actor, ClientInfo, Fingerprint, SessionStore};
use crate::language::LeaderboardFilter;
use crate::leaderboard::{self, LeaderboardEntry, ScoreRecord};
use crate::moderation::{self, ModerationError, ModerationFilter, PastMessage, SubstringFilter};
use crate::store::{AppendOutcome, Collection, Persistence, StoreError, UpsertOutcome};
use crate::util::{escape_markup, sha256_hex};
use crate::validator::{self, ScoreSubmission};

pub const SCORE_HISTORY_CAP: usize = 10_000;
pub const CHAT_HISTORY_CAP: usize = 100;
pub const CHAT_PAGE_SIZE: usize = 50;
pub const CHAT_MAX_AGE: Duration = Duration::from_secs(10);
pub const LEADERBOARD_MAX_AGE: Duration = Duration::from_secs(60);

/// Persisted chat line; `message` is stored markup-escaped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub username: String,
    pub message: String,
    pub submitted_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
}

/// Chat line as handed to readers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicChatMessage {
    pub id: String,
    pub username: String,
    pub message: String,
    pub submitted_at: DateTime<Utc>,
}

impl From<ChatMessage> for PublicChatMessage {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            username: m.username,
            message: m.message,
            submitted_at: m.submitted_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    pub address_hash: String,
}

/// A read response with its validator and freshness lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached<T> {
    pub body: T,
    pub etag: String,
    pub max_age: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch<T> {
    Fresh(Cached<T>),
    /// the caller's etag still matches
    NotModified,
}

fn respond<T: Serialize>(body: T, max_age: Duration, if_none_match: Option<&str>) -> Fetch<T> {
    let etag = sha256_hex(&serde_json::to_vec(&body).unwrap_or_default());
    if if_none_match == Some(etag.as_str()) {
        Fetch::NotModified
    } else {
        Fetch::Fresh(Cached {
            body,
            etag,
            max_age,
        })
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// The shared scoreboard and chat: every submission and read goes through here
pub struct Board {
    store: Arc<dyn Persistence>,
    gate: SubmissionGate,
    filter: Box<dyn ModerationFilter>,
}

impl Board {
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self {
            gate: SubmissionGate::new(store.clone()),
            store,
            filter: Box::new(SubstringFilter::default()),
        }
    }

    pub fn with_filter<F: ModerationFilter + 'static>(mut self, filter: F) -> Self {
        self.filter = Box::new(filter);
        self
    }

    fn load<T: DeserializeOwned>(&self, collection: Collection) -> Vec<T> {
        let bodies = match self.store.read_all(collection) {
            Ok(bodies) => bodies,
            Err(e) => {
                tracing::warn!(collection = collection.as_str(), error = %e, "read failed, treating as empty");
                return Vec::new();
            }
        };
        bodies
            .iter()
            .filter_map(|body| match serde_json::from_str(body) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::warn!(collection = collection.as_str(), error = %e, "skipping corrupt document");
                    None
                }
            })
            .collect()
    }

    fn admit(&self, key: &ActorKey, kind: ActionKind, now: DateTime<Utc>) -> Result<(), SubmitError> {
        match self.gate.check(key, kind, now)? {
            GateDecision::Allowed => Ok(()),
            GateDecision::Denied { retry_after } => {
                Err(SubmitError::RateLimited { kind, retry_after })
            }
        }
    }

    /// Ledger write after the submission itself has committed. A failure here
    /// only leaves the limiter a little behind; the submission stands.
    fn record_attempt(&self, key: &ActorKey, kind: ActionKind, now: DateTime<Utc>) {
        if let Err(e) = self.gate.record(key, kind, now) {
            tracing::warn!(actor = key.as_str(), %kind, error = %e, "could not record attempt");
        }
    }

    fn signed_in(actor: &Actor) -> Result<&str, SubmitError> {
        actor.username.as_deref().ok_or(SubmitError::Unauthenticated)
    }

    pub fn login(&self, client: &ClientInfo, username: &str) -> Result<String, SubmitError> {
        self.login_at(client, username, Utc::now())
    }

    /// Sign in as `username`, registering it on first use. Returns the name
    /// as first registered, which may differ in case from `username`.
    pub fn login_at(
        &self,
        client: &ClientInfo,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<String, SubmitError> {
        let key = ActorKey::login(&client.address);
        self.admit(&key, ActionKind::Login, now)?;

        let name = identity::validate_username(username)?;
        let user = UserRecord {
            id: new_id("user"),
            username: name.to_string(),
            created_at: now,
            last_login: Some(now),
            address_hash: client.fingerprint().address_hash,
        };
        let body = serde_json::to_string(&user).map_err(StoreError::from)?;

        let touch = |doc: &str| {
            let mut existing = serde_json::from_str::<UserRecord>(doc).ok()?;
            if !existing.username.eq_ignore_ascii_case(name) {
                return None;
            }
            existing.last_login = Some(now);
            serde_json::to_string(&existing).ok()
        };
        let canonical = match self.store.upsert(Collection::Users, &body, &touch)? {
            UpsertOutcome::Inserted => {
                tracing::info!(username = name, "registered new user");
                name.to_string()
            }
            UpsertOutcome::Updated(doc) => serde_json::from_str::<UserRecord>(&doc)
                .map(|u| u.username)
                .unwrap_or_else(|_| name.to_string()),
        };

        self.gate.record(&key, ActionKind::Login, now)?;
        tracing::info!(username = %canonical, "login");
        Ok(canonical)
    }

    pub fn logout(&self, session: &dyn SessionStore) {
        if let Some(user) = session.current_user() {
            tracing::info!(username = %user, "logout");
        }
        session.sign_out();
    }

    pub fn submit_score(
        &self,
        actor: &Actor,
        submission: &ScoreSubmission,
    ) -> Result<ScoreRecord, SubmitError> {
        self.submit_score_at(actor, submission, Utc::now())
    }

    pub fn submit_score_at(
        &self,
        actor: &Actor,
        submission: &ScoreSubmission,
        now: DateTime<Utc>,
    ) -> Result<ScoreRecord, SubmitError> {
        let username = Self::signed_in(actor)?;
        let key = ActorKey::user(username, &actor.client.address);
        self.admit(&key, ActionKind::Score, now)?;

        let score = validator::validate(submission).inspect_err(|e| {
            tracing::warn!(username, error = %e, "score rejected");
        })?;

        let record = ScoreRecord {
            id: new_id("score"),
            username: username.to_string(),
            language: score.language,
            wpm: score.wpm,
            accuracy: score.accuracy,
            errors: score.errors,
            time_secs: score.time_secs,
            submitted_at: now,
            fingerprint: actor.client.fingerprint(),
        };
        let body = serde_json::to_string(&record).map_err(StoreError::from)?;
        self.store
            .append(Collection::Scores, &body, SCORE_HISTORY_CAP, None)?;
        self.record_attempt(&key, ActionKind::Score, now);

        tracing::info!(
            username,
            language = %record.language,
            wpm = record.wpm,
            accuracy = record.accuracy,
            "score saved"
        );
        Ok(record)
    }

    pub fn submit_chat(&self, actor: &Actor, message: &str) -> Result<ChatMessage, SubmitError> {
        self.submit_chat_at(actor, message, Utc::now())
    }

    pub fn submit_chat_at(
        &self,
        actor: &Actor,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, SubmitError> {
        let username = Self::signed_in(actor)?;
        let key = ActorKey::user(username, &actor.client.address);
        self.admit(&key, ActionKind::Chat, now)?;

        let text = message.trim();
        if text.is_empty() {
            return Err(InputError::EmptyMessage.into());
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(InputError::MessageTooLong.into());
        }
        self.filter.screen(text).inspect_err(|e| {
            tracing::warn!(username, error = %e, "chat message blocked");
        })?;

        let chat = ChatMessage {
            id: new_id("msg"),
            username: username.to_string(),
            message: escape_markup(text),
            submitted_at: now,
            fingerprint: actor.client.fingerprint(),
        };
        let body = serde_json::to_string(&chat).map_err(StoreError::from)?;

        let veto = |docs: &[String]| {
            let history: Vec<ChatMessage> = docs
                .iter()
                .filter_map(|d| serde_json::from_str(d).ok())
                .collect();
            let past = history.iter().map(|m| PastMessage {
                author: &m.username,
                text: &m.message,
                submitted_at: m.submitted_at,
            });
            moderation::check_repeat(past, username, &chat.message, now).is_err()
        };
        match self.store.append(Collection::Chat, &body, CHAT_HISTORY_CAP, Some(&veto))? {
            AppendOutcome::Appended => {}
            AppendOutcome::Vetoed => {
                tracing::warn!(username, "duplicate chat message");
                return Err(ModerationError::Duplicate.into());
            }
        }
        self.record_attempt(&key, ActionKind::Chat, now);

        tracing::info!(username, message = %chat.message, "chat message");
        Ok(chat)
    }

    /// Every stored score, oldest first
    pub fn scores(&self) -> Vec<ScoreRecord> {
        self.load(Collection::Scores)
    }

    pub fn fetch_leaderboard(
        &self,
        filter: LeaderboardFilter,
        if_none_match: Option<&str>,
    ) -> Fetch<Vec<LeaderboardEntry>> {
        let ranked = leaderboard::rank(&self.scores(), filter);
        respond(ranked, LEADERBOARD_MAX_AGE, if_none_match)
    }

    /// The latest chat lines, oldest first
    pub fn fetch_chat(&self, if_none_match: Option<&str>) -> Fetch<Vec<PublicChatMessage>> {
        let mut messages: Vec<ChatMessage> = self.load(Collection::Chat);
        let skip = messages.len().saturating_sub(CHAT_PAGE_SIZE);
        let page: Vec<PublicChatMessage> = messages
            .drain(skip..)
            .map(PublicChatMessage::from)
            .collect();
        respond(page, CHAT_MAX_AGE, if_none_match)
    }
}

/// Client-side copy of a read response, reused until its max-age lapses and
/// then revalidated with the stored etag
#[derive(Debug)]
pub struct PollCache<T> {
    entry: Option<(Cached<T>, Instant)>,
}

impl<T> Default for PollCache<T> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<T> PollCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Last body received, fresh or not
    pub fn current(&self) -> Option<&T> {
        self.entry.as_ref().map(|(c, _)| &c.body)
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        match &self.entry {
            Some((cached, fetched_at)) => now.duration_since(*fetched_at) < cached.max_age,
            None => false,
        }
    }

    /// Cached body if still fresh, otherwise whatever `fetch` produces given
    /// the last etag.
    pub fn get<F>(&mut self, now: Instant, fetch: F) -> Option<&T>
    where
        F: FnOnce(Option<&str>) -> Fetch<T>,
    {
        if !self.is_fresh(now) {
            let etag = self.entry.as_ref().map(|(c, _)| c.etag.clone());
            match fetch(etag.as_deref()) {
                Fetch::Fresh(cached) => self.entry = Some((cached, now)),
                Fetch::NotModified => {
                    if let Some((_, fetched_at)) = self.entry.as_mut() {
                        *fetched_at = now;
                    }
                }
            }
        }
        self.entry.as_ref().map(|(c, _)| &c.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LocalSession;
    use crate::language::Language;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn board() -> (Board, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Board::new(store.clone()), store)
    }

    fn client() -> ClientInfo {
        ClientInfo::new("10.0.0.1", "test-agent")
    }

    fn ada() -> Actor {
        Actor::signed_in("ada", client())
    }

    fn submission(wpm: i64, accuracy: i64) -> ScoreSubmission {
        ScoreSubmission {
            language: Some("rust".into()),
            wpm: Some(wpm),
            accuracy: Some(accuracy),
            errors: Some(2),
            time: Some(40),
        }
    }

    #[test]
    fn test_login_registers_then_matches_case_insensitively() {
        let (board, store) = board();
        assert_eq!(board.login_at(&client(), "Ada_1", at(0)).unwrap(), "Ada_1");
        assert_eq!(board.login_at(&client(), "ada_1", at(1)).unwrap(), "Ada_1");
        assert_eq!(store.read_all(Collection::Users).unwrap().len(), 1);
    }

    #[test]
    fn test_login_refreshes_last_login() {
        let (board, store) = board();
        board.login_at(&client(), "ada_1", at(0)).unwrap();
        board.login_at(&client(), "ADA_1", at(90)).unwrap();

        let users: Vec<UserRecord> = store
            .read_all(Collection::Users)
            .unwrap()
            .iter()
            .map(|d| serde_json::from_str(d).unwrap())
            .collect();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].created_at, at(0));
        assert_eq!(users[0].last_login, Some(at(90)));
    }

    /// Delegates to memory but refuses every ledger write
    struct LedgerDown(MemoryStore);

    impl Persistence for LedgerDown {
        fn read_all(&self, collection: Collection) -> Result<Vec<String>, StoreError> {
            self.0.read_all(collection)
        }

        fn append(
            &self,
            collection: Collection,
            body: &str,
            cap: usize,
            veto: Option<&crate::store::Veto<'_>>,
        ) -> Result<AppendOutcome, StoreError> {
            if let Collection::Ledger(_) = collection {
                return Err(StoreError::Busy);
            }
            self.0.append(collection, body, cap, veto)
        }

        fn upsert(
            &self,
            collection: Collection,
            body: &str,
            merge: &crate::store::Merge<'_>,
        ) -> Result<UpsertOutcome, StoreError> {
            self.0.upsert(collection, body, merge)
        }

        fn retain(
            &self,
            collection: Collection,
            keep: &dyn Fn(&str) -> bool,
        ) -> Result<Vec<String>, StoreError> {
            self.0.retain(collection, keep)
        }
    }

    #[test]
    fn test_stored_submission_succeeds_when_ledger_write_fails() {
        let store = Arc::new(LedgerDown(MemoryStore::new()));
        let board = Board::new(store.clone());

        let record = board.submit_score_at(&ada(), &submission(70, 96), at(0));
        assert!(record.is_ok(), "{record:?}");
        assert_eq!(store.read_all(Collection::Scores).unwrap().len(), 1);

        let chat = board.submit_chat_at(&ada(), "hi", at(1));
        assert!(chat.is_ok(), "{chat:?}");
        assert_eq!(store.read_all(Collection::Chat).unwrap().len(), 1);
    }

    #[test]
    fn test_login_rejects_bad_username() {
        let (board, _) = board();
        assert_matches!(
            board.login_at(&client(), "a b", at(0)),
            Err(SubmitError::Validation(InputError::Username(_)))
        );
    }

    #[test]
    fn test_login_rate_limited_by_address() {
        let (board, _) = board();
        for i in 0..10 {
            board.login_at(&client(), "ada", at(i)).unwrap();
        }
        assert_matches!(
            board.login_at(&client(), "bob", at(20)),
            Err(SubmitError::RateLimited { kind: ActionKind::Login, .. })
        );
        let elsewhere = ClientInfo::new("10.0.0.2", "test-agent");
        assert!(board.login_at(&elsewhere, "bob", at(20)).is_ok());
    }

    #[test]
    fn test_logout_clears_session() {
        let (board, _) = board();
        let session = LocalSession::new(Some("ada".into()));
        board.logout(&session);
        assert_eq!(session.current_user(), None);
    }

    #[test]
    fn test_score_requires_login() {
        let (board, _) = board();
        let anon = Actor::anonymous(client());
        assert_matches!(
            board.submit_score_at(&anon, &submission(60, 90), at(0)),
            Err(SubmitError::Unauthenticated)
        );
    }

    #[test]
    fn test_score_saved_with_fingerprint() {
        let (board, _) = board();
        let record = board.submit_score_at(&ada(), &submission(60, 90), at(0)).unwrap();
        assert!(record.id.starts_with("score_"));
        assert_eq!(record.language, Language::Rust);
        assert_eq!(record.fingerprint, client().fingerprint());
        assert_eq!(board.scores(), vec![record]);
    }

    #[test]
    fn test_implausible_score_not_stored() {
        let (board, _) = board();
        assert_matches!(
            board.submit_score_at(&ada(), &submission(250, 98), at(0)),
            Err(SubmitError::Validation(InputError::Score(_)))
        );
        assert!(board.scores().is_empty());
    }

    #[test]
    fn test_score_rate_limit() {
        let (board, _) = board();
        for i in 0..20 {
            board.submit_score_at(&ada(), &submission(60, 90), at(i)).unwrap();
        }
        assert_matches!(
            board.submit_score_at(&ada(), &submission(60, 90), at(30)),
            Err(SubmitError::RateLimited { kind: ActionKind::Score, .. })
        );
        assert!(board.submit_score_at(&ada(), &submission(60, 90), at(300)).is_ok());
    }

    #[test]
    fn test_chat_is_escaped_and_public_view_hides_fingerprint() {
        let (board, _) = board();
        board.submit_chat_at(&ada(), "  <b>hi</b>  ", at(0)).unwrap();
        let Fetch::Fresh(cached) = board.fetch_chat(None) else {
            panic!("expected fresh chat");
        };
        assert_eq!(cached.body.len(), 1);
        assert_eq!(cached.body[0].message, "&lt;b&gt;hi&lt;/b&gt;");
        assert_eq!(cached.max_age, CHAT_MAX_AGE);
    }

    #[test]
    fn test_chat_rejections() {
        let (board, _) = board();
        assert_matches!(
            board.submit_chat_at(&Actor::anonymous(client()), "hi", at(0)),
            Err(SubmitError::Unauthenticated)
        );
        assert_matches!(
            board.submit_chat_at(&ada(), "   ", at(0)),
            Err(SubmitError::Validation(InputError::EmptyMessage))
        );
        assert_matches!(
            board.submit_chat_at(&ada(), &"x".repeat(201), at(0)),
            Err(SubmitError::Validation(InputError::MessageTooLong))
        );
        assert!(board.submit_chat_at(&ada(), &"x".repeat(200), at(0)).is_ok());
        assert_matches!(
            board.submit_chat_at(&ada(), "free HACKS here", at(1)),
            Err(SubmitError::Moderation(ModerationError::Prohibited(_)))
        );
    }

    #[test]
    fn test_duplicate_chat_within_window() {
        let (board, _) = board();
        board.submit_chat_at(&ada(), "gg", at(0)).unwrap();
        assert_matches!(
            board.submit_chat_at(&ada(), "gg", at(10)),
            Err(SubmitError::Moderation(ModerationError::Duplicate))
        );
        assert!(board.submit_chat_at(&ada(), "gg", at(400)).is_ok());
        let bob = Actor::signed_in("bob", client());
        assert!(board.submit_chat_at(&bob, "gg", at(401)).is_ok());
    }

    #[test]
    fn test_duplicate_detection_compares_escaped_text() {
        let (board, _) = board();
        board.submit_chat_at(&ada(), "a<b", at(0)).unwrap();
        assert_matches!(
            board.submit_chat_at(&ada(), "a<b", at(5)),
            Err(SubmitError::Moderation(ModerationError::Duplicate))
        );
    }

    #[test]
    fn test_custom_filter() {
        let store = Arc::new(MemoryStore::new());
        let board = Board::new(store).with_filter(SubstringFilter::new(["tabs"]));
        assert!(board.submit_chat_at(&ada(), "spam", at(0)).is_ok());
        assert_matches!(
            board.submit_chat_at(&ada(), "TABS > spaces", at(1)),
            Err(SubmitError::Moderation(_))
        );
    }

    #[test]
    fn test_chat_history_capped_and_paged() {
        let (board, store) = board();
        // spread over time to stay under the chat rate limit
        for i in 0..120 {
            board
                .submit_chat_at(&ada(), &format!("line {i}"), at(i * 10))
                .unwrap();
        }
        assert_eq!(store.read_all(Collection::Chat).unwrap().len(), CHAT_HISTORY_CAP);
        let Fetch::Fresh(cached) = board.fetch_chat(None) else {
            panic!("expected fresh chat");
        };
        assert_eq!(cached.body.len(), CHAT_PAGE_SIZE);
        assert_eq!(cached.body[0].message, "line 70");
        assert_eq!(cached.body[49].message, "line 119");
    }

    #[test]
    fn test_corrupt_documents_are_skipped() {
        let (board, store) = board();
        store.append(Collection::Scores, "{oops", 10, None).unwrap();
        board.submit_score_at(&ada(), &submission(60, 90), at(0)).unwrap();
        assert_eq!(board.scores().len(), 1);
    }

    #[test]
    fn test_leaderboard_etag_revalidation() {
        let (board, _) = board();
        board.submit_score_at(&ada(), &submission(60, 90), at(0)).unwrap();
        let Fetch::Fresh(first) = board.fetch_leaderboard(LeaderboardFilter::All, None) else {
            panic!("expected fresh leaderboard");
        };
        assert_eq!(first.max_age, LEADERBOARD_MAX_AGE);
        assert_eq!(
            board.fetch_leaderboard(LeaderboardFilter::All, Some(&first.etag)),
            Fetch::NotModified
        );

        board.submit_score_at(&ada(), &submission(70, 95), at(1)).unwrap();
        assert_matches!(
            board.fetch_leaderboard(LeaderboardFilter::All, Some(&first.etag)),
            Fetch::Fresh(c) if c.body[0].wpm == 70
        );
    }

    #[test]
    fn test_poll_cache_reuses_until_stale() {
        let mut cache: PollCache<u32> = PollCache::new();
        let t0 = Instant::now();
        let fresh = |v: u32| {
            move |_: Option<&str>| {
                Fetch::Fresh(Cached {
                    body: v,
                    etag: format!("e{v}"),
                    max_age: Duration::from_secs(10),
                })
            }
        };

        assert_eq!(cache.get(t0, fresh(1)), Some(&1));
        // still fresh: the fetcher is not consulted
        assert_eq!(cache.get(t0 + Duration::from_secs(5), fresh(2)), Some(&1));

        let mut seen_etag = None;
        let later = t0 + Duration::from_secs(11);
        assert_eq!(
            cache.get(later, |etag| {
                seen_etag = etag.map(str::to_string);
                Fetch::NotModified
            }),
            Some(&1)
        );
        assert_eq!(seen_etag.as_deref(), Some("e1"));
        assert!(cache.is_fresh(later + Duration::from_secs(1)));

        cache.invalidate();
        assert_eq!(cache.get(later, fresh(3)), Some(&3));
    }
}
