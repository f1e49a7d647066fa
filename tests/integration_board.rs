use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, TimeZone, Utc};

use codetype::board::{Board, Fetch};
use codetype::error::{InputError, SubmitError};
use codetype::gate::ActionKind;
use codetype::identity::{Actor, ClientInfo};
use codetype::language::{Language, LeaderboardFilter};
use codetype::moderation::ModerationError;
use codetype::store::SqliteStore;
use codetype::validator::{ScoreSubmission, ValidationError};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn open(path: &std::path::Path) -> Board {
    Board::new(Arc::new(SqliteStore::open(path).unwrap()))
}

fn score(language: &str, wpm: i64, accuracy: i64) -> ScoreSubmission {
    ScoreSubmission {
        language: Some(language.to_string()),
        wpm: Some(wpm),
        accuracy: Some(accuracy),
        errors: Some(2),
        time: Some(40),
    }
}

fn actor(name: &str) -> Actor {
    Actor::signed_in(name, ClientInfo::new("10.0.0.7", "integration"))
}

#[test]
fn login_limit_applies_per_address_and_expires() {
    let dir = tempfile::tempdir().unwrap();
    let board = open(&dir.path().join("board.db"));
    let client = ClientInfo::new("10.0.0.7", "integration");

    for i in 0..10 {
        let name = board
            .login_at(&client, "ada_l", t0() + Duration::seconds(i))
            .unwrap();
        assert_eq!(name, "ada_l");
    }
    let err = board
        .login_at(&client, "ada_l", t0() + Duration::seconds(20))
        .unwrap_err();
    assert_matches!(
        err,
        SubmitError::RateLimited {
            kind: ActionKind::Login,
            ..
        }
    );

    // a different address is unaffected
    let other = ClientInfo::new("10.0.0.8", "integration");
    assert!(board.login_at(&other, "grace", t0() + Duration::seconds(21)).is_ok());

    // the oldest attempts have left the window an hour later
    assert!(board
        .login_at(&client, "ada_l", t0() + Duration::seconds(3600 + 5))
        .is_ok());
}

#[test]
fn duplicate_chat_is_rejected_until_it_ages_out() {
    let dir = tempfile::tempdir().unwrap();
    let board = open(&dir.path().join("board.db"));
    let ada = actor("ada");

    board.submit_chat_at(&ada, "hello <all>", t0()).unwrap();
    let err = board
        .submit_chat_at(&ada, "hello <all>", t0() + Duration::seconds(10))
        .unwrap_err();
    assert_matches!(err, SubmitError::Moderation(ModerationError::Duplicate));

    // someone else may say the same thing
    board
        .submit_chat_at(&actor("grace"), "hello <all>", t0() + Duration::seconds(11))
        .unwrap();

    board
        .submit_chat_at(&ada, "hello <all>", t0() + Duration::seconds(400))
        .unwrap();

    let Fetch::Fresh(page) = board.fetch_chat(None) else {
        panic!("expected a fresh chat page");
    };
    assert_eq!(page.body.len(), 3);
    assert_eq!(page.body[0].message, "hello &lt;all&gt;");
}

#[test]
fn chat_requires_login_and_content() {
    let dir = tempfile::tempdir().unwrap();
    let board = open(&dir.path().join("board.db"));

    let anon = Actor::anonymous(ClientInfo::new("10.0.0.7", "integration"));
    assert_matches!(
        board.submit_chat_at(&anon, "hi", t0()),
        Err(SubmitError::Unauthenticated)
    );
    assert_matches!(
        board.submit_chat_at(&actor("ada"), "   ", t0()),
        Err(SubmitError::Validation(InputError::EmptyMessage))
    );
    assert_matches!(
        board.submit_chat_at(&actor("ada"), "free HACKS here", t0()),
        Err(SubmitError::Moderation(ModerationError::Prohibited(_)))
    );
}

#[test]
fn implausible_score_is_rejected_and_not_stored() {
    let dir = tempfile::tempdir().unwrap();
    let board = open(&dir.path().join("board.db"));

    let err = board
        .submit_score_at(&actor("ada"), &score("rust", 250, 99), t0())
        .unwrap_err();
    assert_matches!(
        err,
        SubmitError::Validation(InputError::Score(ValidationError::Implausible { .. }))
    );
    assert!(board.scores().is_empty());

    // fast but sloppy is allowed through
    board
        .submit_score_at(&actor("ada"), &score("rust", 250, 90), t0())
        .unwrap();
    assert_eq!(board.scores().len(), 1);
}

#[test]
fn leaderboard_is_deterministic_and_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.db");
    {
        let board = open(&path);
        board
            .submit_score_at(&actor("ada"), &score("python", 80, 95), t0())
            .unwrap();
        board
            .submit_score_at(&actor("ada"), &score("rust", 60, 90), t0())
            .unwrap();
        board
            .submit_score_at(&actor("grace"), &score("rust", 76, 100), t0())
            .unwrap();
        board
            .submit_score_at(&actor("bob"), &score("go", 76, 100), t0())
            .unwrap();
    }

    let board = open(&path);
    let Fetch::Fresh(first) = board.fetch_leaderboard(LeaderboardFilter::All, None) else {
        panic!("expected a fresh leaderboard");
    };
    let names: Vec<&str> = first.body.iter().map(|e| e.username.as_str()).collect();
    // one row per user; grace and bob tie so the name decides
    assert_eq!(names, vec!["bob", "grace", "ada"]);
    assert_eq!(first.body[2].language, Language::Python);

    assert_eq!(
        board.fetch_leaderboard(LeaderboardFilter::All, Some(&first.etag)),
        Fetch::NotModified
    );

    let Fetch::Fresh(rust) = board.fetch_leaderboard(LeaderboardFilter::Only(Language::Rust), None)
    else {
        panic!("expected a fresh leaderboard");
    };
    let names: Vec<&str> = rust.body.iter().map(|e| e.username.as_str()).collect();
    assert_eq!(names, vec!["grace", "ada"]);
}
