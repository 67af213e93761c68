use anyhow::anyhow;
use chrono::{Duration, TimeZone, Utc};
use shared::{
    domain::{MessageId, UserId},
    protocol::CursorPagination,
};

use super::*;

fn message(id: &str, second: i64) -> Message {
    Message {
        id: MessageId::from(id),
        content: id.to_string(),
        sender_id: UserId::from("u2"),
        conversation_id: ConversationId::from("c1"),
        created_at: Utc.with_ymd_and_hms(2024, 8, 28, 22, 0, 0).unwrap()
            + Duration::seconds(second),
        temp_id: None,
    }
}

fn page(range: std::ops::RangeInclusive<i64>, limit: u32) -> MessagesPage {
    MessagesPage {
        data: range.map(|n| message(&format!("m_{n}"), n)).collect(),
        pagination: CursorPagination {
            limit,
            ..CursorPagination::default()
        },
    }
}

fn store_with(range: std::ops::RangeInclusive<i64>) -> MessageStore {
    let mut store = MessageStore::new();
    for n in range {
        store.append(message(&format!("m_{n}"), n));
    }
    store
}

fn expect_fetch(decision: LoadDecision) -> FetchTicket {
    match decision {
        LoadDecision::Fetch(ticket) => ticket,
        other => panic!("expected a fetch, got {other:?}"),
    }
}

#[test]
fn older_page_uses_earliest_loaded_id_as_cursor() {
    let c1 = ConversationId::from("c1");
    let mut cursor = PaginationCursor::new(20);
    let store = store_with(21..=40);

    let ticket = expect_fetch(cursor.begin_older(&c1, Some(&store)));
    assert_eq!(ticket.kind, FetchKind::Older);
    assert_eq!(ticket.query.before_cursor.as_deref(), Some("m_21"));
    assert_eq!(ticket.query.limit, 20);
    assert!(cursor.is_loading(&c1));
}

#[test]
fn second_request_while_loading_is_refused() {
    let c1 = ConversationId::from("c1");
    let mut cursor = PaginationCursor::new(20);
    let store = store_with(21..=40);

    let ticket = expect_fetch(cursor.begin_older(&c1, Some(&store)));
    assert_eq!(cursor.begin_older(&c1, Some(&store)), LoadDecision::AlreadyLoading);
    assert_eq!(cursor.begin_latest(&c1), LoadDecision::AlreadyLoading);

    let completion = cursor.complete(&ticket, Some(&c1), Ok(page(1..=20, 20)));
    assert!(matches!(completion, Completion::Merge(ref data) if data.len() == 20));
    assert!(!cursor.is_loading(&c1));
    assert!(cursor.has_more(&c1));
}

#[test]
fn loads_for_different_conversations_do_not_block_each_other() {
    let mut cursor = PaginationCursor::new(20);
    let a = ConversationId::from("a");
    let b = ConversationId::from("b");
    let ta = expect_fetch(cursor.begin_latest(&a));
    let tb = expect_fetch(cursor.begin_latest(&b));
    assert_ne!(ta.id, tb.id);
}

#[test]
fn short_page_marks_history_exhausted() {
    let c1 = ConversationId::from("c1");
    let mut cursor = PaginationCursor::new(20);
    let store = store_with(6..=25);

    let ticket = expect_fetch(cursor.begin_older(&c1, Some(&store)));
    let completion = cursor.complete(&ticket, Some(&c1), Ok(page(1..=5, 20)));
    assert!(matches!(completion, Completion::Merge(ref data) if data.len() == 5));
    assert!(!cursor.has_more(&c1));
    assert_eq!(cursor.begin_older(&c1, Some(&store)), LoadDecision::Exhausted);

    cursor.reset(&c1);
    assert!(cursor.has_more(&c1));
}

#[test]
fn refresh_bypasses_the_guard_and_keeps_paging_state() {
    let c1 = ConversationId::from("c1");
    let mut cursor = PaginationCursor::new(20);
    let store = store_with(6..=25);
    let older = expect_fetch(cursor.begin_older(&c1, Some(&store)));

    let refresh = cursor.begin_refresh(&c1);
    assert_eq!(refresh.kind, FetchKind::Refresh);
    assert_eq!(refresh.query, PageQuery::latest(20));
    assert_ne!(refresh.id, older.id);

    let completion = cursor.complete(&refresh, Some(&c1), Ok(page(24..=26, 20)));
    assert!(matches!(completion, Completion::Merge(ref data) if data.len() == 3));
    assert!(cursor.is_loading(&c1));
    assert!(cursor.has_more(&c1));

    cursor.complete(&older, Some(&c1), Ok(page(1..=5, 20)));
    assert!(!cursor.is_loading(&c1));
    assert!(!cursor.has_more(&c1));
}

#[test]
fn response_for_inactive_conversation_is_stale() {
    let a = ConversationId::from("a");
    let b = ConversationId::from("b");
    let mut cursor = PaginationCursor::new(20);

    let ticket = expect_fetch(cursor.begin_latest(&a));
    let completion = cursor.complete(&ticket, Some(&b), Ok(page(1..=20, 20)));
    assert!(matches!(completion, Completion::Stale));
    assert!(!cursor.is_loading(&a));

    let ticket = expect_fetch(cursor.begin_latest(&a));
    assert!(matches!(cursor.complete(&ticket, None, Ok(page(1..=3, 20))), Completion::Stale));
    assert!(cursor.has_more(&a));
}

#[test]
fn failed_fetch_releases_the_guard() {
    let c1 = ConversationId::from("c1");
    let mut cursor = PaginationCursor::new(20);
    let ticket = expect_fetch(cursor.begin_latest(&c1));

    let completion = cursor.complete(&ticket, Some(&c1), Err(anyhow!("connection reset")));
    assert!(matches!(completion, Completion::Failed(_)));
    assert!(!cursor.is_loading(&c1));
    assert!(cursor.has_more(&c1));
}

#[test]
fn empty_or_pending_only_store_falls_back_to_latest_page() {
    let c1 = ConversationId::from("c1");
    let mut cursor = PaginationCursor::new(20);
    let mut store = MessageStore::new();
    store.append(Message::optimistic(
        c1.clone(),
        UserId::from("u1"),
        "draft",
        Utc::now(),
    ));

    let ticket = expect_fetch(cursor.begin_older(&c1, Some(&store)));
    assert_eq!(ticket.kind, FetchKind::Latest);
    assert_eq!(ticket.query, PageQuery::latest(20));
}

#[test]
fn page_limit_is_clamped() {
    assert_eq!(PaginationCursor::new(0).page_limit(), 1);
    assert_eq!(PaginationCursor::new(1_000).page_limit(), 100);
}
