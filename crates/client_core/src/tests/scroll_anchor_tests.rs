use chrono::{Duration, TimeZone, Utc};
use shared::domain::{ConversationId, Message, UserId};

use super::*;
use crate::{ordering::OrderingView, store::MessageStore};

const ROW_HEIGHT: f32 = 30.0;
const VIEWPORT: f32 = 300.0;

fn message(n: i64) -> Message {
    Message {
        id: MessageId::new(format!("m_{n}")),
        content: format!("message {n}"),
        sender_id: UserId::from(if n % 2 == 0 { "u1" } else { "u2" }),
        conversation_id: ConversationId::from("c1"),
        created_at: Utc.with_ymd_and_hms(2024, 8, 28, 22, 0, 0).unwrap() + Duration::seconds(n),
        temp_id: None,
    }
}

fn layout(store: &MessageStore) -> ContentLayout {
    let view = OrderingView::project(store, None);
    ContentLayout::measure(view.rows(), |_| ROW_HEIGHT)
}

#[test]
fn prepend_keeps_the_first_visible_message_in_place() {
    let mut store = MessageStore::new();
    for n in 21..=40 {
        store.append(message(n));
    }
    let before_layout = layout(&store);
    assert_eq!(before_layout.extent(), 600.0);

    // Scrolled to the top, which is what triggers loading older history.
    let before = ScrollMetrics::new(0.0, before_layout.extent(), VIEWPORT);
    assert!(before.is_near_top(10.0));
    let anchor_id = MessageId::from("m_21");
    let screen_before = before_layout
        .screen_offset_of(&anchor_id, before.offset)
        .unwrap();

    let added = store.prepend((1..=20).map(message).collect());
    let mutation = StoreMutation::Prepended { added };
    let prepared = PreparedScroll::prepare(&mutation, before);
    assert!(matches!(prepared, PreparedScroll::Anchor(_)));

    let after_layout = layout(&store);
    assert_eq!(after_layout.extent(), 1200.0);
    let offset = prepared.resolve(ScrollMetrics::new(
        before.offset,
        after_layout.extent(),
        VIEWPORT,
    ));

    assert_eq!(offset, 600.0);
    assert_eq!(
        after_layout.screen_offset_of(&anchor_id, offset),
        Some(screen_before)
    );
    assert_eq!(after_layout.first_visible(offset), Some(&anchor_id));
}

#[test]
fn anchor_preserves_a_mid_list_position() {
    let before = ScrollMetrics::new(150.0, 600.0, VIEWPORT);
    let anchor = ScrollAnchor::capture(before);
    assert_eq!(anchor.restore(690.0), 240.0);
}

#[test]
fn appends_stick_to_the_bottom() {
    let before = ScrollMetrics::new(300.0, 600.0, VIEWPORT);
    assert!(before.is_near_bottom(1.0));

    let prepared = PreparedScroll::prepare(&StoreMutation::Appended, before);
    assert_eq!(prepared, PreparedScroll::StickToBottom);
    assert_eq!(prepared.resolve(ScrollMetrics::new(300.0, 630.0, VIEWPORT)), 330.0);

    let loaded = PreparedScroll::prepare(&StoreMutation::Loaded { added: 20 }, before);
    assert_eq!(loaded, PreparedScroll::StickToBottom);
}

#[test]
fn empty_prepend_and_reconcile_keep_the_offset() {
    let before = ScrollMetrics::new(120.0, 600.0, VIEWPORT);
    for mutation in [StoreMutation::Prepended { added: 0 }, StoreMutation::Reconciled] {
        let prepared = PreparedScroll::prepare(&mutation, before);
        assert_eq!(prepared, PreparedScroll::Keep);
        assert_eq!(prepared.resolve(before), 120.0);
    }
}

#[test]
fn short_content_never_scrolls() {
    let metrics = ScrollMetrics::new(0.0, 90.0, VIEWPORT);
    assert_eq!(metrics.max_offset(), 0.0);
    assert_eq!(PreparedScroll::StickToBottom.resolve(metrics), 0.0);
    assert_eq!(PreparedScroll::Keep.resolve(ScrollMetrics::new(50.0, 90.0, VIEWPORT)), 0.0);
}

#[test]
fn layout_lookups_follow_display_order() {
    let mut store = MessageStore::new();
    store.append(message(3));
    store.append(message(1));
    store.append(message(2));
    let layout = layout(&store);

    assert_eq!(layout.top_of(&MessageId::from("m_1")), Some(0.0));
    assert_eq!(layout.top_of(&MessageId::from("m_3")), Some(60.0));
    assert_eq!(layout.top_of(&MessageId::from("missing")), None);
    assert_eq!(layout.first_visible(45.0), Some(&MessageId::from("m_2")));
    assert_eq!(layout.first_visible(500.0), None);
}
