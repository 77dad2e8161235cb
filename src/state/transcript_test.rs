use super::*;
use wire::HistoryFeedback;

fn pairs(t: &Transcript) -> Vec<(Role, String)> {
    t.entries().iter().map(|e| (e.role, e.text.clone())).collect()
}

fn history(items: &[(&str, &str, Option<i64>)]) -> Vec<HistoryEntry> {
    items
        .iter()
        .map(|(message, response, id)| HistoryEntry {
            id: *id,
            message: (*message).to_owned(),
            response: (*response).to_owned(),
            created_at: None,
            context_used: false,
            feedback: None,
        })
        .collect()
}

fn question(id: i64, text: &str, order: i64, active: bool) -> SuggestedQuestion {
    SuggestedQuestion {
        id,
        chatbot_id: 1,
        question_text: text.to_owned(),
        display_order: order,
        is_active: active,
    }
}

// =============================================================
// Messages
// =============================================================

#[test]
fn bot_text_is_rendered_user_text_is_plain() {
    let mut t = Transcript::new();
    let user = t.append_message(Role::User, "**hi** <b>", None);
    let bot = t.append_message(Role::Bot, "**hello**", Some(3));

    assert_eq!(t.entry(user).unwrap().html, "**hi** &lt;b&gt;");
    assert_eq!(t.entry(bot).unwrap().html, "<p><strong>hello</strong></p>\n");
    assert_eq!(t.entry(bot).unwrap().message_id, Some(3));
    assert_eq!(t.entry(user).unwrap().sender, Sender::You);
}

#[test]
fn welcome_is_replaced_in_place() {
    let mut t = Transcript::new();
    t.set_welcome("Hello!");
    t.append_message(Role::User, "q", None);
    t.set_welcome("Hello again!");

    assert_eq!(t.entries().len(), 2);
    assert!(t.entries()[0].is_welcome);
    assert_eq!(t.entries()[0].text, "Hello again!");
}

#[test]
fn replies_follow_their_user_message() {
    let mut t = Transcript::new();
    let first = t.append_message(Role::User, "one", None);
    let second = t.append_message(Role::User, "two", None);

    t.insert_reply_after(first, EntryKind::Normal, "answer one", Some(1));
    t.insert_reply_after(second, EntryKind::Normal, "answer two", Some(2));

    assert_eq!(
        pairs(&t),
        vec![
            (Role::User, "one".to_owned()),
            (Role::Bot, "answer one".to_owned()),
            (Role::User, "two".to_owned()),
            (Role::Bot, "answer two".to_owned()),
        ]
    );
}

#[test]
fn second_reply_to_same_message_goes_after_the_first() {
    let mut t = Transcript::new();
    let user = t.append_message(Role::User, "q", None);
    t.append_message(Role::User, "later", None);
    t.insert_reply_after(user, EntryKind::Normal, "a", None);
    t.insert_reply_after(user, EntryKind::Error, "b", None);

    let texts: Vec<&str> = t.entries().iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["q", "a", "b", "later"]);
}

#[test]
fn reply_to_unknown_entry_appends() {
    let mut t = Transcript::new();
    t.append_message(Role::User, "q", None);
    let id = t.insert_reply_after(999, EntryKind::Normal, "a", None);
    assert_eq!(t.entries().last().unwrap().id, id);
}

#[test]
fn support_messages_are_escaped_and_tagged() {
    let mut t = Transcript::new();
    let id = t.append_support_message(Sender::Agent, "*not markdown*");
    let entry = t.entry(id).unwrap();
    assert_eq!(entry.html, "*not markdown*");
    assert_eq!(entry.sender.label(), "Support Agent");
}

// =============================================================
// Hydration
// =============================================================

#[test]
fn hydrate_matches_live_order_and_is_idempotent() {
    let mut live = Transcript::new();
    live.set_welcome("Welcome");
    for (q, a) in [("q1", "a1"), ("q2", "a2"), ("q3", "a3")] {
        let user = live.append_message(Role::User, q, None);
        live.insert_reply_after(user, EntryKind::Normal, a, None);
    }
    let live_order = pairs(&live);

    let h = history(&[("q1", "a1", Some(1)), ("q2", "a2", Some(2)), ("q3", "a3", Some(3))]);
    live.hydrate(&h, true);
    assert_eq!(pairs(&live), live_order);

    live.hydrate(&h, true);
    assert_eq!(pairs(&live), live_order);
    assert_eq!(live.entries().iter().filter(|e| e.is_welcome).count(), 1);
}

#[test]
fn hydrate_applies_stored_feedback() {
    let mut t = Transcript::new();
    let mut h = history(&[("q", "a", Some(11)), ("q2", "a2", None)]);
    h[0].feedback = Some(HistoryFeedback { kind: FeedbackKind::ThumbsDown });
    t.hydrate(&h, true);

    let reply = &t.entries()[1];
    assert_eq!(reply.feedback, Some(FeedbackKind::ThumbsDown));
    assert!(reply.feedback_enabled);
    assert!(!t.entries()[3].feedback_enabled);
}

#[test]
fn hydrate_without_feedback_capability_keeps_controls_off() {
    let mut t = Transcript::new();
    t.hydrate(&history(&[("q", "a", Some(1))]), false);
    assert!(!t.entries()[1].feedback_enabled);
}

// =============================================================
// Typing indicator
// =============================================================

#[test]
fn typing_show_twice_yields_one_indicator() {
    let mut t = Transcript::new();
    t.show_typing(TypingKey::Request(1));
    let rev = t.revision();
    t.show_typing(TypingKey::Request(1));
    assert!(t.typing_visible());
    assert_eq!(t.revision(), rev);

    t.hide_typing(TypingKey::Request(1));
    assert!(!t.typing_visible());
}

#[test]
fn hide_typing_without_show_is_noop() {
    let mut t = Transcript::new();
    let rev = t.revision();
    t.hide_typing(TypingKey::Agent);
    assert!(!t.typing_visible());
    assert_eq!(t.revision(), rev);
}

#[test]
fn typing_stays_visible_while_any_key_is_held() {
    let mut t = Transcript::new();
    t.show_typing(TypingKey::Request(1));
    t.show_typing(TypingKey::Request(2));
    t.hide_typing(TypingKey::Request(1));
    assert!(t.typing_visible());
    assert!(t.is_typing(TypingKey::Request(2)));
    t.hide_typing(TypingKey::Request(2));
    assert!(!t.typing_visible());
}

// =============================================================
// Feedback
// =============================================================

#[test]
fn feedback_is_optimistic_and_rolls_back() {
    let mut t = Transcript::new();
    t.append_message(Role::Bot, "answer", Some(5));
    assert!(t.select_feedback(5, FeedbackKind::ThumbsUp).is_none());

    assert!(t.attach_feedback(5));
    let up = t.select_feedback(5, FeedbackKind::ThumbsUp).unwrap();
    assert_eq!(up.previous, None);

    let down = t.select_feedback(5, FeedbackKind::ThumbsDown).unwrap();
    assert_eq!(down.previous, Some(FeedbackKind::ThumbsUp));
    assert_eq!(t.entries()[0].feedback, Some(FeedbackKind::ThumbsDown));

    t.rollback_feedback(down);
    assert_eq!(t.entries()[0].feedback, Some(FeedbackKind::ThumbsUp));
}

#[test]
fn stale_rollback_does_not_clobber_newer_choice() {
    let mut t = Transcript::new();
    t.append_message(Role::Bot, "answer", Some(5));
    t.attach_feedback(5);
    let up = t.select_feedback(5, FeedbackKind::ThumbsUp).unwrap();
    t.select_feedback(5, FeedbackKind::ThumbsDown).unwrap();

    t.rollback_feedback(up);
    assert_eq!(t.entries()[0].feedback, Some(FeedbackKind::ThumbsDown));
}

#[test]
fn attach_feedback_to_unknown_message_fails() {
    let mut t = Transcript::new();
    t.append_message(Role::User, "q", None);
    assert!(!t.attach_feedback(1));
}

// =============================================================
// Sources and suggestions
// =============================================================

#[test]
fn sources_are_deduplicated_in_order() {
    let mut t = Transcript::new();
    t.show_sources(&["a".to_owned(), "a".to_owned(), "b".to_owned()]);
    assert_eq!(t.sources(), ["a".to_owned(), "b".to_owned()]);

    t.show_sources(&[]);
    assert!(t.sources().is_empty());
}

#[test]
fn suggestions_hide_after_first_user_message() {
    let mut t = Transcript::new();
    t.set_suggestions(vec![
        question(1, "second", 2, true),
        question(2, "hidden", 0, false),
        question(3, "first", 1, true),
    ]);
    let texts: Vec<&str> = t.visible_suggestions().iter().map(|q| q.question_text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);
    assert_eq!(t.scroll_target(), Some(ScrollTarget::Suggestions));

    t.append_message(Role::User, "typed", None);
    assert!(t.visible_suggestions().is_empty());
    assert!(t.take_suggestion(0).is_none());
}

#[test]
fn taking_a_suggestion_clears_them() {
    let mut t = Transcript::new();
    t.set_suggestions(vec![question(1, "What is this?", 0, true)]);
    assert_eq!(t.take_suggestion(0).as_deref(), Some("What is this?"));
    assert!(t.visible_suggestions().is_empty());
}

// =============================================================
// Scroll tracking
// =============================================================

#[test]
fn scroll_tracks_latest_visible_item() {
    let mut t = Transcript::new();
    assert_eq!(t.scroll_target(), None);

    let user = t.append_message(Role::User, "q", None);
    assert_eq!(t.scroll_target(), Some(ScrollTarget::Entry(user)));

    t.show_typing(TypingKey::Request(1));
    assert_eq!(t.scroll_target(), Some(ScrollTarget::Typing));

    t.hide_typing(TypingKey::Request(1));
    let reply = t.insert_reply_after(user, EntryKind::Normal, "a", None);
    assert_eq!(t.scroll_target(), Some(ScrollTarget::Entry(reply)));
}

#[test]
fn every_mutation_bumps_revision() {
    let mut t = Transcript::new();
    let mut last = t.revision();
    let mut check = |t: &Transcript| {
        assert!(t.revision() > last);
        last = t.revision();
    };
    t.append_message(Role::User, "q", None);
    check(&t);
    t.show_sources(&["s".to_owned()]);
    check(&t);
    t.hide_sources();
    check(&t);
    t.reset();
    check(&t);
}
