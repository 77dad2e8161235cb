use super::*;

#[test]
fn status_only_moves_forward() {
    let mut s = SupportSession::new("r1", SupportStatus::Pending);
    assert!(s.advance(SupportStatus::Active));
    assert!(!s.advance(SupportStatus::Active));
    assert!(!s.advance(SupportStatus::Pending));
    assert!(s.advance(SupportStatus::Closed));
    assert!(!s.advance(SupportStatus::Resolved));
    assert_eq!(s.status(), SupportStatus::Closed);
}

#[test]
fn status_may_skip_steps() {
    let mut s = SupportSession::new("r1", SupportStatus::Pending);
    assert!(s.advance(SupportStatus::Resolved));
    assert_eq!(s.status(), SupportStatus::Resolved);
}

#[test]
fn routing_follows_status() {
    let mut s = SupportSession::new("r1", SupportStatus::Pending);
    assert!(s.routes_messages());
    s.advance(SupportStatus::Active);
    assert!(s.routes_messages());
    assert!(s.is_open());
    s.advance(SupportStatus::Resolved);
    assert!(!s.routes_messages());
    assert!(!s.is_open());
    s.advance(SupportStatus::Closed);
    assert!(!s.is_open());
}

#[test]
fn reconnect_attempts_are_bounded() {
    let mut s = SupportSession::new("r1", SupportStatus::Active);
    assert_eq!(s.channel(), ChannelState::Connecting);

    assert_eq!(s.schedule_reconnect(2), Some(1));
    assert_eq!(s.channel(), ChannelState::Reconnecting { attempt: 1 });
    assert_eq!(s.schedule_reconnect(2), Some(2));
    assert!(!s.is_detached());
    assert_eq!(s.schedule_reconnect(2), None);
    assert_eq!(s.channel(), ChannelState::Closed);
    assert!(s.is_detached());
}

#[test]
fn reopening_resets_the_attempt_count() {
    let mut s = SupportSession::new("r1", SupportStatus::Active);
    assert_eq!(s.schedule_reconnect(2), Some(1));
    assert_eq!(s.schedule_reconnect(2), Some(2));

    s.channel_opened();
    assert_eq!(s.channel(), ChannelState::Open);
    assert_eq!(s.schedule_reconnect(2), Some(1));
}

#[test]
fn finished_requests_do_not_reconnect() {
    let mut s = SupportSession::new("r1", SupportStatus::Active);
    s.advance(SupportStatus::Resolved);
    assert_eq!(s.schedule_reconnect(5), None);
    assert_eq!(s.channel(), ChannelState::Closed);
}

#[test]
fn exhausted_reconnects_detach_the_request() {
    let mut s = SupportSession::new("r1", SupportStatus::Active);
    assert_eq!(s.schedule_reconnect(1), Some(1));
    assert_eq!(s.schedule_reconnect(1), None);

    assert!(s.is_detached());
    assert_eq!(s.status(), SupportStatus::Active);
    assert!(!s.routes_messages());
    assert!(!s.wants_channel());
    assert!(!s.is_open());
}

#[test]
fn finished_requests_are_not_detached() {
    let mut s = SupportSession::new("r1", SupportStatus::Active);
    s.advance(SupportStatus::Closed);
    assert_eq!(s.schedule_reconnect(0), None);
    assert!(!s.is_detached());
}
