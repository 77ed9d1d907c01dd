mod common;

use chatdrive_engine::locator::{Disambiguation, LocatorResolver, LocatorSpec, ResolutionError};
use chatdrive_engine::protocol::{Descriptor, Element, MatchMode};
use chatdrive_engine::view::{DocumentView, ViewError};
use common::{FakeView, button, cancel_after, token};
use std::time::Duration;
use tokio::time::Instant;

fn send_spec() -> LocatorSpec {
    LocatorSpec::new("send-button")
        .with(Descriptor::test_id("send-button"))
        .with(Descriptor::aria_label("button", "Send prompt", MatchMode::Exact))
        .with(Descriptor::aria_label("button", "Send message", MatchMode::Exact))
}

fn resolver(budget_ms: u64) -> LocatorResolver {
    LocatorResolver {
        budget: Duration::from_millis(budget_ms),
        ..LocatorResolver::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_nth_descriptor_reports_index() {
    let mut view = FakeView::new().with(
        Descriptor::aria_label("button", "Send message", MatchMode::Exact),
        vec![button(7, "Send message")],
    );

    let resolved = resolver(0).resolve(&mut view, &send_spec(), &token()).await.unwrap();
    assert_eq!(resolved.descriptor_index, 2);
    assert_eq!(resolved.element.id, 7);
    assert_eq!(resolved.candidates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_all_miss_enumerates_every_descriptor() {
    let mut view = FakeView::new();
    let start = Instant::now();

    let err = resolver(1000)
        .resolve(&mut view, &send_spec(), &token())
        .await
        .unwrap_err();

    match err {
        ResolutionError::NotFound(failure) => {
            assert_eq!(failure.target.as_str(), "send-button");
            assert_eq!(failure.attempts.len(), 3);
            for (i, attempt) in failure.attempts.iter().enumerate() {
                assert_eq!(attempt.index, i);
                assert_eq!(attempt.matches, 0);
                assert!(attempt.error.is_none());
            }
            // Polls at 0, 100, 300, 700 and the deadline at 1000.
            assert_eq!(failure.passes, 5);
            assert_eq!(failure.elapsed, Duration::from_millis(1000));
        }
        other => panic!("Expected NotFound, got {:?}", other),
    }
    assert_eq!(start.elapsed(), Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_zero_budget_is_single_pass() {
    let mut view = FakeView::new();
    let counters = view.counters();
    let err = resolver(0).resolve(&mut view, &send_spec(), &token()).await.unwrap_err();
    match err {
        ResolutionError::NotFound(failure) => assert_eq!(failure.passes, 1),
        other => panic!("Expected NotFound, got {:?}", other),
    }
    assert_eq!(common::Counters::get(&counters.queries), 3);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_descriptor_is_recorded_and_skipped() {
    let spec = LocatorSpec::new("send-button")
        .with(Descriptor::css("button:has(svg)"))
        .with(Descriptor::test_id("send-button"));
    let mut view = FakeView::new()
        .invalid(Descriptor::css("button:has(svg)"))
        .with(Descriptor::test_id("send-button"), vec![button(3, "Send")]);

    let resolved = resolver(0).resolve(&mut view, &spec, &token()).await.unwrap();
    assert_eq!(resolved.descriptor_index, 1);

    let mut empty = FakeView::new().invalid(Descriptor::css("button:has(svg)"));
    match resolver(0).resolve(&mut empty, &spec, &token()).await.unwrap_err() {
        ResolutionError::NotFound(failure) => {
            assert!(failure.attempts[0].error.as_deref().unwrap().contains("Invalid selector"));
            assert!(failure.attempts[1].error.is_none());
        }
        other => panic!("Expected NotFound, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_ambiguity_falls_through_then_reports() {
    let broad = Descriptor::css("button");
    let narrow = Descriptor::test_id("send-button");
    let spec = LocatorSpec::new("send-button").with(broad.clone()).with(narrow.clone());

    let mut view = FakeView::new()
        .with(broad.clone(), vec![button(1, "A"), button(2, "B")])
        .with(narrow.clone(), vec![button(2, "B")]);
    let resolved = resolver(0).resolve(&mut view, &spec, &token()).await.unwrap();
    assert_eq!(resolved.descriptor_index, 1);
    assert_eq!(resolved.element.id, 2);

    let mut only_broad = FakeView::new().with(broad.clone(), vec![button(1, "A"), button(2, "B")]);
    match resolver(0).resolve(&mut only_broad, &spec, &token()).await.unwrap_err() {
        ResolutionError::Ambiguous {
            descriptor,
            candidates,
            ..
        } => {
            assert_eq!(descriptor, broad);
            assert_eq!(candidates, 2);
        }
        other => panic!("Expected Ambiguous, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_policy_reduces_multiple_matches() {
    let spec = LocatorSpec::new("assistant-message")
        .with(Descriptor::css("div.markdown"))
        .policy(Disambiguation::LastInDocument);
    let mut view = FakeView::new().with(
        Descriptor::css("div.markdown"),
        vec![
            Element::new(1, "div").with_text("first"),
            Element::new(2, "div").with_text("second"),
        ],
    );
    let resolved = resolver(0).resolve(&mut view, &spec, &token()).await.unwrap();
    assert_eq!(resolved.element.text, "second");
    assert_eq!(resolved.candidates, 2);
}

#[tokio::test(start_paused = true)]
async fn test_target_appearing_late_is_found_by_polling() {
    let send = Descriptor::test_id("send-button");
    let spec = LocatorSpec::new("send-button").with(send.clone());
    let trigger = Descriptor::css("#prompt-textarea");
    let mut view = FakeView::new()
        .with(trigger.clone(), vec![Element::new(1, "div")])
        .trigger_on(1)
        .frame(Duration::from_millis(250), vec![(send.clone(), vec![button(5, "Send")])]);

    view.click(1).await.unwrap();

    let start = Instant::now();
    let resolved = resolver(2000).resolve(&mut view, &spec, &token()).await.unwrap();
    assert_eq!(resolved.element.id, 5);
    // Passes at 0, 100 and 300ms.
    assert_eq!(start.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_aborts_immediately() {
    let trigger = Descriptor::css("#prompt-textarea");
    let mut view = FakeView::new()
        .with(trigger, vec![Element::new(1, "div")])
        .trigger_on(1)
        .unreachable_after(Duration::ZERO);

    view.click(1).await.unwrap();

    let start = Instant::now();
    let err = resolver(5000).resolve(&mut view, &send_spec(), &token()).await.unwrap_err();
    assert!(matches!(
        err,
        ResolutionError::View(ViewError::ConnectionLost)
    ));
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_polling() {
    let mut view = FakeView::new();
    let counters = view.counters();
    let cancel = cancel_after(Duration::from_millis(50));
    let start = Instant::now();

    let err = resolver(10_000)
        .resolve(&mut view, &send_spec(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::Cancelled), "{:?}", err);
    assert_eq!(start.elapsed(), Duration::from_millis(50));
    // One pass of three descriptors before the first sleep.
    assert_eq!(common::Counters::get(&counters.queries), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_budget_does_not_overflow() {
    let send = Descriptor::test_id("send-button");
    let spec = LocatorSpec::new("send-button").with(send.clone());
    let trigger = Descriptor::css("#prompt-textarea");
    let mut view = FakeView::new()
        .with(trigger, vec![Element::new(1, "div")])
        .trigger_on(1)
        .frame(Duration::from_millis(250), vec![(send, vec![button(5, "Send")])]);
    view.click(1).await.unwrap();

    let resolved = LocatorResolver::default()
        .resolve_within(&mut view, &spec, Duration::MAX, &token())
        .await
        .unwrap();
    assert_eq!(resolved.element.id, 5);
}

#[tokio::test(start_paused = true)]
async fn test_nth_policy_picks_by_position() {
    let edit = Descriptor::aria_label("button", "Edit", MatchMode::Contains);
    let mut view = FakeView::new().with(
        edit.clone(),
        vec![button(30, "Edit message"), button(31, "Edit message")],
    );
    let second = LocatorSpec::new("edit-message-button")
        .with(edit.clone())
        .policy(Disambiguation::Nth { index: 1 });
    let resolved = resolver(0).resolve(&mut view, &second, &token()).await.unwrap();
    assert_eq!(resolved.element.id, 31);

    let third = second.policy(Disambiguation::Nth { index: 2 });
    let err = resolver(0).resolve(&mut view, &third, &token()).await.unwrap_err();
    assert!(matches!(err, ResolutionError::NotFound(_)), "{:?}", err);
}
