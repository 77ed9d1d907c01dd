mod common;

use chatdrive_engine::completion::CompletionState;
use chatdrive_engine::executor::{Action, ActionResult};
use chatdrive_engine::protocol::{Descriptor, Element, MatchMode};
use chatdrive_engine::recovery::{OutcomeStatus, RetryPolicy};
use chatdrive_engine::session::{Role, SessionState};
use chatdrive_engine::timeouts::OperationClass;
use chatdrive_engine::{EngineError, Session};
use common::{Counters, FakeView, button, cancel_after, fast_config};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn composer() -> Descriptor {
    Descriptor::css("#prompt-textarea")
}

fn send_message() -> Descriptor {
    Descriptor::aria_label("button", "Send message", MatchMode::Exact)
}

fn stop() -> Descriptor {
    Descriptor::test_id("stop-button")
}

fn assistant() -> Descriptor {
    Descriptor::css("[data-message-author-role=\"assistant\"]")
}

fn reply(id: u32, text: &str) -> Element {
    Element::new(id, "div")
        .with_attr("data-message-author-role", "assistant")
        .with_text(text)
}

/// Composer plus a send button that only the third send descriptor finds.
/// Clicking send starts a short streamed reply.
fn chat_page() -> FakeView {
    FakeView::new()
        .with(composer(), vec![Element::new(1, "div")])
        .with(send_message(), vec![button(2, "Send message")])
        .trigger_on(2)
        .frame(
            Duration::ZERO,
            vec![
                (stop(), vec![button(10, "Stop")]),
                (send_message(), vec![]),
                (assistant(), vec![reply(20, "Hel")]),
            ],
        )
        .frame(
            Duration::from_millis(250),
            vec![
                (stop(), vec![]),
                (assistant(), vec![reply(20, "ChatGPT said:\nHello, world")]),
                (send_message(), vec![button(2, "Send message")]),
            ],
        )
}

fn session(view: FakeView) -> Session {
    Session::new(Box::new(view), fast_config()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_ask_submits_and_waits_for_answer() {
    let session = session(chat_page());

    let outcome = session
        .ask(
            "Say hello",
            OperationClass::Interactive,
            None,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.attempts, 1);
    let answer = outcome.into_result().unwrap();
    assert_eq!(answer.content(), "ChatGPT said:\nHello, world");
    assert_eq!(answer.report.state, CompletionState::Complete);
    assert_eq!(answer.report.polls, 4);
    assert!(!answer.receipt.via_enter);
    assert_eq!(answer.receipt.send.as_ref().unwrap().descriptor_index, 2);
    assert_eq!(answer.receipt.input.element.id, 1);

    assert_eq!(
        session.last_response().await.unwrap().as_deref(),
        Some("Hello, world")
    );
}

#[tokio::test(start_paused = true)]
async fn test_ask_gives_up_when_page_goes_away() {
    let view = chat_page().unreachable_after(Duration::from_millis(150));
    let counters = view.counters();
    let session = session(view).with_retry_policy(Arc::new(RetryPolicy::immediate(2)));

    let outcome = session
        .ask(
            "Say hello",
            OperationClass::Interactive,
            None,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, OutcomeStatus::Exhausted);
    assert_eq!(outcome.attempts, 2);
    assert!(matches!(outcome.last_error, Some(EngineError::Unreachable(_))));
    assert_eq!(Counters::get(&counters.reconnects), 1);
}

#[tokio::test(start_paused = true)]
async fn test_submit_falls_back_to_enter() {
    let view = FakeView::new()
        .with(composer(), vec![Element::new(1, "div")])
        .trigger_on(1)
        .frame(Duration::ZERO, vec![(assistant(), vec![reply(20, "Pong")])]);
    let counters = view.counters();
    let session = session(view);
    let cancel = CancellationToken::new();

    let receipt = session.submit("Ping", &cancel).await.into_result().unwrap();
    assert!(receipt.via_enter);
    assert!(receipt.send.is_none());
    assert_eq!(Counters::get(&counters.keys), 1);
    assert_eq!(Counters::get(&counters.clicks), 0);

    let report = session
        .wait_for_completion(OperationClass::Interactive, None, &cancel)
        .await
        .unwrap();
    assert_eq!(report.content, "Pong");
    assert_eq!(report.polls, 2);
}

#[tokio::test(start_paused = true)]
async fn test_empty_prompt_is_rejected() {
    let view = chat_page();
    let counters = view.counters();
    let session = session(view);

    let outcome = session.submit("   \n", &CancellationToken::new()).await;
    assert_eq!(outcome.status, OutcomeStatus::Fatal);
    assert!(matches!(outcome.last_error, Some(EngineError::InvalidInput(_))));
    assert_eq!(Counters::get(&counters.queries), 0);
}

#[tokio::test(start_paused = true)]
async fn test_login_page_means_session_invalid() {
    let view = FakeView::new().with(
        Descriptor::text(Some("button"), "Log in", MatchMode::Exact),
        vec![button(50, "Log in")],
    );
    let session = session(view);

    assert_eq!(
        session.session_state().await.unwrap(),
        SessionState::LoginRequired
    );
    assert!(!session.is_ready().await);

    let outcome = session.submit("Hello", &CancellationToken::new()).await;
    assert_eq!(outcome.status, OutcomeStatus::Exhausted);
    assert_eq!(outcome.attempts, 1);
    assert!(matches!(outcome.last_error, Some(EngineError::SessionInvalid(_))));
}

#[tokio::test(start_paused = true)]
async fn test_session_state_ready_with_composer() {
    let session = session(chat_page());
    assert_eq!(session.session_state().await.unwrap(), SessionState::Ready);
    assert!(session.is_ready().await);

    let empty = self::session(FakeView::new());
    assert_eq!(empty.session_state().await.unwrap(), SessionState::Unknown);
}

#[tokio::test(start_paused = true)]
async fn test_conversation_roles() {
    let view = FakeView::new().with(
        Descriptor::test_id("conversation-turn"),
        vec![
            Element::new(1, "article")
                .with_attr("data-message-author-role", "user")
                .with_text("You said:\nHi"),
            Element::new(2, "article").with_text("ChatGPT said:\nHello"),
            Element::new(3, "article").with_text("Another question"),
        ],
    );
    let session = session(view);

    let turns = session.conversation().await.unwrap();
    let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    assert_eq!(turns[0].content, "Hi");
    assert_eq!(turns[1].content, "Hello");

    assert!(self::session(FakeView::new()).conversation().await.unwrap().is_empty());
    assert!(self::session(FakeView::new()).last_response().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_new_chat_clicks_control() {
    let view = FakeView::new()
        .with(composer(), vec![Element::new(1, "div")])
        .with(
            Descriptor::test_id("create-new-chat-button"),
            vec![button(5, "New chat")],
        );
    let counters = view.counters();
    let session = session(view);

    let outcome = session.new_chat(&CancellationToken::new()).await;
    assert!(outcome.is_success());
    assert_eq!(Counters::get(&counters.clicks), 1);
    assert_eq!(Counters::get(&counters.navigations), 0);
}

#[tokio::test(start_paused = true)]
async fn test_new_chat_navigates_home_without_control() {
    let view = FakeView::new().with(composer(), vec![Element::new(1, "div")]);
    let counters = view.counters();
    let session = session(view);

    let outcome = session.new_chat(&CancellationToken::new()).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.attempts, 1);
    assert_eq!(Counters::get(&counters.navigations), 1);
}

#[tokio::test(start_paused = true)]
async fn test_attach_file() {
    let view = FakeView::new().with(
        Descriptor::css("input[type=\"file\"]"),
        vec![Element::new(7, "input").with_attr("type", "file").hidden()],
    );
    let session = session(view);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "notes").unwrap();

    let outcome = session
        .attach_file(file.path(), &CancellationToken::new())
        .await;
    assert_eq!(outcome.into_result().unwrap().element.id, 7);

    let missing = session
        .attach_file(std::path::Path::new("/no/such/file.txt"), &CancellationToken::new())
        .await;
    assert_eq!(missing.status, OutcomeStatus::Fatal);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_target_is_invalid_input() {
    let session = session(chat_page());
    let cancel = CancellationToken::new();
    match session.execute("settings-menu", &Action::Click, None, &cancel).await {
        ActionResult::Failed(EngineError::InvalidInput(msg)) => {
            assert!(msg.contains("settings-menu"))
        }
        other => panic!("Expected InvalidInput, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_budget_by_operation_class() {
    let session = session(chat_page());
    let interactive = session.budget(OperationClass::Interactive, None);
    assert_eq!(interactive.ceiling, Duration::from_secs(5 * 60));

    let research = session.budget(OperationClass::ExtendedResearch, None);
    assert_eq!(research.ceiling, Duration::from_secs(6 * 60 * 60));

    let custom = session.budget(OperationClass::Interactive, Some(Duration::from_secs(42)));
    assert_eq!(custom.ceiling, Duration::from_secs(42));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_composer_is_missing() {
    let session = session(FakeView::new());
    let cancel = cancel_after(Duration::from_millis(50));
    let start = Instant::now();

    let outcome = session
        .ask("Say hello", OperationClass::Interactive, None, &cancel)
        .await;

    assert_eq!(outcome.status, OutcomeStatus::Cancelled);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(start.elapsed(), Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_ask_with_unbounded_ceiling() {
    let session = session(chat_page());

    let outcome = session
        .ask(
            "Say hello",
            OperationClass::Interactive,
            Some(Duration::from_secs(u64::MAX)),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(
        outcome.into_result().unwrap().content(),
        "ChatGPT said:\nHello, world"
    );
}

#[tokio::test(start_paused = true)]
async fn test_readiness_check_follows_timing_scale() {
    let mut config = fast_config();
    config.timing_scale = 0.5;
    let session = Session::new(Box::new(FakeView::new()), config).unwrap();
    let start = Instant::now();

    assert!(!session.is_ready().await);
    // The unscaled readiness budget is two seconds.
    assert!(start.elapsed() <= Duration::from_secs(1), "{:?}", start.elapsed());
}
