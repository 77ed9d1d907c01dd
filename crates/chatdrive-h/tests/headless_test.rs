use chatdrive_engine::Session;
use chatdrive_engine::config::EngineConfig;
use chatdrive_engine::protocol::{Descriptor, MatchMode};
use chatdrive_engine::timeouts::OperationClass;
use chatdrive_engine::view::DocumentView;
use chatdrive_h::{CdpView, ConnectMode};
use serial_test::serial;
use tokio_util::sync::CancellationToken;

/// A minimal chat page: the send button appends a reply after a short delay.
const CHAT_PAGE: &str = r#"<html><head><title>Chat</title></head><body>
<main>
  <textarea id="prompt-textarea" placeholder="Message ChatGPT"></textarea>
  <button data-testid="send-button" onclick="send()">Send</button>
  <div id="log"></div>
</main>
<script>
function send() {
  var box = document.getElementById('prompt-textarea');
  var prompt = box.value;
  box.value = '';
  var stop = document.createElement('button');
  stop.setAttribute('data-testid', 'stop-button');
  stop.textContent = 'Stop';
  document.body.appendChild(stop);
  setTimeout(function () {
    var reply = document.createElement('div');
    reply.setAttribute('data-message-author-role', 'assistant');
    reply.textContent = 'Echo: ' + prompt;
    document.getElementById('log').appendChild(reply);
    stop.remove();
  }, 300);
}
</script>
</body></html>"#;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::INFO)
        .try_init()
        .ok();
}

async fn launch() -> Option<CdpView> {
    match CdpView::open(ConnectMode::Launch { visible: false }, "about:blank").await {
        Ok(view) => Some(view),
        Err(e) => {
            eprintln!("Failed to launch browser (is Chromium installed?): {}", e);
            None
        }
    }
}

fn page_url() -> String {
    format!("data:text/html,{}", CHAT_PAGE.replace('#', "%23"))
}

#[tokio::test]
#[serial]
async fn test_probe_queries_and_acts() {
    init_tracing();
    let Some(mut view) = launch().await else {
        return;
    };

    let nav = view.navigate(&page_url()).await.expect("Navigation failed");
    assert_eq!(nav.title, "Chat");

    let inputs = view
        .query(&Descriptor::placeholder("Message"))
        .await
        .expect("Query failed");
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].tag, "textarea");
    let id = inputs[0].id;

    view.set_text(id, "hello there").await.expect("set_text failed");
    let snapshot = view.inspect(id).await.unwrap().expect("input vanished");
    assert_eq!(snapshot.value.as_deref(), Some("hello there"));

    let buttons = view
        .query(&Descriptor::text(Some("button"), "send", MatchMode::Exact))
        .await
        .unwrap();
    assert_eq!(buttons.len(), 1);
    assert!(buttons[0].visible && buttons[0].enabled);

    let err = view
        .query(&Descriptor::css("button:::nope"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SELECTOR_INVALID");

    assert!(view.is_reachable().await);
    assert!(!view.is_loading().await.unwrap());
    view.close().await.expect("Close failed");
}

#[tokio::test]
#[serial]
async fn test_detached_elements_are_forgotten() {
    init_tracing();
    let Some(mut view) = launch().await else {
        return;
    };
    view.navigate(&page_url()).await.expect("Navigation failed");

    let send = view.query(&Descriptor::test_id("send-button")).await.unwrap();
    view.click(send[0].id).await.expect("click failed");
    let stop = view.query(&Descriptor::test_id("stop-button")).await.unwrap();
    assert_eq!(stop.len(), 1);
    let stop_id = stop[0].id;

    // The page removes the stop button once the reply lands.
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;
    assert!(view.inspect(stop_id).await.unwrap().is_none());

    // Any query drops detached nodes, so the id is no longer known at all.
    view.query(&Descriptor::css("#log")).await.unwrap();
    let err = view.click(stop_id).await.unwrap_err();
    assert_eq!(err.code(), "ELEMENT_NOT_FOUND");
    assert!(err.is_stale());

    view.close().await.expect("Close failed");
}

#[tokio::test]
#[serial]
async fn test_session_ask_round_trip() {
    init_tracing();
    let Some(mut view) = launch().await else {
        return;
    };
    view.navigate(&page_url()).await.expect("Navigation failed");

    let session = Session::new(Box::new(view), EngineConfig::default()).unwrap();
    let outcome = session
        .ask("ping", OperationClass::Interactive, None, &CancellationToken::new())
        .await;
    let answer = outcome.into_result().expect("ask failed");
    assert_eq!(answer.content(), "Echo: ping");
    assert_eq!(
        session.last_response().await.unwrap().as_deref(),
        Some("Echo: ping")
    );

    session.close().await.expect("Close failed");
}
