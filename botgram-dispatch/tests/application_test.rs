//! Integration tests for the per-update dispatch algorithm of
//! [`botgram_dispatch::Application`].
//!
//! Covers: group ordering, first-match-wins within a group, error isolation between
//! groups, the stop-propagation signal (from handlers and from error handlers), the
//! error-handler pipeline, and the per-chat data maps.

mod common;

use async_trait::async_trait;
use botgram_core::Update;
use botgram_dispatch::{
    Application, ApplicationBuilder, CheckResult, Context, ErrorHandler, Handler, HandlerResult,
    Propagation,
};
use common::{message_update, FakeBot, Outcome, ScriptHandler};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn build_app() -> Application {
    ApplicationBuilder::new()
        .bot(Arc::new(FakeBot::idle()))
        .without_updater()
        .build()
        .unwrap()
}

/// Error handler that records its name and follows a scripted outcome.
struct ScriptErrorHandler {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    outcome: Outcome,
    seen_update_ids: Mutex<Vec<Option<i64>>>,
}

impl ScriptErrorHandler {
    fn new(name: &str, log: Arc<Mutex<Vec<String>>>, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log,
            outcome,
            seen_update_ids: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ErrorHandler for ScriptErrorHandler {
    async fn handle_error(&self, update: Option<&Update>, context: &Context) -> HandlerResult {
        assert!(context.error().is_some(), "error context must carry the error");
        self.seen_update_ids
            .lock()
            .unwrap()
            .push(update.map(|u| u.update_id));
        self.log.lock().unwrap().push(self.name.clone());
        match self.outcome {
            Outcome::Continue => Ok(Propagation::Continue),
            Outcome::Stop => Ok(Propagation::Stop),
            Outcome::Fail => Err(anyhow::anyhow!("scripted failure in {}", self.name)),
        }
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// **Test: a matching handler in the only populated group runs exactly once.**
#[tokio::test]
async fn test_matching_handler_invoked_exactly_once() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    app.add_handler(ScriptHandler::new("only", log.clone(), Outcome::Continue), 0);

    app.process_update(message_update(1, 1, 1, "hi")).await;

    assert_eq!(*log.lock().unwrap(), vec!["only"]);
}

/// **Test: first match wins within a group; later groups still run.**
///
/// **Setup:** Group 0 holds handlers a and b (both match), group 1 holds c.
/// **Action:** Process one update.
/// **Expected:** a and c run; b is skipped because a already consumed the update for
/// group 0.
#[tokio::test]
async fn test_first_match_wins_within_group() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    app.add_handler(ScriptHandler::new("a", log.clone(), Outcome::Continue), 0);
    app.add_handler(ScriptHandler::new("b", log.clone(), Outcome::Continue), 0);
    app.add_handler(ScriptHandler::new("c", log.clone(), Outcome::Continue), 1);

    app.process_update(message_update(1, 1, 1, "hi")).await;

    assert_eq!(*log.lock().unwrap(), vec!["a", "c"]);
}

/// **Test: groups run in ascending numeric order, including negative groups.**
#[tokio::test]
async fn test_groups_run_in_ascending_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    app.add_handler(ScriptHandler::new("five", log.clone(), Outcome::Continue), 5);
    app.add_handler(ScriptHandler::new("minus", log.clone(), Outcome::Continue), -1);
    app.add_handler(ScriptHandler::new("zero", log.clone(), Outcome::Continue), 0);

    app.process_update(message_update(1, 1, 1, "hi")).await;

    assert_eq!(*log.lock().unwrap(), vec!["minus", "zero", "five"]);
}

/// **Test: a failing blocking handler in group 1 does not prevent group 2 from running.**
///
/// **Expected:** The error handler fires once with the update id, then group 2 runs.
#[tokio::test]
async fn test_error_is_isolated_from_later_groups() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    let error_handler = ScriptErrorHandler::new("err", log.clone(), Outcome::Continue);
    app.add_error_handler(error_handler.clone());
    app.add_handler(ScriptHandler::new("boom", log.clone(), Outcome::Fail), 1);
    app.add_handler(ScriptHandler::new("after", log.clone(), Outcome::Continue), 2);

    app.process_update(message_update(7, 1, 1, "hi")).await;

    assert_eq!(*log.lock().unwrap(), vec!["boom", "err", "after"]);
    assert_eq!(*error_handler.seen_update_ids.lock().unwrap(), vec![Some(7)]);
}

/// **Test: Propagation::Stop skips all numerically later groups.**
///
/// **Expected:** Handlers in groups up to and including the stopping one ran; the group
/// after it did not.
#[tokio::test]
async fn test_stop_propagation_skips_later_groups() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    app.add_handler(ScriptHandler::new("first", log.clone(), Outcome::Continue), 0);
    app.add_handler(ScriptHandler::new("stopper", log.clone(), Outcome::Stop), 1);
    app.add_handler(ScriptHandler::new("never", log.clone(), Outcome::Continue), 2);

    app.process_update(message_update(1, 1, 1, "hi")).await;

    assert_eq!(*log.lock().unwrap(), vec!["first", "stopper"]);
}

/// **Test: Propagation::Stop from an error handler aborts the remaining error handlers
/// and the remaining groups.**
#[tokio::test]
async fn test_stop_from_error_handler_aborts_pipeline_and_groups() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    app.add_error_handler(ScriptErrorHandler::new("err_stop", log.clone(), Outcome::Stop));
    app.add_error_handler(ScriptErrorHandler::new("err_never", log.clone(), Outcome::Continue));
    app.add_handler(ScriptHandler::new("boom", log.clone(), Outcome::Fail), 0);
    app.add_handler(ScriptHandler::new("never", log.clone(), Outcome::Continue), 1);

    app.process_update(message_update(1, 1, 1, "hi")).await;

    assert_eq!(*log.lock().unwrap(), vec!["boom", "err_stop"]);
}

/// **Test: registering the same error handler twice leaves exactly one entry.**
#[tokio::test]
async fn test_duplicate_error_handler_registration_is_noop() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    let error_handler = ScriptErrorHandler::new("err", log.clone(), Outcome::Continue);
    app.add_error_handler(error_handler.clone());
    app.add_error_handler(error_handler.clone());
    app.add_handler(ScriptHandler::new("boom", log.clone(), Outcome::Fail), 0);

    app.process_update(message_update(1, 1, 1, "hi")).await;

    assert_eq!(*log.lock().unwrap(), vec!["boom", "err"]);
}

/// **Test: a failing error handler is logged, not re-entered; later error handlers and
/// later groups still run.**
#[tokio::test]
async fn test_failing_error_handler_does_not_recurse() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    app.add_error_handler(ScriptErrorHandler::new("err_fail", log.clone(), Outcome::Fail));
    app.add_error_handler(ScriptErrorHandler::new("err_ok", log.clone(), Outcome::Continue));
    app.add_handler(ScriptHandler::new("boom", log.clone(), Outcome::Fail), 0);
    app.add_handler(ScriptHandler::new("after", log.clone(), Outcome::Continue), 1);

    app.process_update(message_update(1, 1, 1, "hi")).await;

    assert_eq!(*log.lock().unwrap(), vec!["boom", "err_fail", "err_ok", "after"]);
}

/// **Test: with no error handlers registered, a failing handler is only logged and the
/// remaining groups run.**
#[tokio::test]
async fn test_no_error_handlers_does_not_crash_dispatch() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    app.add_handler(ScriptHandler::new("boom", log.clone(), Outcome::Fail), 0);
    app.add_handler(ScriptHandler::new("after", log.clone(), Outcome::Continue), 1);

    app.process_update(message_update(1, 1, 1, "hi")).await;

    assert_eq!(*log.lock().unwrap(), vec!["boom", "after"]);
}

/// **Test: Propagation::Stop from a non-blocking handler is a warning, not an abort.**
///
/// **Expected:** The later group runs even though the non-blocking handler asked to stop;
/// the dispatcher had already moved on.
#[tokio::test]
async fn test_stop_from_non_blocking_handler_does_not_abort() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    let mut stopper = ScriptHandler::new("nb_stopper", log.clone(), Outcome::Stop);
    Arc::get_mut(&mut stopper).unwrap().block = Some(false);
    app.add_handler(stopper, 0);
    app.add_handler(ScriptHandler::new("after", log.clone(), Outcome::Continue), 1);

    app.process_update(message_update(1, 1, 1, "hi")).await;

    let log_for_wait = log.clone();
    wait_for(move || {
        let entries = log_for_wait.lock().unwrap();
        entries.contains(&"after".to_string()) && entries.contains(&"nb_stopper".to_string())
    })
    .await;
}

/// **Test: errors from non-blocking handlers reach the error pipeline asynchronously.**
#[tokio::test]
async fn test_non_blocking_handler_error_reaches_pipeline() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    let error_handler = ScriptErrorHandler::new("err", log.clone(), Outcome::Continue);
    app.add_error_handler(error_handler.clone());
    let mut boom = ScriptHandler::new("nb_boom", log.clone(), Outcome::Fail);
    Arc::get_mut(&mut boom).unwrap().block = Some(false);
    app.add_handler(boom, 0);

    app.process_update(message_update(3, 1, 1, "hi")).await;

    let log_for_wait = log.clone();
    wait_for(move || log_for_wait.lock().unwrap().contains(&"err".to_string())).await;
    assert_eq!(*error_handler.seen_update_ids.lock().unwrap(), vec![Some(3)]);
}

/// **Test: create_task errors are routed through the error pipeline, tagged with the
/// given update.**
#[tokio::test]
async fn test_create_task_error_routed_to_pipeline() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    let error_handler = ScriptErrorHandler::new("err", log.clone(), Outcome::Continue);
    app.add_error_handler(error_handler.clone());

    let update = Arc::new(message_update(11, 1, 1, "hi"));
    app.create_task(
        async { Err(anyhow::anyhow!("task boom")) },
        Some(update.clone()),
    );

    let log_for_wait = log.clone();
    wait_for(move || log_for_wait.lock().unwrap().contains(&"err".to_string())).await;
    assert_eq!(*error_handler.seen_update_ids.lock().unwrap(), vec![Some(11)]);
}

/// Handler that increments a counter in the per-chat data map and records the value it
/// observed, keyed by chat id.
struct ChatCounterHandler {
    observed: Arc<Mutex<Vec<(i64, i64)>>>,
}

#[async_trait]
impl Handler for ChatCounterHandler {
    fn check(&self, _update: &Update) -> Option<CheckResult> {
        Some(CheckResult::Match)
    }

    async fn handle(
        &self,
        _update: &Update,
        context: &Context,
        _check_result: CheckResult,
    ) -> HandlerResult {
        let count = context
            .with_chat_data(|data| {
                let count = data
                    .get("count")
                    .and_then(|value| value.as_i64())
                    .unwrap_or(0)
                    + 1;
                data.insert("count".to_string(), serde_json::json!(count));
                count
            })
            .expect("message updates always have a chat");
        self.observed
            .lock()
            .unwrap()
            .push((context.chat_id().unwrap(), count));
        Ok(Propagation::Continue)
    }
}

/// **Test: per-chat data is shared across updates of the same chat and isolated between
/// chats.**
#[tokio::test]
async fn test_chat_data_shared_per_chat_and_isolated() {
    let observed = Arc::new(Mutex::new(Vec::new()));
    let app = build_app();
    app.add_handler(
        Arc::new(ChatCounterHandler {
            observed: observed.clone(),
        }),
        0,
    );

    app.process_update(message_update(1, 1, 10, "a")).await;
    app.process_update(message_update(2, 1, 10, "b")).await;
    app.process_update(message_update(3, 2, 10, "c")).await;

    assert_eq!(*observed.lock().unwrap(), vec![(1, 1), (1, 2), (2, 1)]);
}

/// **Test: handle receives the exact value check returned, including an empty Args list.**
struct EmptyArgsHandler {
    received: Arc<Mutex<Option<CheckResult>>>,
}

#[async_trait]
impl Handler for EmptyArgsHandler {
    fn check(&self, _update: &Update) -> Option<CheckResult> {
        // Empty containers still count as a match.
        Some(CheckResult::Args(Vec::new()))
    }

    async fn handle(
        &self,
        _update: &Update,
        _context: &Context,
        check_result: CheckResult,
    ) -> HandlerResult {
        *self.received.lock().unwrap() = Some(check_result);
        Ok(Propagation::Continue)
    }
}

#[tokio::test]
async fn test_empty_check_result_counts_as_match() {
    let received = Arc::new(Mutex::new(None));
    let app = build_app();
    app.add_handler(
        Arc::new(EmptyArgsHandler {
            received: received.clone(),
        }),
        0,
    );

    app.process_update(message_update(1, 1, 1, "hi")).await;

    assert_eq!(
        *received.lock().unwrap(),
        Some(CheckResult::Args(Vec::new()))
    );
}
