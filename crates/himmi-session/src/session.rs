//! Turn orchestration
//!
//! A turn validates its input, appends the user message and an assistant
//! placeholder, sends the conversation to the backend and folds each
//! decoded event into the session until the response is finalized.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use himmi_client::{ChatRequest, CompletionPayload, Preference, PreferenceRecord, PricingInfo, ProtocolEvent, UsageRecord};
use himmi_telemetry::SessionMetrics;
use secrecy::{ExposeSecret, SecretString};

use crate::background::{BalanceTracker, PreferenceRecorder};
use crate::backend::CompletionBackend;
use crate::context::{SessionContext, SessionState};
use crate::error::{ShadowError, TurnError};
use crate::shadow::{ShadowComparison, ShadowPhase};

/// Prefix every gateway key starts with
pub const DEFAULT_KEY_PREFIX: &str = "sk-or-v1-";

/// One user prompt and the settings it is sent with
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub text: String,
    /// Model slug; empty means no model was selected
    pub model: String,
    pub pricing: PricingInfo,
    pub api_key: SecretString,
    pub shadow_mode: bool,
}

/// Result of a successful turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Final content of the assistant message
    pub content: String,
    pub cached: bool,
    /// Sum of the usage events received, if any
    pub usage: Option<UsageRecord>,
    /// Cost added to the session by this turn
    pub cost: f64,
    /// Comparison published by a shadow-mode response
    pub comparison: Option<ShadowComparison>,
}

#[derive(Debug, Default)]
struct Progress {
    content: String,
    cached: bool,
    usage: Option<UsageRecord>,
    cost: f64,
    first_token_seen: bool,
    comparison: Option<ShadowComparison>,
}

impl Progress {
    fn add_usage(&mut self, record: UsageRecord, cost: f64, cached: bool) {
        self.usage = Some(self.usage.map_or(record, |total| {
            UsageRecord::new(
                total.prompt_tokens.saturating_add(record.prompt_tokens),
                total.completion_tokens.saturating_add(record.completion_tokens),
            )
        }));
        self.cost += cost;
        self.cached = cached;
    }
}

/// Releases the session's in-flight slot however the turn ends
struct ReleaseOnDrop<'a> {
    ctx: &'a SessionContext,
    epoch: u64,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.ctx.release(self.epoch);
    }
}

/// Runs turns against a completion backend
pub struct CompletionSession {
    backend: Arc<dyn CompletionBackend>,
    key_prefix: String,
    preferences: Option<PreferenceRecorder>,
    balance: Option<BalanceTracker>,
    metrics: SessionMetrics,
}

impl CompletionSession {
    pub fn new(backend: impl CompletionBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            preferences: None,
            balance: None,
            metrics: SessionMetrics::new(),
        }
    }

    /// Require API keys to start with `prefix`
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Upload shadow comparison votes through `recorder`
    #[must_use]
    pub fn with_preference_recorder(mut self, recorder: PreferenceRecorder) -> Self {
        self.preferences = Some(recorder);
        self
    }

    /// Refresh the user's balance after every successful turn
    #[must_use]
    pub fn with_balance_tracker(mut self, tracker: BalanceTracker) -> Self {
        self.balance = Some(tracker);
        self
    }

    pub const fn balance(&self) -> Option<&BalanceTracker> {
        self.balance.as_ref()
    }

    /// Check a request without touching any session
    pub fn validate(&self, request: &TurnRequest) -> Result<(), TurnError> {
        if request.text.trim().is_empty() {
            return Err(TurnError::Validation("message must not be empty".to_owned()));
        }

        if request.model.trim().is_empty() {
            return Err(TurnError::Validation("select a model before sending".to_owned()));
        }

        let key = request.api_key.expose_secret().trim();
        if key.is_empty() {
            return Err(TurnError::Validation(
                "an API key is required; generate one from the dashboard".to_owned(),
            ));
        }

        if !key.starts_with(&self.key_prefix) {
            return Err(TurnError::Validation(format!(
                "invalid API key format: keys must start with '{}'; provider keys are not accepted",
                self.key_prefix
            )));
        }

        Ok(())
    }

    /// Run one turn to completion
    ///
    /// # Errors
    ///
    /// `Validation` and `SessionBusy` are returned before the session is
    /// touched. Any other error leaves the assistant message finalized with
    /// an error marker after the content received so far, and does not
    /// count the request.
    #[tracing::instrument(skip_all, fields(model = %request.model, shadow_mode = request.shadow_mode))]
    pub async fn submit_turn(&self, ctx: &SessionContext, request: TurnRequest) -> Result<TurnOutcome, TurnError> {
        let started = Instant::now();
        let result = self.run_turn(ctx, &request, started).await;

        let outcome = match &result {
            Ok(turn) if turn.cached => "cached",
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        self.metrics.record_turn(&request.model, outcome, started);

        result
    }

    async fn run_turn(
        &self,
        ctx: &SessionContext,
        request: &TurnRequest,
        started: Instant,
    ) -> Result<TurnOutcome, TurnError> {
        if ctx.is_busy() {
            return Err(TurnError::SessionBusy);
        }
        self.validate(request)?;

        let shadow_model = request.shadow_mode.then_some(request.model.as_str());
        let admission = ctx.admit(&request.text, shadow_model)?;
        let epoch = admission.epoch;
        let _release = ReleaseOnDrop { ctx, epoch };

        let chat_request = ChatRequest::new(request.model.clone(), admission.history, request.shadow_mode);

        let streamed = tokio::select! {
            biased;
            () = admission.token.cancelled() => Err(TurnError::Cancelled),
            result = self.stream(ctx, epoch, &chat_request, request, started) => result,
        };

        let result = streamed.and_then(|progress| finish(ctx, epoch, progress));

        match result {
            Ok(outcome) => {
                tracing::info!(
                    cached = outcome.cached,
                    cost = outcome.cost,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "turn completed"
                );

                if let Some(tracker) = &self.balance {
                    drop(tracker.refresh());
                }

                Ok(outcome)
            }
            Err(e) => {
                let marker = e.marker();
                ctx.apply(epoch, |state| {
                    state.conversation.fail(&marker);
                    state.shadow.abandon();
                });
                tracing::warn!(error = %e, "turn failed");

                Err(e)
            }
        }
    }

    async fn stream(
        &self,
        ctx: &SessionContext,
        epoch: u64,
        chat_request: &ChatRequest,
        request: &TurnRequest,
        started: Instant,
    ) -> Result<Progress, TurnError> {
        let mut events = self.backend.complete(chat_request, &request.api_key).await?;
        let mut progress = Progress::default();

        while let Some(event) = events.next().await {
            match event? {
                ProtocolEvent::Delta(text) => {
                    if !progress.first_token_seen {
                        progress.first_token_seen = true;
                        self.metrics.record_first_token(&request.model, started);
                    }

                    live(ctx.apply(epoch, |state| state.conversation.append_delta(&text)))?;
                    progress.content.push_str(&text);
                }
                ProtocolEvent::Usage(record) => {
                    let (cost, cached) =
                        live(ctx.apply(epoch, |state| account(state, &record, &request.pricing)))?;
                    self.record_usage(&request.model, &record, cached);
                    progress.add_usage(record, cost, cached);
                }
                ProtocolEvent::Fallback(payload) => {
                    let applied = live(ctx.apply(epoch, |state| apply_fallback(state, &payload, request)))?;

                    if let Some((record, cost, cached)) = applied.usage {
                        self.record_usage(&request.model, &record, cached);
                        progress.add_usage(record, cost, cached);
                    }
                    progress.content = payload.content().to_owned();
                    progress.comparison = applied.comparison;
                }
                ProtocolEvent::Done => break,
            }
        }

        Ok(progress)
    }

    fn record_usage(&self, model: &str, record: &UsageRecord, cached: bool) {
        self.metrics
            .record_usage(model, record.prompt_tokens, record.completion_tokens);
        if cached {
            self.metrics.record_cache_hit(model);
        }
    }

    /// Record the user's preference for the comparison awaiting a vote
    ///
    /// The upload happens in the background; its outcome never affects the
    /// returned record.
    ///
    /// # Errors
    ///
    /// Returns `ShadowError::NotComparing` if no comparison is awaiting a
    /// vote, including one that was already voted on.
    pub fn submit_vote(&self, ctx: &SessionContext, choice: Preference) -> Result<PreferenceRecord, ShadowError> {
        let record = ctx.write(|state| state.shadow.submit_vote(choice))?;

        tracing::info!(
            primary_model = %record.primary_model,
            shadow_model = %record.shadow_model,
            preference = %choice,
            "comparison resolved"
        );

        match &self.preferences {
            Some(recorder) => recorder.record(record.clone()),
            None => tracing::debug!("no preference recorder configured, vote kept locally"),
        }

        ctx.write(|state| state.shadow.acknowledge());

        Ok(record)
    }
}

impl std::fmt::Debug for CompletionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSession")
            .field("key_prefix", &self.key_prefix)
            .field("preferences", &self.preferences.is_some())
            .field("balance", &self.balance)
            .finish_non_exhaustive()
    }
}

fn live<T>(applied: Option<T>) -> Result<T, TurnError> {
    applied.ok_or(TurnError::Cancelled)
}

/// Fold a usage record into the session and tag the streaming message
fn account(state: &mut SessionState, record: &UsageRecord, pricing: &PricingInfo) -> (f64, bool) {
    let cost = state.usage.apply(record, pricing);
    let cached = state.cache.observe(record);
    state.conversation.set_cached(cached);

    (cost, cached)
}

struct AppliedFallback {
    usage: Option<(UsageRecord, f64, bool)>,
    comparison: Option<ShadowComparison>,
}

fn apply_fallback(state: &mut SessionState, payload: &CompletionPayload, request: &TurnRequest) -> AppliedFallback {
    let usage = payload.usage.map(|record| {
        let (cost, cached) = account(state, &record, &request.pricing);
        (record, cost, cached)
    });

    let content = payload.content();
    state.conversation.replace_content(content);
    state.conversation.finalize();

    let comparison = payload.shadow().and_then(|(shadow_model, shadow_response)| {
        if state.shadow.phase() != ShadowPhase::AwaitingResponse {
            state.shadow.begin_request(&request.text, &request.model);
        }

        match state.shadow.present(content, shadow_model, shadow_response) {
            Ok(comparison) => Some(comparison.clone()),
            Err(e) => {
                tracing::warn!(error = %e, "could not publish shadow comparison");
                None
            }
        }
    });

    AppliedFallback { usage, comparison }
}

/// Finalize a turn whose event sequence ended normally
fn finish(ctx: &SessionContext, epoch: u64, progress: Progress) -> Result<TurnOutcome, TurnError> {
    live(ctx.apply(epoch, |state| {
        state.conversation.finalize();
        if state.shadow.abandon() {
            tracing::debug!("response carried no shadow answer");
        }
        state.usage.record_request();
    }))?;

    Ok(TurnOutcome {
        content: progress.content,
        cached: progress.cached,
        usage: progress.usage,
        cost: progress.cost,
        comparison: progress.comparison,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::stream;
    use himmi_client::{ChatMessage, Choice, ChoiceMessage, ClientError, EventStream, Role};
    use tokio::sync::mpsc;

    use super::*;
    use crate::usage::SessionStats;

    const KEY: &str = "sk-or-v1-test";

    type Item = Result<ProtocolEvent, ClientError>;

    enum Reply {
        Events(Vec<Item>),
        Channel(mpsc::UnboundedReceiver<Item>),
        Fail(ClientError),
    }

    #[derive(Clone, Default)]
    struct ScriptedBackend {
        replies: Arc<Mutex<VecDeque<Reply>>>,
        requests: Arc<Mutex<Vec<ChatRequest>>>,
    }

    impl ScriptedBackend {
        fn push(&self, reply: Reply) -> &Self {
            self.replies.lock().unwrap().push_back(reply);
            self
        }

        fn channel(&self) -> mpsc::UnboundedSender<Item> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.push(Reply::Channel(rx));
            tx
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, request: &ChatRequest, _api_key: &SecretString) -> Result<EventStream, ClientError> {
            self.requests.lock().unwrap().push(request.clone());

            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(Reply::Events(events)) => Ok(stream::iter(events).boxed()),
                Some(Reply::Channel(rx)) => Ok(stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                })
                .boxed()),
                Some(Reply::Fail(error)) => Err(error),
                None => Err(ClientError::Stream("no scripted reply".to_owned())),
            }
        }
    }

    fn session(backend: &ScriptedBackend) -> CompletionSession {
        CompletionSession::new(backend.clone())
    }

    fn request(text: &str) -> TurnRequest {
        TurnRequest {
            text: text.to_owned(),
            model: "gpt-4o".to_owned(),
            pricing: PricingInfo::new(2.5, 10.0),
            api_key: SecretString::from(KEY),
            shadow_mode: false,
        }
    }

    fn delta(text: &str) -> Item {
        Ok(ProtocolEvent::Delta(text.to_owned()))
    }

    fn usage(prompt: u64, completion: u64) -> Item {
        Ok(ProtocolEvent::Usage(UsageRecord::new(prompt, completion)))
    }

    fn payload(content: &str) -> CompletionPayload {
        CompletionPayload {
            choices: vec![Choice {
                message: ChoiceMessage {
                    content: Some(content.to_owned()),
                },
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    async fn wait_until(ctx: &SessionContext, condition: impl Fn(&SessionContext) -> bool) {
        let mut revisions = ctx.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition(ctx) {
                revisions.changed().await.unwrap();
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn zero_usage_stream_is_cached() {
        let backend = ScriptedBackend::default();
        backend.push(Reply::Events(vec![
            delta("Hi"),
            delta(" there"),
            usage(0, 0),
            Ok(ProtocolEvent::Done),
        ]));
        let ctx = SessionContext::new();

        let outcome = session(&backend).submit_turn(&ctx, request("hello")).await.unwrap();

        assert_eq!(outcome.content, "Hi there");
        assert!(outcome.cached);
        assert!(outcome.cost.abs() < f64::EPSILON);

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].content, "hello");
        assert_eq!(snapshot[1].content, "Hi there");
        assert!(snapshot[1].finalized);
        assert!(snapshot[1].cached);

        let stats = ctx.stats();
        assert_eq!(stats.request_count, 1);
        assert!(stats.cumulative_cost.abs() < f64::EPSILON);
        assert_eq!(ctx.cache_hits(), 1);
        assert!(!ctx.is_busy());
    }

    #[tokio::test]
    async fn usage_is_priced_and_accumulated() {
        let backend = ScriptedBackend::default();
        backend
            .push(Reply::Events(vec![delta("a"), usage(1_000, 500), Ok(ProtocolEvent::Done)]))
            .push(Reply::Events(vec![delta("b"), usage(1_000, 500)]));
        let ctx = SessionContext::new();
        let session = session(&backend);

        let first = session.submit_turn(&ctx, request("one")).await.unwrap();
        assert!(!first.cached);
        assert!((first.cost - 0.0075).abs() < 1e-12);

        session.submit_turn(&ctx, request("two")).await.unwrap();

        let stats = ctx.stats();
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.cumulative_completion_tokens, 1_000);
        assert!((stats.cumulative_cost - 0.015).abs() < 1e-12);
        assert_eq!(ctx.cache_hits(), 0);
    }

    #[tokio::test]
    async fn history_is_sent_with_each_turn() {
        let backend = ScriptedBackend::default();
        backend
            .push(Reply::Events(vec![delta("first answer")]))
            .push(Reply::Events(vec![delta("second answer")]));
        let ctx = SessionContext::new();
        let session = session(&backend);

        session.submit_turn(&ctx, request("first")).await.unwrap();
        session.submit_turn(&ctx, request("second")).await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests[0].messages, vec![ChatMessage::user("first")]);
        assert_eq!(
            requests[1].messages,
            vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("first answer"),
                ChatMessage::user("second"),
            ]
        );
        assert!(requests[1].stream);
    }

    #[tokio::test]
    async fn gateway_rejection_finalizes_with_marker() {
        let backend = ScriptedBackend::default();
        backend.push(Reply::Fail(ClientError::Gateway {
            status: 401,
            message: "invalid key".to_owned(),
        }));
        let ctx = SessionContext::new();

        let err = session(&backend).submit_turn(&ctx, request("hello")).await.unwrap_err();

        assert!(matches!(err, TurnError::Gateway { status: 401, ref message } if message == "invalid key"));

        let snapshot = ctx.snapshot();
        let message = &snapshot[1];
        assert!(message.finalized);
        assert!(message.failed);
        assert!(message.content.contains("invalid key"));
        assert!(message.content.contains("check your API key"));
        assert_eq!(ctx.stats().request_count, 0);
        assert!(!ctx.is_busy());
    }

    #[tokio::test]
    async fn transport_failure_keeps_partial_content() {
        let backend = ScriptedBackend::default();
        backend.push(Reply::Events(vec![
            delta("partial"),
            Err(ClientError::Stream("upstream overloaded".to_owned())),
            delta("never applied"),
        ]));
        let ctx = SessionContext::new();

        let err = session(&backend).submit_turn(&ctx, request("hello")).await.unwrap_err();
        assert!(matches!(err, TurnError::Transport(_)));

        let content = &ctx.snapshot()[1].content;
        assert!(content.starts_with("partial\n\nError: "));
        assert!(content.contains("upstream overloaded"));
        assert!(!content.contains("never applied"));
        assert_eq!(ctx.stats().request_count, 0);
    }

    #[tokio::test]
    async fn invalid_requests_leave_the_session_untouched() {
        let backend = ScriptedBackend::default();
        let ctx = SessionContext::new();
        let session = session(&backend);

        let empty = request("   ");

        let mut no_model = request("hi");
        no_model.model = String::new();

        let mut no_key = request("hi");
        no_key.api_key = SecretString::from("");

        let mut provider_key = request("hi");
        provider_key.api_key = SecretString::from("sk-proj-abc123");

        for bad in [empty, no_model, no_key, provider_key] {
            let err = session.submit_turn(&ctx, bad).await.unwrap_err();
            assert!(matches!(err, TurnError::Validation(_)), "{err:?}");
        }

        assert!(ctx.snapshot().is_empty());
        assert!(backend.requests().is_empty());
        assert_eq!(ctx.stats(), SessionStats::default());
    }

    #[tokio::test]
    async fn custom_key_prefix_is_enforced() {
        let backend = ScriptedBackend::default();
        let session = session(&backend).with_key_prefix("hm-");

        assert!(session.validate(&request("hi")).is_err());

        let mut ok = request("hi");
        ok.api_key = SecretString::from("  hm-123  ");
        assert!(session.validate(&ok).is_ok());
    }

    #[tokio::test]
    async fn concurrent_turn_is_rejected_as_busy() {
        let backend = ScriptedBackend::default();
        let tx = backend.channel();
        let ctx = SessionContext::new();
        let session = Arc::new(session(&backend));

        let first = tokio::spawn({
            let session = Arc::clone(&session);
            let ctx = ctx.clone();
            async move { session.submit_turn(&ctx, request("one")).await }
        });
        wait_until(&ctx, SessionContext::is_busy).await;

        let err = session.submit_turn(&ctx, request("two")).await.unwrap_err();
        assert!(matches!(err, TurnError::SessionBusy));
        assert_eq!(ctx.snapshot().len(), 2);

        tx.send(delta("done")).unwrap();
        drop(tx);

        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome.content, "done");
        assert!(!ctx.is_busy());
    }

    #[tokio::test]
    async fn cancel_finalizes_with_marker() {
        let backend = ScriptedBackend::default();
        let tx = backend.channel();
        let ctx = SessionContext::new();
        let session = Arc::new(session(&backend));

        let turn = tokio::spawn({
            let session = Arc::clone(&session);
            let ctx = ctx.clone();
            async move { session.submit_turn(&ctx, request("hello")).await }
        });

        tx.send(delta("par")).unwrap();
        wait_until(&ctx, |ctx| ctx.snapshot().get(1).is_some_and(|m| m.content == "par")).await;

        assert!(ctx.cancel());
        let err = turn.await.unwrap().unwrap_err();
        assert!(matches!(err, TurnError::Cancelled));

        let message = &ctx.snapshot()[1];
        assert!(message.finalized);
        assert_eq!(message.content, "par\n\nError: request cancelled");
        assert_eq!(ctx.stats().request_count, 0);
        assert!(!ctx.is_busy());
    }

    #[tokio::test]
    async fn clear_discards_late_events() {
        let backend = ScriptedBackend::default();
        let tx = backend.channel();
        let ctx = SessionContext::new();
        let session = Arc::new(session(&backend));

        let turn = tokio::spawn({
            let session = Arc::clone(&session);
            let ctx = ctx.clone();
            async move { session.submit_turn(&ctx, request("hello")).await }
        });

        tx.send(delta("a")).unwrap();
        wait_until(&ctx, |ctx| ctx.snapshot().get(1).is_some_and(|m| m.content == "a")).await;

        ctx.clear();
        let _ = tx.send(delta("late"));
        let _ = tx.send(usage(100, 100));

        let err = turn.await.unwrap().unwrap_err();
        assert!(matches!(err, TurnError::Cancelled));
        assert!(ctx.snapshot().is_empty());
        assert_eq!(ctx.stats(), SessionStats::default());
        assert!(!ctx.is_busy());
    }

    #[tokio::test]
    async fn dropped_turn_releases_the_session() {
        let backend = ScriptedBackend::default();
        let _tx = backend.channel();
        let ctx = SessionContext::new();
        let session = session(&backend);

        let turn = session.submit_turn(&ctx, request("hello"));
        let timed_out = tokio::time::timeout(Duration::from_millis(50), turn).await;
        assert!(timed_out.is_err());

        assert!(!ctx.is_busy());
        let message = &ctx.snapshot()[1];
        assert!(message.finalized);
        assert_eq!(message.content, "Error: request cancelled");
    }

    #[tokio::test]
    async fn fallback_payload_finalizes_in_one_step() {
        let backend = ScriptedBackend::default();
        let mut body = payload("cached answer");
        body.usage = Some(UsageRecord::new(0, 0));
        backend.push(Reply::Events(vec![
            Ok(ProtocolEvent::Fallback(body)),
            Ok(ProtocolEvent::Done),
        ]));
        let ctx = SessionContext::new();

        let outcome = session(&backend).submit_turn(&ctx, request("hello")).await.unwrap();

        assert_eq!(outcome.content, "cached answer");
        assert!(outcome.cached);
        assert!(outcome.comparison.is_none());
        let message = &ctx.snapshot()[1];
        assert_eq!(message.content, "cached answer");
        assert!(message.cached);
        assert_eq!(ctx.stats().request_count, 1);
    }

    #[tokio::test]
    async fn shadow_comparison_is_published_and_voted_once() {
        let backend = ScriptedBackend::default();
        let mut body = payload("A");
        body.shadow_model = Some("llama-3-8b".to_owned());
        body.shadow_response = Some("B".to_owned());
        backend.push(Reply::Events(vec![
            Ok(ProtocolEvent::Fallback(body)),
            Ok(ProtocolEvent::Done),
        ]));

        let (recorder, mut uploads) = PreferenceRecorder::detached();
        let session = session(&backend).with_preference_recorder(recorder);
        let ctx = SessionContext::new();

        let mut turn = request("What is 2+2?");
        turn.shadow_mode = true;
        let outcome = session.submit_turn(&ctx, turn).await.unwrap();

        assert!(!backend.requests()[0].stream);
        let comparison = outcome.comparison.unwrap();
        assert_eq!(comparison.primary_response, "A");
        assert_eq!(comparison.shadow_model, "llama-3-8b");
        assert_eq!(comparison.shadow_response, "B");
        assert_eq!(ctx.shadow_phase(), ShadowPhase::Comparing);
        assert_eq!(ctx.comparison(), Some(comparison));

        let record = session.submit_vote(&ctx, Preference::Shadow).unwrap();
        assert_eq!(record.user_preference, Preference::Shadow);
        assert_eq!(record.prompt, "What is 2+2?");
        assert_eq!(ctx.shadow_phase(), ShadowPhase::Idle);

        assert_eq!(uploads.recv().await.unwrap(), record);
        assert_eq!(
            session.submit_vote(&ctx, Preference::Primary),
            Err(ShadowError::NotComparing)
        );
        assert!(uploads.try_recv().is_err());
    }

    #[tokio::test]
    async fn streamed_shadow_request_without_comparison_returns_to_idle() {
        let backend = ScriptedBackend::default();
        backend.push(Reply::Events(vec![delta("just primary")]));
        let ctx = SessionContext::new();

        let mut turn = request("hi");
        turn.shadow_mode = true;
        let outcome = session(&backend).submit_turn(&ctx, turn).await.unwrap();

        assert!(outcome.comparison.is_none());
        assert_eq!(ctx.shadow_phase(), ShadowPhase::Idle);
        assert_eq!(ctx.snapshot()[1].role, Role::Assistant);
    }
}
