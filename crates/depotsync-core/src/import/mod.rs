//! Import-session event synchronization.
//!
//! Turns observed state of the bank-import wizard into a best-effort stream
//! of events sent to a remote session. Each watched value fires once per
//! change; every emission funnels through one deduplicated send. A missing
//! session id skips the event silently, since these signals must never
//! interrupt the import itself.
//!
//! The synchronizer is single-owner: drive it through `&mut self`, or hand
//! it to a task with [`ImportSessionSync::spawn`] and feed it
//! [`WizardSignal`]s. The spawned task keeps at most one session creation
//! in flight and never stops reading signals while it waits for one.

mod dedup;
mod event;
mod session;
mod transport;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::SyncConfig;
use crate::error::CoreError;

pub use dedup::DedupWindow;
pub use event::{ImportEventType, ImportStep};
pub use session::{Effect, SessionInput, SessionState, Transition};
pub use transport::{SessionTransport, SocketSessions};

/// How the synchronizer obtains its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMode {
    /// Create sessions on demand and recreate them on restart.
    Foreground,
    /// Attach to a session created elsewhere.
    Background { session_id: String },
}

/// Which id an event is addressed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdContext {
    /// The current session.
    Live,
    /// The last session id ever obtained, kept across a restart.
    Recovery,
}

/// One change observed in the wizard.
///
/// Serialized externally tagged in snake case, e.g. `{"step": "BANK"}`,
/// `{"auth_failure": "wrong PIN"}` or `"restart"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardSignal {
    Step(ImportStep),
    ManualImport(bool),
    AuthFailure(Option<String>),
    ImportSucceeded(bool),
    ImportError(Option<Value>),
    ImportStarted(Option<Value>),
    ReplayId(Option<String>),
    Restart,
}

/// Last seen value of each watched piece of wizard state.
#[derive(Debug, Default)]
struct Watched {
    step: Option<ImportStep>,
    manual_import: bool,
    auth_failure: Option<String>,
    import_succeeded: bool,
    import_error: Option<Value>,
    import_started: Option<Value>,
    replay_id: Option<String>,
}

/// Store `value` in `slot`, returning whether it changed.
fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

// ── ImportSessionSync ────────────────────────────────────────────────

pub struct ImportSessionSync<T> {
    transport: Arc<T>,
    state: SessionState,
    recovery_id: Option<String>,
    dedup: DedupWindow,
    watched: Watched,
    create_retry: Duration,
}

impl<T: SessionTransport> ImportSessionSync<T> {
    pub fn new(transport: T, mode: SessionMode, config: &SyncConfig) -> Self {
        let (state, recovery_id) = match mode {
            SessionMode::Foreground => (SessionState::NoSession, None),
            SessionMode::Background { session_id } => (
                SessionState::BackgroundActive {
                    session_id: session_id.clone(),
                },
                Some(session_id),
            ),
        };
        Self {
            transport: Arc::new(transport),
            state,
            recovery_id,
            dedup: DedupWindow::new(config.dedup_window),
            watched: Watched::default(),
            create_retry: config.create_retry,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Id used for normal sends.
    pub fn session_id(&self) -> Option<&str> {
        self.state.live_id()
    }

    /// Id used for the close event of a restart.
    pub fn recovery_id(&self) -> Option<&str> {
        self.recovery_id.as_deref()
    }

    pub fn replay_id(&self) -> Option<&str> {
        self.watched.replay_id.as_deref()
    }

    fn advance(&mut self, input: SessionInput) -> Option<Effect> {
        let state = std::mem::take(&mut self.state);
        let Transition { next, effect } = state.apply(input);
        self.state = next;
        effect
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Create a session unless one is live, in background mode, or a
    /// restart is still draining. Returns the live id afterwards.
    pub async fn ensure_session(&mut self) -> Result<Option<String>, CoreError> {
        if self.request_session() {
            let session_id = self.transport.create_session().await?;
            self.session_created(session_id);
        }
        Ok(self.session_id().map(str::to_owned))
    }

    /// Close the current session and open a fresh one.
    ///
    /// The close event is addressed with the recovery id because the live
    /// id is cleared in the same step. Ignored in background mode.
    pub async fn restart(&mut self) -> Result<Option<String>, CoreError> {
        if self.close_for_restart() {
            self.ensure_session().await
        } else {
            Ok(self.session_id().map(str::to_owned))
        }
    }

    /// Whether a session has to be created now.
    fn request_session(&mut self) -> bool {
        matches!(self.advance(SessionInput::Ensure), Some(Effect::CreateSession))
    }

    fn session_created(&mut self, session_id: String) {
        info!(session_id = %session_id, "import session created");
        self.recovery_id = Some(session_id.clone());
        self.advance(SessionInput::Created(session_id));

        // A replay id seen before the session existed could not be sent.
        if let Some(replay_id) = self.watched.replay_id.clone() {
            self.emit_replay_id(&replay_id);
        }
    }

    /// Send the close event of a restart and forget the wizard's progress.
    /// Returns `false` in background mode, where nothing happens.
    fn close_for_restart(&mut self) -> bool {
        let Some(Effect::EmitClose { recovery_id }) = self.advance(SessionInput::Restart) else {
            debug!("restart ignored for background session");
            return false;
        };
        if recovery_id.is_some() {
            self.recovery_id = recovery_id;
        }
        self.emit(ImportEventType::CloseImportModal, Map::new(), IdContext::Recovery);
        self.advance(SessionInput::Cleared);

        // The replay recording spans restarts and is associated again with
        // the next session.
        let replay_id = self.watched.replay_id.take();
        self.watched = Watched {
            replay_id,
            ..Watched::default()
        };
        true
    }

    // ── Observers ────────────────────────────────────────────────────

    /// Report the wizard's current step.
    ///
    /// Moving to a step with a lower ordinal than the previous one emits
    /// `GO_BACK`; otherwise the step's own event, if it has one.
    pub fn observe_step(&mut self, step: ImportStep) -> bool {
        let previous = self.watched.step.replace(step);
        if previous == Some(step) {
            return false;
        }
        let event = match previous {
            Some(prev) if step.ordinal() < prev.ordinal() => Some(ImportEventType::GoBack),
            _ => step.event(),
        };
        match event {
            Some(event) => self.emit(event, Map::new(), IdContext::Live),
            None => false,
        }
    }

    pub fn observe_manual_import(&mut self, selected: bool) -> bool {
        if !replace_if_changed(&mut self.watched.manual_import, selected) || !selected {
            return false;
        }
        self.emit(ImportEventType::ManualImport, Map::new(), IdContext::Live)
    }

    pub fn observe_auth_failure(&mut self, message: Option<String>) -> bool {
        if !replace_if_changed(&mut self.watched.auth_failure, message.clone()) {
            return false;
        }
        let Some(message) = message else {
            return false;
        };
        let mut data = Map::new();
        data.insert("message".into(), Value::String(message));
        self.emit(ImportEventType::AuthenticationFailed, data, IdContext::Live)
    }

    pub fn observe_import_success(&mut self, succeeded: bool) -> bool {
        if !replace_if_changed(&mut self.watched.import_succeeded, succeeded) || !succeeded {
            return false;
        }
        self.emit(ImportEventType::SuccessfulImport, Map::new(), IdContext::Live)
    }

    pub fn observe_import_error(&mut self, error: Option<Value>) -> bool {
        if !replace_if_changed(&mut self.watched.import_error, error.clone()) {
            return false;
        }
        let Some(error) = error else {
            return false;
        };
        let mut data = Map::new();
        data.insert("error".into(), error);
        self.emit(ImportEventType::SecapiImportError, data, IdContext::Live)
    }

    /// Report that an import began. Object fields (bank, branch, interface
    /// metadata) are merged into the event data as-is.
    pub fn observe_import_started(&mut self, details: Option<Value>) -> bool {
        if !replace_if_changed(&mut self.watched.import_started, details.clone()) {
            return false;
        }
        let data = match details {
            None => return false,
            Some(Value::Object(fields)) => fields,
            Some(other) => {
                let mut data = Map::new();
                data.insert("import".into(), other);
                data
            }
        };
        self.emit(ImportEventType::ImportStarted, data, IdContext::Live)
    }

    /// Associate a session replay recording with the import session.
    pub fn set_replay_id(&mut self, replay_id: Option<String>) -> bool {
        if !replace_if_changed(&mut self.watched.replay_id, replay_id.clone()) {
            return false;
        }
        match replay_id {
            Some(replay_id) => self.emit_replay_id(&replay_id),
            None => false,
        }
    }

    fn emit_replay_id(&mut self, replay_id: &str) -> bool {
        let mut data = Map::new();
        data.insert("replay_id".into(), Value::String(replay_id.to_owned()));
        self.emit(ImportEventType::AssociateReplayId, data, IdContext::Live)
    }

    // ── Emission ─────────────────────────────────────────────────────

    /// Build and send one event frame. Returns whether it was transmitted.
    fn emit(
        &mut self,
        event: ImportEventType,
        payload: Map<String, Value>,
        context: IdContext,
    ) -> bool {
        let session_id = match context {
            IdContext::Live => self.session_id(),
            IdContext::Recovery => self.recovery_id(),
        };
        let Some(session_id) = session_id.map(str::to_owned) else {
            debug!(event = event.as_str(), ?context, "no session id, event skipped");
            return false;
        };

        let mut data = Map::with_capacity(payload.len() + 1);
        data.insert("session_id".into(), Value::String(session_id));
        data.extend(payload);
        let frame = json!({ "type": event.as_str(), "data": data });

        if !self.dedup.admit(&frame.to_string(), Instant::now()) {
            trace!(event = event.as_str(), "duplicate event suppressed");
            return false;
        }

        match self.transport.emit(&frame) {
            Ok(()) => {
                debug!(event = event.as_str(), "import event sent");
                true
            }
            Err(e) => {
                warn!(event = event.as_str(), error = %e, "import event not sent");
                false
            }
        }
    }

    // ── Signals ──────────────────────────────────────────────────────

    /// Apply one signal. Only `Restart` creates a session here; every other
    /// signal is observed against whatever session is live.
    pub async fn apply(&mut self, signal: WizardSignal) -> Result<(), CoreError> {
        if signal == WizardSignal::Restart {
            self.restart().await?;
        } else {
            self.observe(signal);
        }
        Ok(())
    }

    /// Feed one non-restart signal to its observer.
    fn observe(&mut self, signal: WizardSignal) -> bool {
        match signal {
            WizardSignal::Step(step) => self.observe_step(step),
            WizardSignal::ManualImport(selected) => self.observe_manual_import(selected),
            WizardSignal::AuthFailure(message) => self.observe_auth_failure(message),
            WizardSignal::ImportSucceeded(ok) => self.observe_import_success(ok),
            WizardSignal::ImportError(error) => self.observe_import_error(error),
            WizardSignal::ImportStarted(details) => self.observe_import_started(details),
            WizardSignal::ReplayId(id) => self.set_replay_id(id),
            WizardSignal::Restart => false,
        }
    }
}

impl<T: SessionTransport + 'static> ImportSessionSync<T> {
    /// Run the synchronizer as a task until `cancel` fires or every
    /// [`SyncHandle`] sender is dropped.
    pub fn spawn(self, cancel: CancellationToken) -> SyncHandle {
        let (tx, rx) = mpsc::channel::<WizardSignal>(SIGNAL_BUFFER);
        let actor = SyncActor {
            sync: self,
            creating: None,
            retry_at: None,
            deferred: VecDeque::new(),
        };
        let task = tokio::spawn(actor.run(rx, cancel));
        SyncHandle { tx, task }
    }
}

const SIGNAL_BUFFER: usize = 64;
const DEFERRED_LIMIT: usize = 256;

// ── Actor ────────────────────────────────────────────────────────────

type Creation = JoinHandle<Result<String, CoreError>>;

/// Task state of a spawned synchronizer.
///
/// Signals that arrive while a session is being created wait in `deferred`
/// so they are addressed to it. After a failed creation the next attempt
/// waits for `create_retry`; until then signals are observed without a
/// session and skipped.
struct SyncActor<T> {
    sync: ImportSessionSync<T>,
    creating: Option<Creation>,
    retry_at: Option<Instant>,
    deferred: VecDeque<WizardSignal>,
}

impl<T: SessionTransport + 'static> SyncActor<T> {
    async fn run(mut self, mut rx: mpsc::Receiver<WizardSignal>, cancel: CancellationToken) {
        self.start_creation();
        let mut open = true;

        // Deferred signals only exist while a creation is in flight.
        while open || self.creating.is_some() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    if let Some(creation) = self.creating.take() {
                        creation.abort();
                    }
                    break;
                }
                result = creation_result(&mut self.creating) => self.finish_creation(result),
                signal = rx.recv(), if open => match signal {
                    Some(signal) => self.handle(signal),
                    None => open = false,
                },
            }
        }
        debug!("import synchronizer stopped");
    }

    fn start_creation(&mut self) {
        if self.creating.is_some() || self.retry_at.is_some_and(|at| Instant::now() < at) {
            return;
        }
        if self.sync.request_session() {
            let transport = Arc::clone(&self.sync.transport);
            let creation = tokio::spawn(async move { transport.create_session().await });
            self.creating = Some(creation);
        }
    }

    fn finish_creation(&mut self, result: Result<Result<String, CoreError>, JoinError>) {
        self.creating = None;
        match result
            .map_err(|e| CoreError::Internal(format!("session creation task failed: {e}")))
            .and_then(|created| created)
        {
            Ok(session_id) => {
                self.retry_at = None;
                self.sync.session_created(session_id);
            }
            Err(e) => {
                warn!(error = %e, "could not create import session");
                self.retry_at = Some(Instant::now() + self.sync.create_retry);
            }
        }

        while self.creating.is_none() {
            let Some(signal) = self.deferred.pop_front() else {
                break;
            };
            self.handle(signal);
        }
    }

    fn handle(&mut self, signal: WizardSignal) {
        if self.creating.is_some() {
            self.defer(signal);
            return;
        }

        if signal == WizardSignal::Restart {
            if self.sync.close_for_restart() {
                self.retry_at = None;
                self.start_creation();
            }
            return;
        }

        self.start_creation();
        if self.creating.is_some() {
            self.defer(signal);
        } else {
            self.sync.observe(signal);
        }
    }

    fn defer(&mut self, signal: WizardSignal) {
        if self.deferred.len() == DEFERRED_LIMIT {
            if let Some(dropped) = self.deferred.pop_front() {
                debug!(signal = ?dropped, "deferred signal dropped");
            }
        }
        self.deferred.push_back(signal);
    }
}

/// Resolves with the in-flight creation, or never when there is none.
async fn creation_result(
    creating: &mut Option<Creation>,
) -> Result<Result<String, CoreError>, JoinError> {
    match creating {
        Some(creation) => creation.await,
        None => std::future::pending().await,
    }
}

/// Sender side of a spawned synchronizer.
pub struct SyncHandle {
    tx: mpsc::Sender<WizardSignal>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Queue one signal. Waits only while the channel is full, which the
    /// task drains without waiting on the backend.
    pub async fn signal(&self, signal: WizardSignal) -> Result<(), CoreError> {
        self.tx
            .send(signal)
            .await
            .map_err(|_| CoreError::Internal("import synchronizer has stopped".into()))
    }

    /// Stop accepting signals and wait for queued ones to be processed.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "import synchronizer task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::future::BoxFuture;
    use pretty_assertions::assert_eq;

    use super::*;

    /// Records frames and hands out `S1`, `S2`, ... as session ids, one per
    /// creation attempt. Attempts take `delay` and the first `failures` of
    /// them fail.
    #[derive(Clone, Default)]
    struct Recorder {
        frames: Arc<Mutex<Vec<Value>>>,
        created: Arc<Mutex<u32>>,
        failures: Arc<Mutex<u32>>,
        delay: Duration,
    }

    impl Recorder {
        fn frames(&self) -> Vec<Value> {
            self.frames.lock().unwrap().clone()
        }

        fn types(&self) -> Vec<String> {
            self.frames()
                .iter()
                .map(|f| f["type"].as_str().unwrap().to_owned())
                .collect()
        }
    }

    impl SessionTransport for Recorder {
        fn create_session(&self) -> BoxFuture<'_, Result<String, CoreError>> {
            Box::pin(async move {
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                let n = {
                    let mut n = self.created.lock().unwrap();
                    *n += 1;
                    *n
                };
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(CoreError::Disconnected);
                }
                Ok(format!("S{n}"))
            })
        }

        fn emit(&self, frame: &Value) -> Result<(), CoreError> {
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }
    }

    async fn foreground() -> (ImportSessionSync<Recorder>, Recorder) {
        let recorder = Recorder::default();
        let mut sync = ImportSessionSync::new(
            recorder.clone(),
            SessionMode::Foreground,
            &SyncConfig::default(),
        );
        sync.ensure_session().await.unwrap();
        (sync, recorder)
    }

    #[tokio::test(start_paused = true)]
    async fn backward_step_emits_go_back() {
        let (mut sync, recorder) = foreground().await;

        sync.observe_step(ImportStep::Bank);
        sync.observe_step(ImportStep::BankBranch);
        sync.observe_step(ImportStep::Bank);

        assert_eq!(recorder.types(), vec!["SELECT_COUNTRY", "SELECT_BANK", "GO_BACK"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unmapped_step_emits_nothing() {
        let (mut sync, recorder) = foreground().await;

        assert!(sync.observe_step(ImportStep::Authenticate));
        assert!(!sync.observe_step(ImportStep::Importing));
        assert!(!sync.observe_step(ImportStep::Finished));
        assert_eq!(recorder.types(), vec!["SELECT_INTERFACE"]);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_carry_session_id_and_payload() {
        let (mut sync, recorder) = foreground().await;

        sync.observe_auth_failure(Some("wrong PIN".into()));

        assert_eq!(
            recorder.frames(),
            vec![json!({
                "type": "AUTHENTICATION_FAILED",
                "data": { "session_id": "S1", "message": "wrong PIN" }
            })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn identical_events_inside_window_are_sent_once() {
        let (mut sync, recorder) = foreground().await;

        assert!(sync.observe_manual_import(true));
        sync.observe_manual_import(false);
        assert!(!sync.observe_manual_import(true));
        assert_eq!(recorder.frames().len(), 1);

        tokio::time::advance(Duration::from_millis(300)).await;
        sync.observe_manual_import(false);
        assert!(sync.observe_manual_import(true));
        assert_eq!(recorder.frames().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn observers_fire_once_per_change() {
        let (mut sync, recorder) = foreground().await;

        sync.observe_import_error(Some(json!({ "code": 17 })));
        sync.observe_import_error(Some(json!({ "code": 17 })));
        tokio::time::advance(Duration::from_secs(1)).await;
        sync.observe_import_error(Some(json!({ "code": 17 })));

        assert_eq!(recorder.types(), vec!["SECAPI_IMPORT_ERROR"]);
        assert_eq!(recorder.frames()[0]["data"]["error"]["code"], 17);
    }

    #[tokio::test(start_paused = true)]
    async fn import_started_merges_metadata() {
        let (mut sync, recorder) = foreground().await;

        sync.observe_import_started(Some(json!({
            "bank": { "name": "Sparkasse" },
            "interface": "FINTS",
        })));

        let frame = &recorder.frames()[0];
        assert_eq!(frame["type"], "IMPORT_STARTED");
        assert_eq!(frame["data"]["session_id"], "S1");
        assert_eq!(frame["data"]["bank"]["name"], "Sparkasse");
        assert_eq!(frame["data"]["interface"], "FINTS");
    }

    #[tokio::test(start_paused = true)]
    async fn restart_closes_with_recovery_id_then_creates_new_session() {
        let (mut sync, recorder) = foreground().await;
        assert_eq!(sync.session_id(), Some("S1"));

        let new_id = sync.restart().await.unwrap();

        assert_eq!(new_id.as_deref(), Some("S2"));
        assert_eq!(sync.recovery_id(), Some("S2"));
        let frames = recorder.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "CLOSE_IMPORT_MODAL");
        assert_eq!(frames[0]["data"]["session_id"], "S1");
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resets_step_history() {
        let (mut sync, recorder) = foreground().await;

        sync.observe_step(ImportStep::Interface);
        sync.restart().await.unwrap();
        sync.observe_step(ImportStep::Country);

        assert_eq!(
            recorder.types(),
            vec!["SELECT_BANK_BRANCH", "CLOSE_IMPORT_MODAL", "CONTINUE_INTRO"]
        );
        assert_eq!(recorder.frames()[2]["data"]["session_id"], "S2");
    }

    #[tokio::test(start_paused = true)]
    async fn restart_associates_replay_id_with_new_session() {
        let (mut sync, recorder) = foreground().await;

        sync.set_replay_id(Some("rp-1".into()));
        sync.restart().await.unwrap();

        assert_eq!(
            recorder.frames(),
            vec![
                json!({
                    "type": "ASSOCIATE_REPLAY_ID",
                    "data": { "session_id": "S1", "replay_id": "rp-1" }
                }),
                json!({ "type": "CLOSE_IMPORT_MODAL", "data": { "session_id": "S1" } }),
                json!({
                    "type": "ASSOCIATE_REPLAY_ID",
                    "data": { "session_id": "S2", "replay_id": "rp-1" }
                }),
            ]
        );
        assert_eq!(sync.replay_id(), Some("rp-1"));
        assert!(!sync.set_replay_id(Some("rp-1".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn events_without_session_are_skipped() {
        let recorder = Recorder::default();
        let mut sync = ImportSessionSync::new(
            recorder.clone(),
            SessionMode::Foreground,
            &SyncConfig::default(),
        );

        assert!(!sync.observe_step(ImportStep::Bank));
        assert!(recorder.frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn background_mode_never_creates_or_restarts() {
        let recorder = Recorder::default();
        let mut sync = ImportSessionSync::new(
            recorder.clone(),
            SessionMode::Background {
                session_id: "BG".into(),
            },
            &SyncConfig::default(),
        );

        assert_eq!(sync.ensure_session().await.unwrap().as_deref(), Some("BG"));
        assert_eq!(sync.restart().await.unwrap().as_deref(), Some("BG"));
        sync.observe_import_success(true);

        assert_eq!(*recorder.created.lock().unwrap(), 0);
        assert_eq!(recorder.types(), vec!["SUCCESSFUL_IMPORT"]);
        assert_eq!(recorder.frames()[0]["data"]["session_id"], "BG");
    }

    #[tokio::test(start_paused = true)]
    async fn replay_id_seen_before_session_is_sent_after_creation() {
        let recorder = Recorder::default();
        let mut sync = ImportSessionSync::new(
            recorder.clone(),
            SessionMode::Foreground,
            &SyncConfig::default(),
        );

        assert!(!sync.set_replay_id(Some("rp-1".into())));
        sync.ensure_session().await.unwrap();

        assert_eq!(
            recorder.frames(),
            vec![json!({
                "type": "ASSOCIATE_REPLAY_ID",
                "data": { "session_id": "S1", "replay_id": "rp-1" }
            })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sync_processes_signals_in_order() {
        let recorder = Recorder::default();
        let sync = ImportSessionSync::new(
            recorder.clone(),
            SessionMode::Foreground,
            &SyncConfig::default(),
        );
        let handle = sync.spawn(CancellationToken::new());

        handle.signal(WizardSignal::Step(ImportStep::Country)).await.unwrap();
        handle.signal(WizardSignal::Step(ImportStep::Bank)).await.unwrap();
        handle.signal(WizardSignal::Restart).await.unwrap();
        handle.signal(WizardSignal::ImportSucceeded(true)).await.unwrap();
        handle.shutdown().await;

        assert_eq!(
            recorder.types(),
            vec!["CONTINUE_INTRO", "SELECT_COUNTRY", "CLOSE_IMPORT_MODAL", "SUCCESSFUL_IMPORT"]
        );
        assert_eq!(recorder.frames()[3]["data"]["session_id"], "S2");
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_creation_does_not_hold_up_signals() {
        let recorder = Recorder {
            failures: Arc::new(Mutex::new(u32::MAX)),
            delay: Duration::from_secs(90),
            ..Recorder::default()
        };
        let sync = ImportSessionSync::new(
            recorder.clone(),
            SessionMode::Foreground,
            &SyncConfig::default(),
        );
        let handle = sync.spawn(CancellationToken::new());
        let start = Instant::now();

        for i in 0..100 {
            handle.signal(WizardSignal::ManualImport(i % 2 == 0)).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        handle.shutdown().await;

        // One attempt for all of them, and every event skipped.
        assert_eq!(*recorder.created.lock().unwrap(), 1);
        assert!(recorder.frames().is_empty());
        assert!(start.elapsed() < Duration::from_secs(91));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_creation_is_retried_after_cooldown() {
        let recorder = Recorder {
            failures: Arc::new(Mutex::new(1)),
            ..Recorder::default()
        };
        let config = SyncConfig {
            create_retry: Duration::from_secs(5),
            ..SyncConfig::default()
        };
        let sync = ImportSessionSync::new(recorder.clone(), SessionMode::Foreground, &config);
        let handle = sync.spawn(CancellationToken::new());

        handle.signal(WizardSignal::ManualImport(true)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.signal(WizardSignal::ImportSucceeded(true)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*recorder.created.lock().unwrap(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.signal(WizardSignal::Step(ImportStep::Country)).await.unwrap();
        handle.shutdown().await;

        assert_eq!(*recorder.created.lock().unwrap(), 2);
        assert_eq!(
            recorder.frames(),
            vec![json!({ "type": "CONTINUE_INTRO", "data": { "session_id": "S2" } })]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_sync_rejects_signals() {
        let sync = ImportSessionSync::new(
            Recorder::default(),
            SessionMode::Foreground,
            &SyncConfig::default(),
        );
        let cancel = CancellationToken::new();
        let handle = sync.spawn(cancel.clone());

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(handle.signal(WizardSignal::ManualImport(true)).await.is_err());
    }

    #[test]
    fn signals_parse_from_json() {
        let signals: Vec<WizardSignal> = serde_json::from_str(
            r#"[{"step": "BANK_BRANCH"}, {"auth_failure": "wrong PIN"}, {"auth_failure": null}, "restart"]"#,
        )
        .unwrap();
        assert_eq!(
            signals,
            vec![
                WizardSignal::Step(ImportStep::BankBranch),
                WizardSignal::AuthFailure(Some("wrong PIN".into())),
                WizardSignal::AuthFailure(None),
                WizardSignal::Restart,
            ]
        );
    }
}
