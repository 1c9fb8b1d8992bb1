// ── Poll loop ──
//
// Owns the session, the two retry timers and the current interval, and
// drives login → poll → classify → reconcile → reschedule. Everything runs
// on one task: timers are deadlines multiplexed with `tokio::select!`, so
// a poll can never overlap another poll or a login.

use std::sync::Arc;
use std::time::Duration;

use meater_api::{ApiResponse, MeaterClient, TransportConfig};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PollerConfig;
use crate::error::CoreError;
use crate::session::Session;
use crate::status::{Action, BACKOFF_SECS, Classification, classify};
use crate::sync::{COOKING_ACTIVE, SyncOutcome, SyncSettings, reconcile};
use crate::tree::{NodeSpec, StateTree, ValueType, WriteOptions};

// ── Adapter-level state paths ────────────────────────────────────────

pub const INFO_CONNECTION: &str = "info.connection";
pub const INFO_USER_ID: &str = "info.user_id";
pub const STATUS: &str = "status";
pub const STATUS_CODE: &str = "status_code";
pub const RAW_DATA: &str = "raw_data";

// ── Timers ───────────────────────────────────────────────────────────

/// The two retry deadlines. Rearming replaces the deadline, which is the
/// cancel-before-rearm rule for free.
#[derive(Debug, Default)]
struct Timers {
    login_at: Option<Instant>,
    poll_at: Option<Instant>,
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ── PollerHandle ─────────────────────────────────────────────────────

/// Cheap, cloneable control surface for a running [`Poller`].
#[derive(Clone)]
pub struct PollerHandle {
    update_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
}

impl PollerHandle {
    /// Ask for an immediate poll. Requests made while one is already
    /// pending are coalesced; returns `false` in that case.
    pub fn request_update(&self) -> bool {
        self.update_tx.try_send(()).is_ok()
    }

    /// Stop the loop. Pending timers are dropped; a request already in
    /// flight completes but does not rearm anything.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// ── Poller ───────────────────────────────────────────────────────────

/// Polling state-reconciliation loop for one cloud account.
pub struct Poller<T: StateTree> {
    client: MeaterClient,
    tree: Arc<T>,
    config: PollerConfig,
    session: Session,
    timers: Timers,
    interval_secs: u64,
    cancel: CancellationToken,
    update_tx: mpsc::Sender<()>,
    update_rx: mpsc::Receiver<()>,
}

impl<T: StateTree> Poller<T> {
    /// Build a poller with its own HTTP client.
    pub fn new(config: PollerConfig, tree: Arc<T>) -> Result<Self, CoreError> {
        let transport = TransportConfig::default().with_timeout(config.timeout);
        let client = MeaterClient::new(config.api_url.clone(), &transport)?;
        Ok(Self::with_client(config, client, tree))
    }

    /// Build a poller around an existing client.
    pub fn with_client(config: PollerConfig, client: MeaterClient, tree: Arc<T>) -> Self {
        let (update_tx, update_rx) = mpsc::channel(1);
        let poller = Self {
            client,
            tree,
            interval_secs: config.idle_interval_secs,
            config,
            session: Session::default(),
            timers: Timers::default(),
            cancel: CancellationToken::new(),
            update_tx,
            update_rx,
        };
        poller.provision_adapter_nodes();
        poller
    }

    pub fn handle(&self) -> PollerHandle {
        PollerHandle {
            update_tx: self.update_tx.clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn tree(&self) -> &Arc<T> {
        &self.tree
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Interval the next poll (or login retry) is scheduled with.
    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// Time until the pending login retry, if one is armed.
    pub fn next_login_in(&self) -> Option<Duration> {
        self.timers.login_at.map(remaining)
    }

    /// Time until the pending poll, if one is armed.
    pub fn next_poll_in(&self) -> Option<Duration> {
        self.timers.poll_at.map(remaining)
    }

    // ── Main loop ────────────────────────────────────────────────

    /// Log in, then keep polling until [`PollerHandle::shutdown`].
    pub async fn run(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }

        info!(api = %self.config.api_url, "starting MEATER cloud poller");
        // Failures are logged and, where retryable, rearm the login timer.
        if let Err(e) = self.login_once().await {
            debug!(error = %e, "initial login did not succeed");
        }

        let cancel = self.cancel.clone();
        loop {
            let login_at = self.timers.login_at;
            let poll_at = self.timers.poll_at;

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(()) = self.update_rx.recv() => {
                    debug!("update triggered manually");
                    if let Err(e) = self.poll_once().await {
                        debug!(error = %e, "manual update failed");
                    }
                }
                () = sleep_until_opt(login_at) => {
                    self.timers.login_at = None;
                    if let Err(e) = self.login_once().await {
                        debug!(error = %e, "login retry failed");
                    }
                }
                () = sleep_until_opt(poll_at) => {
                    if let Err(e) = self.poll_once().await {
                        debug!(error = %e, "poll failed");
                    }
                }
            }
        }

        self.timers = Timers::default();
        info!("MEATER cloud poller stopped");
    }

    // ── Login ────────────────────────────────────────────────────

    /// One login attempt, including at most one immediate relogin on 401.
    ///
    /// On success an immediate poll is scheduled. Retryable failures arm
    /// the login timer; missing credentials arm nothing.
    pub async fn login_once(&mut self) -> Result<(), CoreError> {
        if !self.config.credentials.is_complete() {
            error!("credentials for cloud access missing, set username and password");
            return Err(CoreError::Config {
                message: "username and password are required".into(),
            });
        }

        loop {
            debug!("sending login to MEATER cloud");
            let result = self
                .client
                .login(&self.config.credentials.username, &self.config.credentials.password)
                .await;

            let resp = match result {
                Ok(resp) => resp,
                Err(e) => {
                    let err = CoreError::from(e);
                    if err.is_backoff() {
                        self.interval_secs = BACKOFF_SECS;
                    }
                    error!(
                        error = %err,
                        retry_secs = self.interval_secs,
                        "login failed, cloud unreachable or returned garbage"
                    );
                    return Err(self.login_failed(err));
                }
            };

            let verdict = self.apply_status(&resp, self.session.login_failed);
            match verdict.action {
                Action::Relogin => {
                    self.session.failed();
                }
                Action::Backoff => {
                    self.interval_secs = BACKOFF_SECS;
                    return Err(self.login_failed(api_error(&resp)));
                }
                Action::Proceed if resp.status_code == 200 => {
                    let Some(data) = resp.data else {
                        self.interval_secs = BACKOFF_SECS;
                        return Err(self.login_failed(CoreError::Parse {
                            message: "login response without data".into(),
                        }));
                    };
                    self.session.established(data.token, data.user_id);
                    self.set(INFO_USER_ID, json!(self.session.user_id));
                    info!(user_id = %self.session.user_id, "logged in to MEATER cloud");
                    self.schedule_poll(Duration::ZERO);
                    return Ok(());
                }
                Action::Proceed => {
                    return Err(self.login_failed(api_error(&resp)));
                }
            }
        }
    }

    /// Mark the session failed and arm the login retry.
    fn login_failed(&mut self, err: CoreError) -> CoreError {
        self.session.failed();
        self.schedule_login(Duration::from_secs(self.interval_secs));
        err
    }

    // ── Poll ─────────────────────────────────────────────────────

    /// One poll: fetch, classify, reconcile, reschedule.
    ///
    /// Returns the reconciliation outcome when the tree was updated,
    /// `Ok(None)` for an unrecognised but non-failing status. Without a
    /// token from a prior login nothing is sent and no timer is armed.
    pub async fn poll_once(&mut self) -> Result<Option<SyncOutcome>, CoreError> {
        if !self.session.has_token() {
            debug!("no session token, skipping poll");
            return Err(CoreError::Disconnected);
        }

        self.timers.poll_at = None;
        let (result, relogin) = self.fetch_and_reconcile().await;

        self.schedule_poll(Duration::from_secs(self.interval_secs));
        if relogin && !self.cancel.is_cancelled() {
            // A successful relogin pulls the poll forward to now.
            if let Err(e) = self.login_once().await {
                debug!(error = %e, "relogin after 401 failed");
            }
        }
        result
    }

    async fn fetch_and_reconcile(&mut self) -> (Result<Option<SyncOutcome>, CoreError>, bool) {
        debug!("fetching device data from cloud");
        let result = self
            .client
            .devices(&self.session.token, &self.config.language)
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                error!(
                    error = %e,
                    transient = e.is_transient(),
                    "failed reading data from cloud"
                );
                if let Some(body) = e.body() {
                    debug!(body, "response from server");
                }
                let err = CoreError::from(e);
                if err.is_backoff() {
                    self.interval_secs = BACKOFF_SECS;
                }
                return (Err(err), false);
            }
        };

        self.set(RAW_DATA, json!(resp.raw));
        self.set(STATUS, json!(resp.status));

        let verdict = self.apply_status(&resp, self.session.relogin_spent());
        match verdict.action {
            Action::Relogin => {
                self.session.relogin_used = true;
                (Err(api_error(&resp)), true)
            }
            Action::Backoff => {
                self.interval_secs = BACKOFF_SECS;
                if verdict.relogin_suppressed {
                    // The token keeps being refused; try a fresh login
                    // together with the backed-off poll.
                    self.schedule_login(Duration::from_secs(BACKOFF_SECS));
                }
                (Err(api_error(&resp)), false)
            }
            Action::Proceed if resp.status_code == 200 => {
                self.session.poll_succeeded();
                let devices = resp.data.map(|d| d.devices).unwrap_or_default();
                let settings = self.sync_settings();
                match reconcile(self.tree.as_ref(), &devices, &settings) {
                    Ok(outcome) => {
                        self.interval_secs = outcome.interval_secs;
                        (Ok(Some(outcome)), false)
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to write device data");
                        (Err(e.into()), false)
                    }
                }
            }
            Action::Proceed => (Ok(None), false),
        }
    }

    fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            temp_unit: self.config.temp_unit.clone(),
            clear_stale_values: self.config.clear_stale_values,
            idle_interval_secs: self.config.idle_interval_secs,
            cook_interval_secs: self.config.cook_interval_secs,
            current_interval_secs: self.interval_secs,
        }
    }

    // ── Helpers ──────────────────────────────────────────────────

    /// Classify a response and apply its side effects on the tree.
    fn apply_status<D>(&mut self, resp: &ApiResponse<D>, relogin_spent: bool) -> Classification {
        let verdict = classify(resp.status_code, relogin_spent);
        verdict.log();
        self.set(STATUS_CODE, json!(resp.status_code));
        if let Some(connected) = verdict.connected {
            self.set(INFO_CONNECTION, json!(connected));
        }
        verdict
    }

    fn schedule_login(&mut self, after: Duration) {
        if self.cancel.is_cancelled() {
            return;
        }
        debug!(after_secs = after.as_secs(), "scheduling login retry");
        self.timers.login_at = Some(Instant::now() + after);
    }

    fn schedule_poll(&mut self, after: Duration) {
        if self.cancel.is_cancelled() {
            return;
        }
        debug!(after_secs = after.as_secs(), "scheduling next poll");
        self.timers.poll_at = Some(Instant::now() + after);
    }

    fn set(&self, path: &str, value: Value) {
        if let Err(e) = self.tree.write(path, value, WriteOptions::acked()) {
            warn!(path, error = %e, "state write failed");
        }
    }

    fn provision_adapter_nodes(&self) {
        let tree = self.tree.as_ref();
        tree.create_if_absent("info", NodeSpec::channel("Information"));
        tree.create_if_absent(
            INFO_CONNECTION,
            NodeSpec::state("Connected to MEATER cloud", ValueType::Boolean, "indicator.connected"),
        );
        tree.create_if_absent(
            INFO_USER_ID,
            NodeSpec::state("user id of cloud account", ValueType::String, "text"),
        );
        tree.create_if_absent(
            STATUS,
            NodeSpec::state("status text of last response", ValueType::String, "text"),
        );
        tree.create_if_absent(
            STATUS_CODE,
            NodeSpec::state("status code of last response", ValueType::Number, "value"),
        );
        tree.create_if_absent(
            RAW_DATA,
            NodeSpec::state("raw body of last device response", ValueType::String, "json"),
        );
        tree.create_if_absent(
            COOKING_ACTIVE,
            NodeSpec::state("at least one probe is cooking", ValueType::Boolean, "indicator"),
        );
        self.set(INFO_CONNECTION, json!(false));
    }
}

fn remaining(at: Instant) -> Duration {
    at.saturating_duration_since(Instant::now())
}

fn api_error<D>(resp: &ApiResponse<D>) -> CoreError {
    CoreError::Api {
        status: resp.status_code,
        message: resp.status.clone(),
    }
}
