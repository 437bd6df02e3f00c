//! The daemon client: process supervision, connection state machine, and the
//! public request API.
//!
//! One [`DaemonClient`] owns one emberd instance. `start()` launches the
//! daemon, waits for its status port, subscribes to the reserved status
//! topic, and resolves once the first status message has driven the secure
//! channel bootstrap to completion. From then on the request channel and
//! event router operate until `stop_daemon()` or `restart_daemon()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::certs::{client_keys_path, read_keypair, server_keys_path};
use crate::error::{DaemonError, Result};
use crate::gate::Gate;
use crate::lifecycle::DaemonSupervisor;
use crate::protocol::{ApiStatus, Network, RequestEnvelope, STATUS_TOPIC};
use crate::request::{RequestChannel, TokenDisposition};
use crate::router::{EventRouter, HandlerRegistry};
use crate::settings::DaemonSettings;
use crate::transport::secure::{self, SecureSubscriber};
use crate::transport::Subscriber;

/// Connection lifecycle of a [`DaemonClient`].
///
/// Owned exclusively by the client; transitions happen only in its
/// coordination logic, in the documented order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No cycle has started, or an already-running instance was detected
    Idle,
    /// Checking for an unmanaged instance before launching
    Probing,
    /// Daemon launched; waiting for its status port and first status message
    WaitingForStatus,
    /// First status received; secure channel bootstrap in progress
    Initializing,
    /// Request channel and event router fully operational
    Ready,
    /// A stop+start sequence is replaying the connect cycle
    Restarting,
    /// Terminal for the current lifetime; a fresh `start()` begins a new one
    Stopped,
}

/// Gates scoped to one connect cycle. Created fresh (closed) at the start of
/// every cycle; a gate is never reused once opened.
struct CycleGates {
    /// Opened the first time a status message reports a non-negative block
    /// height.
    block_index: Gate,
    /// Opened when a subsequent cycle begins, poisoning waiters still stuck
    /// on this cycle's `block_index`.
    restart: Gate,
}

impl CycleGates {
    fn new() -> Self {
        Self {
            block_index: Gate::new(),
            restart: Gate::new(),
        }
    }
}

struct ClientInner {
    settings: DaemonSettings,
    supervisor: DaemonSupervisor,
    handlers: Arc<HandlerRegistry>,
    requests: RequestChannel,
    state: watch::Sender<ConnectionState>,
    cycle: StdMutex<Option<CycleGates>>,
    /// Latched by the first valid status message of a cycle; the trigger for
    /// bootstrap.
    first_status: AtomicBool,
    /// Fatal error recorded by the status loop for `start()` to surface.
    fatal: StdMutex<Option<DaemonError>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

/// Client for a supervised emberd instance. Cheap to clone; all clones share
/// the same connection.
#[derive(Clone)]
pub struct DaemonClient {
    inner: Arc<ClientInner>,
}

impl DaemonClient {
    /// Create a client. Handlers are registered up front and fixed for the
    /// client's lifetime; every handler topic except the reserved status
    /// topic is subscribed on the event channel during bootstrap.
    pub fn new(settings: DaemonSettings, handlers: HandlerRegistry) -> Self {
        let supervisor = DaemonSupervisor::new(settings.clone());
        let reply_timeout = settings.reply_timeout;
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(ClientInner {
                settings,
                supervisor,
                handlers: Arc::new(handlers),
                requests: RequestChannel::new(reply_timeout),
                state,
                cycle: StdMutex::new(None),
                first_status: AtomicBool::new(false),
                fatal: StdMutex::new(None),
                tasks: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        self.inner.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!("connection state {state:?} -> {next:?}");
            *state = next;
            true
        });
    }

    /// Start the daemon and drive the connect cycle to Ready.
    ///
    /// Fails with [`DaemonError::AlreadyRunning`] if a listener already
    /// exists on the status port (nothing is spawned in that case), with
    /// [`DaemonError::ConnectionTimeout`] if the daemon never opens its
    /// status port, or with the bootstrap error if initialization fails.
    pub async fn start(&self) -> Result<()> {
        self.set_state(ConnectionState::Probing);

        if self.inner.supervisor.is_listening().await {
            self.set_state(ConnectionState::Idle);
            return Err(DaemonError::AlreadyRunning);
        }
        self.begin_cycle();

        if let Err(e) = self.inner.supervisor.launch().await {
            self.set_state(ConnectionState::Stopped);
            return Err(e);
        }

        self.set_state(ConnectionState::WaitingForStatus);
        self.await_status_port().await?;

        info!("connecting to the emberd status feed");
        let mut status_feed = self.connect_status_feed().await?;
        if let Err(e) = status_feed.subscribe(&[STATUS_TOPIC]).await {
            self.set_state(ConnectionState::Stopped);
            return Err(DaemonError::Send(e));
        }

        let client = self.clone();
        let handle = tokio::spawn(async move { client.status_loop(status_feed).await });
        self.inner.tasks.lock().unwrap().push(handle);

        // Bootstrap runs in the status loop; wait for it to settle the cycle.
        let mut state_rx = self.inner.state.subscribe();
        let settled = state_rx
            .wait_for(|s| matches!(s, ConnectionState::Ready | ConnectionState::Stopped))
            .await
            .map(|s| *s)
            .unwrap_or(ConnectionState::Stopped);

        match settled {
            ConnectionState::Ready => Ok(()),
            _ => Err(self.take_fatal()),
        }
    }

    /// Begin a new cycle: poison the previous cycle's gates and create
    /// fresh ones.
    fn begin_cycle(&self) {
        let mut cycle = self.inner.cycle.lock().unwrap();
        if let Some(previous) = cycle.take() {
            previous.restart.open();
        }
        *cycle = Some(CycleGates::new());
        drop(cycle);

        self.inner.first_status.store(false, Ordering::SeqCst);
        self.inner.fatal.lock().unwrap().take();
    }

    /// Poll the status port until something listens, bounded by the probe
    /// schedule from the settings (10 attempts, 3s apart by default).
    async fn await_status_port(&self) -> Result<()> {
        let settings = &self.inner.settings;
        for attempt in 1..=settings.probe_attempts {
            info!(
                attempt,
                "checking if emberd is listening on {}:{}", settings.host, settings.status_port
            );
            if self.inner.supervisor.is_listening().await {
                info!(attempt, "emberd is listening");
                return Ok(());
            }
            info!(attempt, "emberd is not listening");
            if attempt < settings.probe_attempts {
                sleep(settings.probe_interval).await;
            }
        }
        self.set_state(ConnectionState::Stopped);
        Err(DaemonError::ConnectionTimeout(settings.probe_window_secs()))
    }

    async fn connect_status_feed(&self) -> Result<Subscriber> {
        let settings = &self.inner.settings;
        match Subscriber::connect(&settings.host, settings.status_port).await {
            Ok(feed) => Ok(feed),
            Err(e) => {
                self.set_state(ConnectionState::Stopped);
                Err(DaemonError::Send(e))
            }
        }
    }

    /// Consume the status feed for the lifetime of one cycle.
    async fn status_loop(self, mut feed: Subscriber) {
        loop {
            let payload = match feed.next().await {
                Ok((topic, payload)) if topic == STATUS_TOPIC => payload,
                Ok(_) => continue,
                Err(e) => {
                    debug!("status feed closed: {e}");
                    break;
                }
            };

            if let Err(e) = self.handle_status(&payload).await {
                error!("fatal error while handling emberd status: {e}");
                *self.inner.fatal.lock().unwrap() = Some(e);
                self.teardown();
                self.set_state(ConnectionState::Stopped);
                return;
            }
        }

        // The feed closing before the cycle settles means the daemon went
        // away mid-bootstrap; a close after that is handled by stop/restart.
        if !matches!(
            self.state(),
            ConnectionState::Ready | ConnectionState::Stopped
        ) {
            *self.inner.fatal.lock().unwrap() = Some(DaemonError::Protocol(
                "status feed closed before the client was ready".to_string(),
            ));
            self.teardown();
            self.set_state(ConnectionState::Stopped);
        }
    }

    /// Process one status message: trigger bootstrap on the first valid one,
    /// open the block-index gate once the index is loaded, and invoke the
    /// status handler.
    async fn handle_status(&self, raw: &[u8]) -> Result<()> {
        let envelope: Value = serde_json::from_slice(raw)
            .map_err(|e| DaemonError::Protocol(format!("failed to parse status envelope: {e}")))?;
        let status = ApiStatus::from_envelope(&envelope)?;

        if !self.inner.first_status.load(Ordering::SeqCst) {
            self.initialize(&status).await?;
            self.inner.first_status.store(true, Ordering::SeqCst);
        }

        // The block height is -1 until the daemon has loaded its block index.
        if status.blocks() >= 0 {
            let gate = {
                let cycle = self.inner.cycle.lock().unwrap();
                cycle.as_ref().map(|c| c.block_index.clone())
            };
            if let Some(gate) = gate {
                gate.open();
            }
        }

        if let Some(handler) = self.inner.handlers.get(STATUS_TOPIC) {
            // The status handler receives the full envelope, not just data.
            handler.handle(self.clone(), envelope).await;
        }
        Ok(())
    }

    /// Secure channel bootstrap, run once per cycle on the first valid
    /// status message. Selects control ports from the announced network,
    /// loads credentials from the announced data directory, connects the
    /// requester and event-subscriber sockets, and opens the request gate.
    async fn initialize(&self, status: &ApiStatus) -> Result<()> {
        self.set_state(ConnectionState::Initializing);

        let data = status
            .data
            .as_ref()
            .ok_or_else(|| DaemonError::Protocol("status envelope has no data".to_string()))?;
        info!(network = %data.network, "initializing from the first emberd status");

        let network = Network::from_name(&data.network)?;
        let ports = self.inner.settings.ports_for(network);

        // Credentials are validated before any socket is configured with them.
        let client_keys = read_keypair(&client_keys_path(&data.data_dir))?;
        let server_keys = read_keypair(&server_keys_path(&data.data_dir))?;

        info!("connecting to the emberd control ports");
        let host = &self.inner.settings.host;
        let requester = secure::connect(host, ports.request, &client_keys, &server_keys.public)
            .await
            .map_err(DaemonError::Send)?;
        let events = secure::connect(host, ports.events, &client_keys, &server_keys.public)
            .await
            .map_err(DaemonError::Send)?;

        let mut events = SecureSubscriber::new(events);
        let topics = self.inner.handlers.event_topics();
        debug!(?topics, "subscribing on the event channel");
        events.subscribe(&topics).await.map_err(DaemonError::Send)?;

        let router = EventRouter::new(self.inner.handlers.clone(), self.clone());
        let handle = tokio::spawn(router.run(events));
        self.inner.tasks.lock().unwrap().push(handle);

        self.inner.requests.install(requester);
        self.set_state(ConnectionState::Ready);
        // A restart sequence holds the request token across the cycle
        // boundary; now that we are Ready it may be released.
        self.inner.requests.release_held();
        Ok(())
    }

    fn take_fatal(&self) -> DaemonError {
        self.inner
            .fatal
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| {
                DaemonError::Protocol("connection cycle ended before becoming ready".to_string())
            })
    }

    /// Abort background tasks and discard sockets. Idempotent, and safe to
    /// call at any point in the cycle: sockets that were never created are
    /// skipped.
    fn teardown(&self) {
        for task in self.inner.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        self.inner.requests.close();
        self.inner.first_status.store(false, Ordering::SeqCst);
    }

    /// Resolve once the daemon has loaded its block index.
    ///
    /// Fails with [`DaemonError::RestartInterrupted`] if a new cycle begins
    /// first, and with [`DaemonError::NotStarted`] if `start()` was never
    /// called.
    pub async fn await_block_index(&self) -> Result<()> {
        let (block_index, restart) = {
            let cycle = self.inner.cycle.lock().unwrap();
            match cycle.as_ref() {
                None => return Err(DaemonError::NotStarted),
                Some(c) => (c.block_index.clone(), c.restart.clone()),
            }
        };

        tokio::select! {
            biased;
            _ = block_index.opened() => Ok(()),
            _ = restart.opened() => Err(DaemonError::RestartInterrupted),
        }
    }

    /// Send a request to emberd and return the `data` member of its reply.
    ///
    /// An API call is identified by both `kind` and `collection`; `auth` is
    /// the wallet passphrase, required only for certain calls. The call
    /// queues behind the request gate and the single-flight token, so a
    /// request issued before bootstrap completes simply waits.
    pub async fn send(
        &self,
        auth: Option<&str>,
        kind: &str,
        collection: &str,
        data: Value,
    ) -> Result<Value> {
        self.ensure_started()?;
        debug!(kind, collection, "sending request to emberd");
        let envelope = RequestEnvelope::new(auth, kind, collection, data);
        self.inner
            .requests
            .exchange(&envelope, TokenDisposition::Release)
            .await
    }

    async fn send_privileged(&self, envelope: RequestEnvelope) -> Result<Value> {
        self.ensure_started()?;
        debug!(
            kind = %envelope.kind,
            collection = %envelope.collection,
            "sending privileged request to emberd"
        );
        self.inner
            .requests
            .exchange(&envelope, TokenDisposition::HoldOnSuccess)
            .await
    }

    fn ensure_started(&self) -> Result<()> {
        if self.inner.cycle.lock().unwrap().is_none() {
            return Err(DaemonError::NotStarted);
        }
        Ok(())
    }

    /// Stop the daemon.
    ///
    /// The stop request keeps the single-flight token on success, so no
    /// other request can slip in while the daemon is going down; queued
    /// senders stay blocked until a subsequent cycle reaches Ready.
    pub async fn stop_daemon(&self) -> Result<()> {
        let envelope = RequestEnvelope::new(None, "initial", "stop", Value::Null);
        self.send_privileged(envelope).await?;

        loop {
            info!("waiting for emberd to close its ports");
            if !self.inner.supervisor.is_listening().await {
                break;
            }
            sleep(self.inner.settings.stop_poll_interval).await;
        }

        self.teardown();
        self.set_state(ConnectionState::Stopped);
        Ok(())
    }

    /// Restart the daemon: stop it, then replay the connect cycle.
    pub async fn restart_daemon(&self) -> Result<()> {
        self.set_state(ConnectionState::Restarting);
        self.stop_daemon().await?;
        self.start().await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Wallet operations: thin parameter-shaping wrappers over send()
    // ─────────────────────────────────────────────────────────────────────

    /// Create a payment request, stored daemon-side.
    ///
    /// emberd emits no subscription event for this; the caller updates any
    /// state it keeps.
    pub async fn create_payment_request(
        &self,
        amount: Option<u64>,
        label: &str,
        message: &str,
        address: &str,
    ) -> Result<Value> {
        self.send(
            None,
            "create",
            "paymentRequest",
            json!({ "amount": amount, "label": label, "address": address, "message": message }),
        )
        .await
    }

    /// Update an existing payment request, identified by its address.
    pub async fn update_payment_request(
        &self,
        address: &str,
        amount: Option<u64>,
        label: &str,
        message: &str,
        state: &str,
    ) -> Result<Value> {
        self.send(
            None,
            "update",
            "paymentRequest",
            json!({ "id": address, "amount": amount, "label": label, "message": message, "state": state }),
        )
        .await
    }

    /// Publicly send `amount` base units to `recipient`; returns the
    /// transaction ID. `coin_control` selects the inputs to spend from.
    pub async fn send_ember(
        &self,
        auth: &str,
        label: &str,
        recipient: &str,
        amount: u64,
        fee_per_kb: u64,
        subtract_fee_from_amount: bool,
        coin_control: &str,
    ) -> Result<String> {
        let data = self
            .send(
                Some(auth),
                "create",
                "sendEmber",
                json!({
                    "addresses": { recipient: { "label": label, "amount": amount } },
                    "feePerKb": fee_per_kb,
                    "subtractFeeFromAmount": subtract_fee_from_amount,
                    "coinControl": { "selected": coin_control },
                }),
            )
            .await?;

        data.get("txid")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| DaemonError::Protocol(format!("sendEmber reply has no txid: {data}")))
    }

    /// Privately send `amount` base units to `recipient`.
    pub async fn send_private(
        &self,
        auth: &str,
        label: &str,
        recipient: &str,
        amount: u64,
        subtract_fee_from_amount: bool,
        coin_control: &str,
    ) -> Result<Value> {
        self.send(
            Some(auth),
            "create",
            "sendPrivate",
            json!({
                "outputs": [{ "address": recipient, "amount": amount }],
                "label": label,
                "subtractFeeFromAmount": subtract_fee_from_amount,
                "coinControl": { "selected": coin_control },
            }),
        )
        .await
    }

    /// Calculate the fee for a public transaction, in base units.
    pub async fn calc_tx_fee(
        &self,
        fee_per_kb: u64,
        address: &str,
        amount: u64,
        subtract_fee_from_amount: bool,
    ) -> Result<u64> {
        let data = self
            .send(
                None,
                "get",
                "txFee",
                json!({
                    "addresses": { address: amount },
                    "feePerKb": fee_per_kb,
                    "subtractFeeFromAmount": subtract_fee_from_amount,
                }),
            )
            .await?;

        data.get("fee")
            .and_then(Value::as_u64)
            .ok_or_else(|| DaemonError::Protocol(format!("got invalid txFee reply: {data}")))
    }

    /// Calculate the fee for a private transaction, in base units.
    pub async fn calc_private_tx_fee(
        &self,
        label: &str,
        recipient: &str,
        amount: u64,
        subtract_fee_from_amount: bool,
    ) -> Result<u64> {
        let data = self
            .send(
                None,
                "none",
                "privateTxFee",
                json!({
                    "outputs": [{ "address": recipient, "amount": amount }],
                    "label": label,
                    "subtractFeeFromAmount": subtract_fee_from_amount,
                }),
            )
            .await?;

        data.get("fee")
            .and_then(Value::as_u64)
            .ok_or_else(|| DaemonError::Protocol(format!("got invalid privateTxFee reply: {data}")))
    }

    /// Lock and unlock coins for coin control.
    pub async fn lock_coins(&self, auth: &str, locked: &str, unlocked: &str) -> Result<Value> {
        self.send(
            Some(auth),
            "create",
            "lockCoins",
            json!({ "lockedCoins": locked, "unlockedCoins": unlocked }),
        )
        .await
    }

    /// Unlock the wallet with its passphrase.
    pub async fn unlock_wallet(&self, auth: &str) -> Result<Value> {
        self.send(Some(auth), "create", "unlockWallet", json!({})).await
    }

    /// Check whether a mnemonic phrase is well formed.
    pub async fn verify_mnemonic_validity(&self, mnemonic: &str) -> Result<Value> {
        self.send(
            None,
            "create",
            "verifyMnemonicValidity",
            json!({ "mnemonic": mnemonic }),
        )
        .await
    }

    /// Restore a wallet from a mnemonic phrase, optionally protected by an
    /// extra passphrase.
    pub async fn import_mnemonics(
        &self,
        auth: &str,
        mnemonic: &str,
        protective: &str,
    ) -> Result<Value> {
        self.send(
            Some(auth),
            "create",
            "importMnemonics",
            json!({ "mnemonic": mnemonic, "protective": protective }),
        )
        .await
    }

    /// Reveal the wallet's mnemonic phrase.
    pub async fn show_mnemonics(&self, auth: &str) -> Result<Value> {
        self.send(Some(auth), "create", "showMnemonics", json!({})).await
    }

    /// Persist whether the mnemonic backup warning should be suppressed.
    pub async fn write_show_mnemonic_warning(
        &self,
        auth: &str,
        dont_show_mnemonic_warning: bool,
    ) -> Result<Value> {
        self.send(
            Some(auth),
            "create",
            "writeShowMnemonicWarning",
            json!({ "dontShowMnemonicWarning": dont_show_mnemonic_warning }),
        )
        .await
    }

    /// Read the stored mnemonic-warning suppression flag.
    pub async fn read_wallet_mnemonic_warning_state(&self, auth: &str) -> Result<Value> {
        self.send(Some(auth), "create", "readWalletMnemonicWarningState", json!({}))
            .await
    }

    /// Read the daemon-side address book.
    pub async fn read_address_book(&self) -> Result<Value> {
        self.send(Some(""), "create", "readAddressBook", json!({})).await
    }

    /// Add, edit, or delete an address book entry.
    pub async fn edit_address_book(
        &self,
        address: &str,
        label: &str,
        purpose: &str,
        action: &str,
        updated_address: &str,
        updated_label: &str,
    ) -> Result<Value> {
        self.send(
            Some(""),
            "create",
            "editAddressBook",
            json!({
                "address": address,
                "label": label,
                "purpose": purpose,
                "action": action,
                "updatedaddress": updated_address,
                "updatedlabel": updated_label,
            }),
        )
        .await
    }

    /// Start a znode by alias.
    pub async fn start_znode(&self, auth: &str, alias: &str) -> Result<()> {
        let reply = self
            .send(
                Some(auth),
                "update",
                "znodeControl",
                json!({ "method": "start-alias", "alias": alias }),
            )
            .await?;

        let total = reply.pointer("/overall/total").and_then(Value::as_i64);
        let success = reply.pointer("/detail/status/success").and_then(Value::as_bool);
        let info = reply.pointer("/detail/status/info").and_then(Value::as_str);
        if total != Some(1) || (success != Some(true) && info.is_none()) {
            return Err(DaemonError::Protocol(format!(
                "got invalid znodeControl reply: {reply}"
            )));
        }
        // On failure, info carries the daemon's error message.
        if success != Some(true) {
            return Err(DaemonError::Remote(reply));
        }
        Ok(())
    }

    /// Mint private coins in the given denominations; returns the
    /// transaction ID. `denominations` maps denomination name to count.
    pub async fn mint(&self, auth: &str, denominations: Value) -> Result<Value> {
        self.send(
            Some(auth),
            "create",
            "mint",
            json!({ "denominations": denominations }),
        )
        .await
    }

    /// Back up wallet.dat into `backup_directory`.
    pub async fn backup(&self, backup_directory: &str) -> Result<()> {
        self.send(
            None,
            "create",
            "backup",
            json!({ "directory": backup_directory }),
        )
        .await?;
        Ok(())
    }

    /// Rebroadcast a transaction.
    pub async fn rebroadcast(&self, txid: &str) -> Result<()> {
        let reply = self
            .send(None, "create", "rebroadcast", json!({ "txHash": txid }))
            .await?;

        if reply.get("result").and_then(Value::as_bool) == Some(true) {
            Ok(())
        } else {
            Err(DaemonError::Remote(reply))
        }
    }

    /// Change daemon settings. emberd emits no event for this; the caller
    /// updates any state it keeps.
    pub async fn update_settings(&self, settings: Value) -> Result<()> {
        self.send(None, "update", "setting", settings).await?;
        Ok(())
    }

    /// Retrieve the value of all daemon settings.
    pub async fn get_settings(&self) -> Result<Value> {
        self.send(None, "initial", "setting", Value::Null).await
    }

    /// Invoke a legacy RPC command line.
    ///
    /// emberd parses the argument list but not the command name, so the name
    /// is split off here.
    pub async fn legacy_rpc(&self, commandline: &str) -> Result<Value> {
        let (method, args) = match commandline.split_once(' ') {
            Some((method, args)) => (method, args),
            None => (commandline, ""),
        };
        self.send(
            None,
            "create",
            "rpc",
            json!({ "method": method, "args": args }),
        )
        .await
    }

    /// List all available legacy RPC command names.
    pub async fn legacy_rpc_commands(&self) -> Result<Vec<String>> {
        let data = self.send(None, "initial", "rpc", json!({})).await?;
        let categories = data
            .get("categories")
            .and_then(Value::as_object)
            .ok_or_else(|| DaemonError::Protocol(format!("got invalid rpc reply: {data}")))?;

        let mut commands = Vec::new();
        for entries in categories.values() {
            for entry in entries.as_array().into_iter().flatten() {
                if let Some(help_line) = entry.as_str() {
                    if let Some(name) = help_line.split(' ').next() {
                        commands.push(name.to_string());
                    }
                }
            }
        }
        Ok(commands)
    }

    /// Change the wallet passphrase.
    ///
    /// Privileged: emberd restarts after a passphrase change, so on success
    /// the request token is carried to the next cycle like a stop. Fails
    /// with [`DaemonError::IncorrectPassphrase`] when the old passphrase is
    /// wrong.
    pub async fn set_passphrase(&self, old: Option<&str>, new: &str) -> Result<()> {
        let mut envelope =
            RequestEnvelope::new(Some(old.unwrap_or("")), "update", "setPassphrase", json!({}));
        envelope.auth.new_passphrase = Some(new.to_string());

        match self.send_privileged(envelope).await {
            Ok(_) => Ok(()),
            Err(e) if e.remote_code() == Some(-14) => Err(DaemonError::IncorrectPassphrase),
            Err(e) => Err(e),
        }
    }
}
