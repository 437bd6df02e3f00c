//! In-process stand-in for emberd.
//!
//! Listens on the same three channels as the real daemon: a plaintext status
//! publish channel, a secure request/reply channel, and a secure event
//! publish channel. Credentials are written under a temporary data directory
//! exactly where the daemon would put them, and the announced `dataDir`
//! points there so the client bootstraps against this instance.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::time::sleep;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use ember_daemon_client::certs::{
    client_keys_path, read_keypair, server_keys_path, CertificateKeyPair,
};
use ember_daemon_client::transport::secure::{accept, SecureStream};
use ember_daemon_client::DaemonSettings;

type ReplyFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

pub struct FakeDaemon {
    pub settings: DaemonSettings,
    data_dir: TempDir,
    client_keys: CertificateKeyPair,
    server_keys: CertificateKeyPair,
    blocks: Arc<AtomicI64>,
    network: Arc<StdMutex<String>>,
    reply: Arc<StdMutex<ReplyFn>>,
    reply_delay: Arc<StdMutex<Duration>>,
    events_conn: Arc<AsyncMutex<Option<SecureStream>>>,
    stop_tx: StdMutex<Option<watch::Sender<bool>>>,
}

struct RunState {
    host: String,
    status_port: u16,
    request_port: u16,
    events_port: u16,
    data_dir: PathBuf,
    client_keys: CertificateKeyPair,
    server_keys: CertificateKeyPair,
    blocks: Arc<AtomicI64>,
    network: Arc<StdMutex<String>>,
    reply: Arc<StdMutex<ReplyFn>>,
    reply_delay: Arc<StdMutex<Duration>>,
    events_conn: Arc<AsyncMutex<Option<SecureStream>>>,
    stop_tx: watch::Sender<bool>,
}

fn reserve_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn write_key_file(path: &std::path::Path, fill: u8) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let contents = json!({
        "type": "keys",
        "data": {
            "public": BASE64.encode([fill; 32]),
            "private": BASE64.encode([fill.wrapping_add(1); 32]),
        }
    });
    std::fs::write(path, serde_json::to_vec(&contents).unwrap()).unwrap();
}

fn topic_frame(topic: &str, envelope: &Value) -> Vec<u8> {
    let mut frame = topic.as_bytes().to_vec();
    frame.push(b'\n');
    frame.extend_from_slice(&serde_json::to_vec(envelope).unwrap());
    frame
}

fn default_reply(request: Value) -> Value {
    json!({
        "meta": { "status": 200 },
        "error": null,
        "data": { "echo": request["collection"] }
    })
}

impl FakeDaemon {
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let data_dir = TempDir::new().unwrap();
        write_key_file(&client_keys_path(data_dir.path()), 10);
        write_key_file(&server_keys_path(data_dir.path()), 20);
        let client_keys = read_keypair(&client_keys_path(data_dir.path())).unwrap();
        let server_keys = read_keypair(&server_keys_path(data_dir.path())).unwrap();

        let status_port = reserve_port();
        let request_port = reserve_port();
        let events_port = reserve_port();

        // The real binary forks and detaches; /bin/true does the same minus
        // the daemon, which this harness plays instead.
        let mut settings = DaemonSettings::new("/bin/true", Some(data_dir.path().to_path_buf()));
        settings.status_port = status_port;
        for ports in [
            &mut settings.main_ports,
            &mut settings.test_ports,
            &mut settings.regtest_ports,
        ] {
            ports.request = request_port;
            ports.events = events_port;
        }
        settings.probe_timeout = Duration::from_millis(200);
        settings.probe_interval = Duration::from_millis(100);
        settings.probe_attempts = 20;
        settings.stop_poll_interval = Duration::from_millis(50);

        Self {
            settings,
            data_dir,
            client_keys,
            server_keys,
            blocks: Arc::new(AtomicI64::new(-1)),
            network: Arc::new(StdMutex::new("regtest".to_string())),
            reply: Arc::new(StdMutex::new(Arc::new(default_reply) as ReplyFn)),
            reply_delay: Arc::new(StdMutex::new(Duration::ZERO)),
            events_conn: Arc::new(AsyncMutex::new(None)),
            stop_tx: StdMutex::new(None),
        }
    }

    pub fn client_keys_file(&self) -> PathBuf {
        client_keys_path(self.data_dir.path())
    }

    pub fn set_blocks(&self, blocks: i64) {
        self.blocks.store(blocks, Ordering::SeqCst);
    }

    pub fn set_network(&self, network: &str) {
        *self.network.lock().unwrap() = network.to_string();
    }

    pub fn set_reply<F>(&self, reply: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        *self.reply.lock().unwrap() = Arc::new(reply);
    }

    pub fn set_reply_delay(&self, delay: Duration) {
        *self.reply_delay.lock().unwrap() = delay;
    }

    /// Bring the daemon's listeners up after `delay`. Call again to relaunch
    /// after a stop.
    pub fn launch_after(&self, delay: Duration) {
        let (stop_tx, _) = watch::channel(false);
        *self.stop_tx.lock().unwrap() = Some(stop_tx.clone());

        let state = Arc::new(RunState {
            host: self.settings.host.clone(),
            status_port: self.settings.status_port,
            request_port: self.settings.regtest_ports.request,
            events_port: self.settings.regtest_ports.events,
            data_dir: self.data_dir.path().to_path_buf(),
            client_keys: self.client_keys.clone(),
            server_keys: self.server_keys.clone(),
            blocks: self.blocks.clone(),
            network: self.network.clone(),
            reply: self.reply.clone(),
            reply_delay: self.reply_delay.clone(),
            events_conn: self.events_conn.clone(),
            stop_tx,
        });
        tokio::spawn(async move {
            sleep(delay).await;
            run(state).await;
        });
    }

    /// Publish one event envelope on the secure event channel, waiting for
    /// the client's event subscription to arrive first.
    pub async fn publish_event(&self, topic: &str, data: Value) {
        let envelope = json!({ "meta": { "status": 200 }, "error": null, "data": data });
        let frame = topic_frame(topic, &envelope);
        loop {
            let mut conn = self.events_conn.lock().await;
            if let Some(stream) = conn.as_mut() {
                stream.send(&frame).await.unwrap();
                return;
            }
            drop(conn);
            sleep(Duration::from_millis(20)).await;
        }
    }

    /// Tear the listeners down without a stop request.
    pub fn shutdown(&self) {
        if let Some(stop_tx) = self.stop_tx.lock().unwrap().as_ref() {
            stop_tx.send_replace(true);
        }
    }

    /// Wait until nothing accepts connections on the status port.
    pub async fn stopped(&self) {
        let addr = (self.settings.host.clone(), self.settings.status_port);
        while TcpStream::connect(addr.clone()).await.is_ok() {
            sleep(Duration::from_millis(20)).await;
        }
    }
}

async fn run(state: Arc<RunState>) {
    let host = state.host.as_str();
    let status = TcpListener::bind((host, state.status_port)).await.unwrap();
    let request = TcpListener::bind((host, state.request_port)).await.unwrap();
    let events = TcpListener::bind((host, state.events_port)).await.unwrap();

    let mut stop_rx = state.stop_tx.subscribe();
    loop {
        tokio::select! {
            _ = stop_rx.wait_for(|stopped| *stopped) => break,
            accepted = status.accept() => {
                if let Ok((stream, _)) = accepted {
                    tokio::spawn(serve_status(stream, state.clone()));
                }
            }
            accepted = request.accept() => {
                if let Ok((stream, _)) = accepted {
                    tokio::spawn(serve_request(stream, state.clone()));
                }
            }
            accepted = events.accept() => {
                if let Ok((stream, _)) = accepted {
                    tokio::spawn(serve_events(stream, state.clone()));
                }
            }
        }
    }
    state.events_conn.lock().await.take();
}

async fn serve_status(stream: TcpStream, state: Arc<RunState>) {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    // The subscribe frame; its topic list is always just apiStatus.
    if framed.next().await.is_none() {
        return;
    }

    let mut stop_rx = state.stop_tx.subscribe();
    loop {
        let envelope = json!({
            "meta": { "status": 200 },
            "error": null,
            "data": {
                "network": state.network.lock().unwrap().clone(),
                "blocks": state.blocks.load(Ordering::SeqCst),
                "dataDir": state.data_dir,
                "synced": true,
                "walletLock": false,
            }
        });
        let frame = topic_frame("apiStatus", &envelope);
        if framed.send(Bytes::from(frame)).await.is_err() {
            break;
        }
        tokio::select! {
            _ = stop_rx.wait_for(|stopped| *stopped) => break,
            _ = sleep(Duration::from_millis(25)) => {}
        }
    }
}

async fn serve_request(stream: TcpStream, state: Arc<RunState>) {
    let Ok(mut secure) = accept(stream, &state.server_keys, &state.client_keys).await else {
        return;
    };
    let mut stop_rx = state.stop_tx.subscribe();
    loop {
        let raw = tokio::select! {
            _ = stop_rx.wait_for(|stopped| *stopped) => break,
            received = secure.recv() => match received {
                Ok(raw) => raw,
                Err(_) => break,
            }
        };
        let envelope: Value = serde_json::from_slice(&raw).unwrap();
        let is_stop = envelope["type"] == "initial" && envelope["collection"] == "stop";

        let delay = *state.reply_delay.lock().unwrap();
        sleep(delay).await;

        let reply = {
            let reply_fn = state.reply.lock().unwrap().clone();
            reply_fn(envelope)
        };
        if secure.send(&serde_json::to_vec(&reply).unwrap()).await.is_err() {
            break;
        }
        if is_stop {
            state.stop_tx.send_replace(true);
            break;
        }
    }
}

async fn serve_events(stream: TcpStream, state: Arc<RunState>) {
    let Ok(mut secure) = accept(stream, &state.server_keys, &state.client_keys).await else {
        return;
    };
    // The subscribe frame; events are pushed by the test, not scheduled here.
    if secure.recv().await.is_err() {
        return;
    }
    *state.events_conn.lock().await = Some(secure);
}
