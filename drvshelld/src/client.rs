//! Per-endpoint client state machine: connect, ingest the catalog
//! frame, then serve request/response cycles, reconnecting on error.
//!
//! Each client runs as its own task on the `current_thread` runtime --
//! since that flavor pins everything to one OS thread, spawning a task
//! per endpoint is still cooperative scheduling, not parallelism. The
//! alternative (polling every client socket out of one giant `select!`
//! arm) can't be expressed for a dynamic, registry-sized set of
//! sockets without re-deriving what `tokio::spawn` already gives us.

use drvsh_proto::wire::{CommandInfo, InfoFrame, ResponseFrame, Signature};
use drvsh_proto::Error;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn};
use tracing_futures::Instrument;

const RETRY_IMMEDIATE: u32 = 3;
const BACKOFF_START: Duration = Duration::from_millis(200);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Mirrors the connect / catalog-fetch / request-response / reconnect
/// states described for a driver endpoint. Sub-phases that tokio's
/// `read_exact` absorbs internally (the partial-read loop) still get a
/// named state here so `status` can report exactly where a client is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    ExpectSignature,
    ReadingInfoHeader,
    ReadingInfoBody,
    Idle,
    AwaitingResponse,
    ReadingRespHeader,
    ReadingRespBody,
    Reconnecting,
    Closed,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClientState::Disconnected => "disconnected",
            ClientState::ExpectSignature => "expecting signature",
            ClientState::ReadingInfoHeader => "reading info header",
            ClientState::ReadingInfoBody => "reading info body",
            ClientState::Idle => "idle",
            ClientState::AwaitingResponse => "awaiting response",
            ClientState::ReadingRespHeader => "reading response header",
            ClientState::ReadingRespBody => "reading response body",
            ClientState::Reconnecting => "reconnecting",
            ClientState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What a client task reports back to the reactor.
#[derive(Debug)]
pub enum ClientEvent {
    StateChanged {
        name: String,
        slot: u32,
        state: ClientState,
        last_error: Option<String>,
    },
    CatalogReady {
        name: String,
        slot: u32,
        commands: Vec<CommandInfo>,
    },
    Response {
        name: String,
        slot: u32,
        payload: Vec<u8>,
    },
}

/// A command to send down to the driver. The dispatcher hands over an
/// already-encoded frame; the client doesn't need to know its shape.
enum ClientCommand {
    Send(Vec<u8>),
}

/// Handle kept in the registry: a sender half to push commands at the
/// client task, plus the most recently reported catalog/state, cached
/// so `list`/`status` can read it synchronously.
pub struct Client {
    pub path: PathBuf,
    pub state: ClientState,
    pub last_error: Option<String>,
    pub catalog: Vec<CommandInfo>,
    cmd_tx: Option<mpsc::Sender<ClientCommand>>,
}

impl Client {
    /// Used only by tests that need a registry entry without a live
    /// socket task behind it.
    pub fn new_disconnected() -> Self {
        Client {
            path: PathBuf::new(),
            state: ClientState::Disconnected,
            last_error: None,
            catalog: Vec::new(),
            cmd_tx: None,
        }
    }

    pub fn spawn(
        name: String,
        slot: u32,
        path: PathBuf,
        event_tx: mpsc::Sender<ClientEvent>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(4);
        let span = info_span!("client", driver = %name, slot);
        let handle = tokio::spawn(run(name, slot, path.clone(), cmd_rx, event_tx).instrument(span));

        (
            Client {
                path,
                state: ClientState::Disconnected,
                last_error: None,
                catalog: Vec::new(),
                cmd_tx: Some(cmd_tx),
            },
            handle,
        )
    }

    /// Sends an already-encoded command frame to the driver. Returns
    /// `false` if the client has no live task to receive it (shouldn't
    /// happen in production; only reachable via `new_disconnected`).
    pub fn send(&mut self, frame: Vec<u8>) -> bool {
        match &self.cmd_tx {
            Some(tx) => {
                self.state = ClientState::AwaitingResponse;
                tx.try_send(ClientCommand::Send(frame)).is_ok()
            }
            None => false,
        }
    }
}

async fn connect_with_backoff(path: &PathBuf, event_tx: &mpsc::Sender<ClientEvent>, name: &str, slot: u32) -> UnixStream {
    for _ in 0..RETRY_IMMEDIATE {
        if let Ok(stream) = UnixStream::connect(path).await {
            return stream;
        }
    }

    let mut delay = BACKOFF_START;

    loop {
        report_state(
            event_tx,
            name,
            slot,
            ClientState::Reconnecting,
            Some(format!("connecting to {}", path.display())),
        )
        .await;

        tokio::time::sleep(delay).await;

        match UnixStream::connect(path).await {
            Ok(stream) => return stream,
            Err(e) => {
                warn!(driver = name, slot, "connect failed: {e}");
                delay = (delay * 2).min(BACKOFF_CAP);
            }
        }
    }
}

async fn report_state(
    event_tx: &mpsc::Sender<ClientEvent>,
    name: &str,
    slot: u32,
    state: ClientState,
    last_error: Option<String>,
) {
    let _ = event_tx
        .send(ClientEvent::StateChanged {
            name: name.to_owned(),
            slot,
            state,
            last_error,
        })
        .await;
}

/// One connect/serve cycle. Returns the I/O error that ended it, or
/// `None` if the peer simply closed its end (EOF).
async fn serve(
    stream: &mut UnixStream,
    name: &str,
    slot: u32,
    cmd_rx: &mut mpsc::Receiver<ClientCommand>,
    event_tx: &mpsc::Sender<ClientEvent>,
) -> Option<Error> {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(bytes)) => {
                        if let Err(e) = stream.write_all(&bytes).await {
                            return Some(e.into());
                        }
                    }
                    None => return None,
                }
            }

            sig = stream.read_u8() => {
                let sig = match sig {
                    Ok(b) => b,
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        return None;
                    }
                    Err(e) => return Some(e.into()),
                };

                match Signature::from_byte(sig) {
                    Ok(Signature::Info) => {
                        report_state(event_tx, name, slot, ClientState::ReadingInfoHeader, None).await;

                        let mut header = [0u8; InfoFrame::HEADER_LEN];
                        if let Err(e) = stream.read_exact(&mut header).await {
                            return Some(e.into());
                        }

                        let commands_number = InfoFrame::commands_number(&header);
                        let mut body = vec![0u8; InfoFrame::body_len(commands_number)];
                        body[..InfoFrame::HEADER_LEN].copy_from_slice(&header);

                        report_state(event_tx, name, slot, ClientState::ReadingInfoBody, None).await;

                        if let Err(e) = stream.read_exact(&mut body[InfoFrame::HEADER_LEN..]).await {
                            return Some(e.into());
                        }

                        let info = match InfoFrame::decode(&body) {
                            Ok(info) => info,
                            Err(e) => return Some(e),
                        };

                        debug!(driver = name, slot, commands = info.commands.len(), "catalog installed");

                        let _ = event_tx
                            .send(ClientEvent::CatalogReady {
                                name: name.to_owned(),
                                slot,
                                commands: info.commands,
                            })
                            .await;

                        report_state(event_tx, name, slot, ClientState::Idle, None).await;
                    }

                    Ok(Signature::Response) => {
                        report_state(event_tx, name, slot, ClientState::ReadingRespHeader, None).await;

                        let mut header = [0u8; ResponseFrame::HEADER_LEN];
                        if let Err(e) = stream.read_exact(&mut header).await {
                            return Some(e.into());
                        }

                        let len = ResponseFrame::payload_len(&header);
                        let mut body = vec![0u8; ResponseFrame::body_len(len)];
                        body[..ResponseFrame::HEADER_LEN].copy_from_slice(&header);

                        report_state(event_tx, name, slot, ClientState::ReadingRespBody, None).await;

                        if let Err(e) = stream.read_exact(&mut body[ResponseFrame::HEADER_LEN..]).await {
                            return Some(e.into());
                        }

                        let resp = match ResponseFrame::decode(&body) {
                            Ok(resp) => resp,
                            Err(e) => return Some(e),
                        };

                        let _ = event_tx
                            .send(ClientEvent::Response {
                                name: name.to_owned(),
                                slot,
                                payload: resp.payload,
                            })
                            .await;

                        report_state(event_tx, name, slot, ClientState::Idle, None).await;
                    }

                    Ok(Signature::Command) | Err(_) => {
                        return Some(Error::BadSignature(sig));
                    }
                }
            }
        }
    }
}

async fn run(
    name: String,
    slot: u32,
    path: PathBuf,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
    event_tx: mpsc::Sender<ClientEvent>,
) {
    loop {
        let mut stream = connect_with_backoff(&path, &event_tx, &name, slot).await;

        info!(driver = %name, slot, "connected");
        report_state(&event_tx, &name, slot, ClientState::ExpectSignature, None).await;

        let err = serve(&mut stream, &name, slot, &mut cmd_rx, &event_tx).await;

        if cmd_rx.is_closed() {
            report_state(&event_tx, &name, slot, ClientState::Closed, None).await;
            return;
        }

        let msg = err.map(|e| e.to_string());
        warn!(driver = %name, slot, "disconnected: {:?}", msg);
        report_state(&event_tx, &name, slot, ClientState::Reconnecting, msg).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    fn tmp_socket_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("drvshelld-test-{tag}-{}.sock", std::process::id()))
    }

    #[tokio::test]
    async fn fetches_catalog_and_receives_response() {
        let path = tmp_socket_path("catalog");
        let _ = std::fs::remove_file(&path);

        let listener = UnixListener::bind(&path).unwrap();
        let (event_tx, mut event_rx) = mpsc::channel(16);

        let (mut client, _handle) =
            Client::spawn("thermo".into(), 3, path.clone(), event_tx);

        let (mut server_side, _) = listener.accept().await.unwrap();

        let mut info_bytes = vec![Signature::Info as u8];
        info_bytes.extend_from_slice(&1u16.to_ne_bytes());

        let mut name_field = [0u8; 32];
        name_field[..4].copy_from_slice(b"read");
        let mut descr_field = [0u8; 128];
        descr_field[..15].copy_from_slice(b"get temperature");

        info_bytes.extend_from_slice(&name_field);
        info_bytes.extend_from_slice(&descr_field);
        info_bytes.push(0);

        server_side.write_all(&info_bytes).await.unwrap();

        let mut got_catalog = false;
        while let Some(event) = event_rx.recv().await {
            if let ClientEvent::CatalogReady { commands, .. } = event {
                assert_eq!(commands.len(), 1);
                assert_eq!(commands[0].name, "read");
                got_catalog = true;
                break;
            }
        }
        assert!(got_catalog);

        client.send(vec![1, 2, 3]);

        let mut buf = [0u8; 3];
        server_side.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3]);

        let mut resp = vec![Signature::Response as u8];
        resp.extend_from_slice(&2u32.to_ne_bytes());
        resp.extend_from_slice(b"ok");
        server_side.write_all(&resp).await.unwrap();

        let mut got_response = false;
        while let Some(event) = event_rx.recv().await {
            if let ClientEvent::Response { payload, .. } = event {
                assert_eq!(payload, b"ok");
                got_response = true;
                break;
            }
        }
        assert!(got_response);

        drop(server_side);
        let _ = std::fs::remove_file(&path);
    }
}
