#![deny(unsafe_code)]

mod client;
mod dispatch;
mod registry;
mod supervisor;

use client::{Client, ClientEvent};
use dispatch::{Dispatcher, Output};
use registry::Registry;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use supervisor::DirEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

type ClientHandles = HashMap<(String, u32), JoinHandle<()>>;

fn spawn_client(
    registry: &mut Registry,
    handles: &mut ClientHandles,
    name: String,
    slot: u32,
    path: PathBuf,
    event_tx: mpsc::Sender<ClientEvent>,
) {
    let (client, handle) = Client::spawn(name.clone(), slot, path, event_tx);

    handles.insert((name.clone(), slot), handle);
    registry.insert(name, slot, client);
}

fn apply_event_to_registry(registry: &mut Registry, event: &ClientEvent) {
    match event {
        ClientEvent::StateChanged {
            name,
            slot,
            state,
            last_error,
        } => {
            if let Some(rec) = registry.lookup_mut(name, *slot) {
                rec.client.state = *state;
                if last_error.is_some() {
                    rec.client.last_error = last_error.clone();
                }
            }
        }
        ClientEvent::CatalogReady {
            name,
            slot,
            commands,
        } => {
            if let Some(rec) = registry.lookup_mut(name, *slot) {
                rec.client.catalog = commands.clone();
            }
        }
        ClientEvent::Response { .. } => {}
    }
}

fn print_flush(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> drvsh_proto::Result<()> {
    let cfg = drvsh_config::get().await;
    drvsh_config::init_logging(cfg.get_log_level());

    std::fs::create_dir_all(&cfg.base_dir)?;
    std::env::set_current_dir(&cfg.base_dir)?;
    let base_dir = std::env::current_dir()?;

    let mut registry = Registry::new();
    let mut handles: ClientHandles = HashMap::new();
    let (client_tx, mut client_rx) = mpsc::channel::<ClientEvent>(256);

    for event in supervisor::initial_scan(&base_dir, &cfg.suffix)? {
        if let DirEvent::Created { name, slot, path } = event {
            spawn_client(&mut registry, &mut handles, name, slot, path, client_tx.clone());
        }
    }

    info!(count = registry.len(), "initial scan complete");

    let (_watcher, mut dir_rx) = supervisor::watch(base_dir, cfg.suffix.clone()).map_err(|e| {
        drvsh_proto::Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    })?;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut dispatcher = Dispatcher::new();

    loop {
        tokio::select! {
            dir_event = dir_rx.recv() => {
                match dir_event {
                    Some(DirEvent::Created { name, slot, path }) => {
                        spawn_client(&mut registry, &mut handles, name, slot, path, client_tx.clone());
                    }
                    Some(DirEvent::Deleted { name, slot }) => {
                        if let Some(handle) = handles.remove(&(name.clone(), slot)) {
                            handle.abort();
                        }
                        registry.remove(&name, slot);
                    }
                    Some(DirEvent::SelfDeleted) | None => {
                        warn!("base directory removed, shutting down");
                        break;
                    }
                }
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) => {
                        match dispatcher.handle_line(&mut registry, &text) {
                            Output::Text(s) => print_flush(&s),
                            Output::Quit => break,
                            Output::Deferred => {}
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("stdin read error: {e}");
                        break;
                    }
                }
            }

            Some(event) = client_rx.recv() => {
                apply_event_to_registry(&mut registry, &event);
                if let Some(text) = dispatcher.handle_client_event(&event) {
                    print_flush(&text);
                }
            }
        }
    }

    for (_, handle) in handles {
        handle.abort();
    }

    Ok(())
}
