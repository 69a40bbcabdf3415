//! Directory supervisor: initial scan plus live watch of the base
//! directory, translating filesystem reality into registry mutations.

use drvsh_proto::endpoint;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{error, info_span, warn};
use tracing_futures::Instrument;

/// What the supervisor hands the reactor. Matches the three-event
/// contract: a socket appearing, a socket disappearing, or the base
/// directory itself disappearing.
#[derive(Debug)]
pub enum DirEvent {
    Created { name: String, slot: u32, path: PathBuf },
    Deleted { name: String, slot: u32 },
    SelfDeleted,
}

fn is_socket(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| {
            use std::os::unix::fs::FileTypeExt;
            m.file_type().is_socket()
        })
        .unwrap_or(false)
}

fn classify(path: &Path, suffix: &str) -> Option<(String, u32)> {
    let file_name = path.file_name()?.to_str()?;
    endpoint::parse(file_name, suffix).map(|(name, slot)| (name.to_owned(), slot))
}

/// Scans `base_dir` once, returning `Created` events for every matching
/// socket in lexicographic order. Non-sockets and names that don't
/// parse the endpoint grammar are silently skipped.
pub fn initial_scan(base_dir: &Path, suffix: &str) -> std::io::Result<Vec<DirEvent>> {
    let mut entries: Vec<_> = std::fs::read_dir(base_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();

    entries.sort();

    let events = entries
        .into_iter()
        .filter(|p| is_socket(p))
        .filter_map(|p| {
            let (name, slot) = classify(&p, suffix)?;
            Some(DirEvent::Created { name, slot, path: p })
        })
        .collect();

    Ok(events)
}

/// Installs a `notify` watch on `base_dir` and spawns a bridging task
/// that translates raw filesystem events into [`DirEvent`]s delivered
/// on the returned channel. The `Watcher` itself is returned so the
/// caller keeps it alive for the life of the process -- dropping it
/// tears down the OS-level watch.
pub fn watch(
    base_dir: PathBuf,
    suffix: String,
) -> notify::Result<(Box<dyn Watcher + Send>, mpsc::Receiver<DirEvent>)> {
    let (raw_tx, mut raw_rx) = mpsc::channel::<notify::Result<Event>>(64);
    let (dir_tx, dir_rx) = mpsc::channel(64);

    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = raw_tx.blocking_send(res);
    })?;

    watcher.watch(&base_dir, RecursiveMode::NonRecursive)?;

    let watch_root = base_dir;

    tokio::spawn(
        async move {
            while let Some(res) = raw_rx.recv().await {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        error!("directory watch error: {e}");
                        continue;
                    }
                };

                let is_root_removed = matches!(event.kind, EventKind::Remove(_))
                    && event.paths.iter().any(|p| p == &watch_root);

                if is_root_removed {
                    let _ = dir_tx.send(DirEvent::SelfDeleted).await;
                    break;
                }

                for path in &event.paths {
                    match event.kind {
                        EventKind::Create(_) => {
                            if !is_socket(path) {
                                continue;
                            }

                            match classify(path, &suffix) {
                                Some((name, slot)) => {
                                    let _ = dir_tx
                                        .send(DirEvent::Created {
                                            name,
                                            slot,
                                            path: path.clone(),
                                        })
                                        .await;
                                }
                                None => {
                                    warn!(path = %path.display(), "ignoring unrecognized entry")
                                }
                            }
                        }

                        EventKind::Remove(_) => match classify(path, &suffix) {
                            Some((name, slot)) => {
                                let _ = dir_tx.send(DirEvent::Deleted { name, slot }).await;
                            }
                            None => {
                                warn!(path = %path.display(), "delete for unrecognized entry")
                            }
                        },

                        _ => {}
                    }
                }
            }
        }
        .instrument(info_span!("dirwatch")),
    );

    Ok((Box::new(watcher), dir_rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_scan_finds_matching_sockets() {
        let dir = std::env::temp_dir().join(format!(
            "drvshelld-scan-test-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let sock_path = dir.join("thermo.3.drv");
        let _listener = std::os::unix::net::UnixListener::bind(&sock_path).unwrap();

        std::fs::write(dir.join("not-a-socket.drv"), b"hello").unwrap();
        std::fs::write(dir.join("thermo.3.other"), b"hello").unwrap();

        let events = initial_scan(&dir, "drv").unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            DirEvent::Created { name, slot, .. } => {
                assert_eq!(name, "thermo");
                assert_eq!(*slot, 3);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
