//! Filesystem change subscription for the change applier.
//!
//! Wraps a recursive `notify` watcher over the host root and translates OS
//! events into section-namespace change actions. The single writer thread
//! blocks on the channel between batches; once an event arrives, the
//! debounce window drains whatever else the OS has coalesced.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::source::PathMap;

/// Change actions the applier understands, in section namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Added,
    Removed,
    Modified,
    RenamedOld,
    RenamedNew,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub action: ChangeAction,
    pub path: Vec<u16>,
}

/// Recursive watcher over the host root.
pub struct ChangeWatch {
    // Held for its Drop; dropping it tears the subscription down.
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    map: PathMap,
    debounce: Duration,
}

impl ChangeWatch {
    pub fn new(map: PathMap, debounce: Duration) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(map.host_root(), RecursiveMode::Recursive)?;
        info!(path = %map.host_root().display(), "change watch started");

        Ok(Self {
            _watcher: watcher,
            rx,
            map,
            debounce,
        })
    }

    /// Block until at least one event arrives, then drain the debounce
    /// window. Returns `None` once the watcher backend shuts down.
    pub fn next_batch(&self) -> Option<Vec<ChangeEvent>> {
        let mut events = Vec::new();
        self.collect(self.rx.recv().ok()?, &mut events);

        let deadline = Instant::now() + self.debounce;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.rx.recv_timeout(remaining) {
                Ok(res) => self.collect(res, &mut events),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Some(events)
    }

    fn collect(&self, res: notify::Result<Event>, out: &mut Vec<ChangeEvent>) {
        match res {
            Ok(event) => out.extend(translate(&self.map, event)),
            Err(e) => warn!(error = %e, "watch backend error"),
        }
    }
}

/// Translate one OS event into section-namespace change events. Paths
/// outside the mapped root are dropped.
pub fn translate(map: &PathMap, event: Event) -> Vec<ChangeEvent> {
    let mut out = Vec::new();
    let mut push = |action: ChangeAction, host: &std::path::Path| {
        if let Some(path) = map.to_section(host) {
            out.push(ChangeEvent { action, path });
        }
    };

    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [old, new] = &event.paths[..] {
                push(ChangeAction::RenamedOld, old);
                push(ChangeAction::RenamedNew, new);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            for p in &event.paths {
                push(ChangeAction::RenamedOld, p);
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            for p in &event.paths {
                push(ChangeAction::RenamedNew, p);
            }
        }
        EventKind::Create(_) => {
            for p in &event.paths {
                push(ChangeAction::Added, p);
            }
        }
        EventKind::Remove(_) => {
            for p in &event.paths {
                push(ChangeAction::Removed, p);
            }
        }
        EventKind::Modify(_) => {
            for p in &event.paths {
                push(ChangeAction::Modified, p);
            }
        }
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffs_section::wpath::decode;
    use std::path::PathBuf;

    fn map() -> PathMap {
        PathMap::new(PathBuf::from("/data/tree"), "z:\\root")
    }

    #[test]
    fn create_and_remove_translate() {
        let events = translate(
            &map(),
            Event::new(EventKind::Create(notify::event::CreateKind::File))
                .add_path(PathBuf::from("/data/tree/new.txt")),
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, ChangeAction::Added);
        assert_eq!(decode(&events[0].path), "z:\\root\\new.txt");

        let events = translate(
            &map(),
            Event::new(EventKind::Remove(notify::event::RemoveKind::Any))
                .add_path(PathBuf::from("/data/tree/old.txt")),
        );
        assert_eq!(events[0].action, ChangeAction::Removed);
    }

    #[test]
    fn data_modification_translates_to_modified() {
        let events = translate(
            &map(),
            Event::new(EventKind::Modify(ModifyKind::Data(
                notify::event::DataChange::Content,
            )))
            .add_path(PathBuf::from("/data/tree/a/b.txt")),
        );
        assert_eq!(events[0].action, ChangeAction::Modified);
        assert_eq!(decode(&events[0].path), "z:\\root\\a\\b.txt");
    }

    #[test]
    fn rename_both_emits_old_then_new() {
        let events = translate(
            &map(),
            Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
                .add_path(PathBuf::from("/data/tree/a.txt"))
                .add_path(PathBuf::from("/data/tree/b.txt")),
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, ChangeAction::RenamedOld);
        assert_eq!(events[1].action, ChangeAction::RenamedNew);
        assert_eq!(decode(&events[1].path), "z:\\root\\b.txt");
    }

    #[test]
    fn foreign_paths_are_dropped() {
        let events = translate(
            &map(),
            Event::new(EventKind::Create(notify::event::CreateKind::File))
                .add_path(PathBuf::from("/elsewhere/new.txt")),
        );
        assert!(events.is_empty());
    }
}
