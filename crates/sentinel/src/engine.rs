//! The sentinel engine: owns the watcher subsystems and the persisted
//! definitions, and funnels every trigger through one callback.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use rh_domain::error::{Error, Result};

use crate::hotkey::HotkeyBackend;
use crate::model::{
    FileSentinel, HotkeySentinel, SentinelDoc, SentinelKind, TimeSentinel, TimeUnit,
};

/// Cross-thread delivery function for trigger messages.
pub type SentinelCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Per-path debounce window for file events.
const FILE_DEBOUNCE: Duration = Duration::from_secs(1);

/// Scheduler tick for time sentinels.
const TICK: Duration = Duration::from_secs(1);

/// Cheaply clonable handle; the watcher tasks share the same inner
/// state.
pub struct SentinelEngine {
    inner: Arc<Inner>,
}

struct Inner {
    config_path: PathBuf,
    doc: RwLock<SentinelDoc>,
    callback: RwLock<Option<SentinelCallback>>,
    hotkeys: Arc<dyn HotkeyBackend>,
    running: AtomicBool,
    time_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    file_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched_roots: Mutex<Vec<PathBuf>>,
}

impl SentinelEngine {
    pub fn new(config_path: &Path, hotkeys: Arc<dyn HotkeyBackend>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config_path: config_path.to_path_buf(),
                doc: RwLock::new(SentinelDoc::default()),
                callback: RwLock::new(None),
                hotkeys,
                running: AtomicBool::new(false),
                time_task: Mutex::new(None),
                file_task: Mutex::new(None),
                watcher: Mutex::new(None),
                watched_roots: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Install the single trigger delivery function.
    pub fn set_callback(&self, callback: SentinelCallback) {
        *self.inner.callback.write() = Some(callback);
    }

    /// Load persisted sentinels and start all three watcher subsystems.
    pub fn start(&self) {
        let inner = &self.inner;
        if inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.load();

        // Time scheduler: one 1-second tick loop over due timestamps.
        let time_inner = Arc::clone(inner);
        *inner.time_task.lock() = Some(tokio::spawn(async move {
            time_inner.run_time_loop().await;
        }));

        // Filesystem watcher: notify events drain into a tokio task that
        // debounces per sentinel.
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<notify::Event>>();
        match RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        ) {
            Ok(watcher) => {
                *inner.watcher.lock() = Some(watcher);
                let file_inner = Arc::clone(inner);
                *inner.file_task.lock() = Some(tokio::spawn(async move {
                    file_inner.run_file_loop(raw_rx).await;
                }));
                inner.apply_file_watches();
            }
            Err(e) => {
                tracing::warn!(error = %e, "filesystem watcher unavailable, file sentinels disabled");
            }
        }

        inner.apply_hotkeys();
        tracing::info!(
            time = inner.doc.read().time.len(),
            file = inner.doc.read().file.len(),
            hotkey = inner.doc.read().behavior.len(),
            "sentinel engine started"
        );
    }

    /// Unregister everything and stop the watcher tasks.
    pub fn stop(&self) {
        let inner = &self.inner;
        if !inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = inner.time_task.lock().take() {
            task.abort();
        }
        if let Some(task) = inner.file_task.lock().take() {
            task.abort();
        }
        *inner.watcher.lock() = None;
        inner.watched_roots.lock().clear();
        inner.hotkeys.clear();
        tracing::info!("sentinel engine stopped");
    }

    // ── Mutations ──────────────────────────────────────────────────

    pub fn add_time(&self, interval: u64, unit: TimeUnit, description: &str) -> Result<String> {
        if interval == 0 {
            return Err(Error::Config("sentinel interval must be at least 1".into()));
        }
        let id = format!("time_{}", short_id());
        self.inner.doc.write().time.insert(
            id.clone(),
            TimeSentinel {
                interval,
                unit,
                description: description.to_owned(),
            },
        );
        self.inner.persist();
        Ok(id)
    }

    pub fn add_file(&self, path: &str, description: &str) -> Result<String> {
        if !Path::new(path).exists() {
            return Err(Error::NotFound(format!("path '{path}' does not exist")));
        }
        let id = format!("file_{}", short_id());
        self.inner.doc.write().file.insert(
            id.clone(),
            FileSentinel {
                path: path.to_owned(),
                description: description.to_owned(),
            },
        );
        self.inner.persist();
        if self.inner.running.load(Ordering::SeqCst) {
            self.inner.apply_file_watches();
        }
        Ok(id)
    }

    pub fn add_hotkey(&self, key_combo: &str, description: &str) -> Result<String> {
        let id = format!("behavior_{}", short_id());
        self.inner.doc.write().behavior.insert(
            id.clone(),
            HotkeySentinel {
                key_combo: key_combo.to_owned(),
                description: description.to_owned(),
            },
        );
        self.inner.persist();
        if self.inner.running.load(Ordering::SeqCst) {
            self.inner.hotkeys.register(key_combo);
        }
        Ok(id)
    }

    /// Remove a sentinel and re-apply registrations for its kind.
    pub fn remove(&self, kind: SentinelKind, id: &str) -> bool {
        let removed = {
            let mut doc = self.inner.doc.write();
            match kind {
                SentinelKind::Time => doc.time.remove(id).is_some(),
                SentinelKind::File => doc.file.remove(id).is_some(),
                SentinelKind::Hotkey => doc.behavior.remove(id).is_some(),
            }
        };
        if !removed {
            return false;
        }
        self.inner.persist();
        if self.inner.running.load(Ordering::SeqCst) {
            match kind {
                // The time loop re-reads the document every tick.
                SentinelKind::Time => {}
                SentinelKind::File => self.inner.apply_file_watches(),
                SentinelKind::Hotkey => self.inner.apply_hotkeys(),
            }
        }
        true
    }

    /// Snapshot of the persisted document (kind → id → payload).
    pub fn list(&self) -> SentinelDoc {
        self.inner.doc.read().clone()
    }

    /// Deliver a hotkey press. Called by the OS backend or the HTTP
    /// layer. Returns whether any sentinel matched.
    pub fn fire_hotkey(&self, key_combo: &str) -> bool {
        let matched: Vec<HotkeySentinel> = self
            .inner
            .doc
            .read()
            .behavior
            .values()
            .filter(|s| s.key_combo == key_combo)
            .cloned()
            .collect();
        for sentinel in &matched {
            self.inner.trigger(format!(
                "[Behavior Sentinel Triggered] Hotkey '{}' pressed. | Action: {}",
                sentinel.key_combo, sentinel.description
            ));
        }
        !matched.is_empty()
    }
}

impl Inner {
    // ── Persistence ────────────────────────────────────────────────

    fn load(&self) {
        if !self.config_path.exists() {
            return;
        }
        match std::fs::read_to_string(&self.config_path) {
            Ok(raw) => match serde_json::from_str::<SentinelDoc>(&raw) {
                Ok(doc) => *self.doc.write() = doc,
                Err(e) => tracing::warn!(error = %e, "malformed sentinels.json, starting empty"),
            },
            Err(e) => tracing::warn!(error = %e, "failed to read sentinels.json"),
        }
    }

    fn persist(&self) {
        let doc = self.doc.read().clone();
        if let Some(parent) = self.config_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&doc) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.config_path, json) {
                    tracing::warn!(error = %e, "failed to persist sentinels");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize sentinels"),
        }
    }

    // ── Trigger delivery ───────────────────────────────────────────

    fn trigger(&self, message: String) {
        tracing::info!(message = %message, "sentinel triggered");
        let Some(callback) = self.callback.read().clone() else {
            return;
        };
        // Deliver off the watcher's thread of control.
        tokio::spawn(async move {
            callback(message);
        });
    }

    // ── Time subsystem ─────────────────────────────────────────────

    async fn run_time_loop(self: Arc<Self>) {
        let mut due: HashMap<String, tokio::time::Instant> = HashMap::new();
        loop {
            tokio::time::sleep(TICK).await;
            if !self.running.load(Ordering::SeqCst) {
                return;
            }

            let now = tokio::time::Instant::now();
            let sentinels = self.doc.read().time.clone();
            due.retain(|id, _| sentinels.contains_key(id));

            for (id, sentinel) in &sentinels {
                let period =
                    Duration::from_secs(sentinel.unit.to_seconds(sentinel.interval).max(1));
                match due.get(id) {
                    None => {
                        due.insert(id.clone(), now + period);
                    }
                    Some(&deadline) if deadline <= now => {
                        due.insert(id.clone(), now + period);
                        self.trigger(format!(
                            "[Time Sentinel Triggered] ID: {id} | Task: {}",
                            sentinel.description
                        ));
                    }
                    Some(_) => {}
                }
            }
        }
    }

    // ── File subsystem ─────────────────────────────────────────────

    /// Watch root for a sentinel path: the file's parent directory, or
    /// the directory itself.
    fn watch_root(path: &Path) -> PathBuf {
        if path.is_file() {
            path.parent().unwrap_or(path).to_path_buf()
        } else {
            path.to_path_buf()
        }
    }

    /// Re-register the notify watcher against the current file sentinels.
    fn apply_file_watches(&self) {
        let mut guard = self.watcher.lock();
        let Some(watcher) = guard.as_mut() else {
            return;
        };

        let mut roots = self.watched_roots.lock();
        for root in roots.drain(..) {
            let _ = watcher.unwatch(&root);
        }

        for sentinel in self.doc.read().file.values() {
            let path = Path::new(&sentinel.path);
            if !path.exists() {
                tracing::warn!(path = %sentinel.path, "file sentinel path missing, skipping watch");
                continue;
            }
            let root = Self::watch_root(path);
            if roots.contains(&root) {
                continue;
            }
            match watcher.watch(&root, RecursiveMode::NonRecursive) {
                Ok(()) => roots.push(root),
                Err(e) => {
                    tracing::warn!(path = %root.display(), error = %e, "failed to watch path");
                }
            }
        }
    }

    async fn run_file_loop(
        self: Arc<Self>,
        mut raw_rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    ) {
        let mut last_fired: HashMap<String, tokio::time::Instant> = HashMap::new();

        while let Some(event) = raw_rx.recv().await {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            let event = match event {
                Ok(ev) => ev,
                Err(e) => {
                    tracing::warn!(error = %e, "filesystem watcher error");
                    continue;
                }
            };
            if !matches!(
                event.kind,
                notify::EventKind::Create(_)
                    | notify::EventKind::Modify(_)
                    | notify::EventKind::Remove(_)
            ) {
                continue;
            }

            // Directory-only churn and the engine's own persistence
            // writes never count as triggers.
            let paths: Vec<&PathBuf> = event
                .paths
                .iter()
                .filter(|p| !p.is_dir() && p.as_path() != self.config_path.as_path())
                .collect();
            if paths.is_empty() {
                continue;
            }

            let sentinels = self.doc.read().file.clone();
            let now = tokio::time::Instant::now();
            for (id, sentinel) in &sentinels {
                let root = Self::watch_root(Path::new(&sentinel.path));
                let Some(hit) = paths.iter().find(|p| p.starts_with(&root)) else {
                    continue;
                };
                if let Some(&last) = last_fired.get(id) {
                    if now.duration_since(last) < FILE_DEBOUNCE {
                        continue;
                    }
                }
                last_fired.insert(id.clone(), now);
                self.trigger(format!(
                    "[File Sentinel Triggered] Path: {} | Event: {:?} | Watch Reason: {}",
                    hit.display(),
                    event.kind,
                    sentinel.description
                ));
            }
        }
    }

    fn apply_hotkeys(&self) {
        self.hotkeys.clear();
        for sentinel in self.doc.read().behavior.values() {
            self.hotkeys.register(&sentinel.key_combo);
        }
    }
}

fn short_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::ManualHotkeyBackend;

    fn engine(dir: &Path) -> SentinelEngine {
        SentinelEngine::new(
            &dir.join("sentinels.json"),
            Arc::new(ManualHotkeyBackend::new()),
        )
    }

    #[tokio::test]
    async fn definitions_survive_restart() {
        let tmp = tempfile::tempdir().unwrap();

        let first = engine(tmp.path());
        let time_id = first.add_time(5, TimeUnit::Minutes, "poll inbox").unwrap();
        let hk_id = first.add_hotkey("ctrl+alt+r", "quick note").unwrap();

        let second = engine(tmp.path());
        second.start();
        let doc = second.list();
        assert!(doc.time.contains_key(&time_id));
        assert!(doc.behavior.contains_key(&hk_id));
        second.stop();
    }

    #[tokio::test]
    async fn removed_sentinels_stay_removed_after_restart() {
        let tmp = tempfile::tempdir().unwrap();

        let first = engine(tmp.path());
        let id = first.add_time(1, TimeUnit::Hours, "report").unwrap();
        assert!(first.remove(SentinelKind::Time, &id));
        assert!(!first.remove(SentinelKind::Time, &id));

        let second = engine(tmp.path());
        second.start();
        assert!(second.list().is_empty());
        second.stop();
    }

    #[tokio::test]
    async fn time_sentinel_fires_through_callback() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        engine.add_time(1, TimeUnit::Seconds, "Heartbeat").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        engine.set_callback(Arc::new(move |msg| {
            let _ = tx.send(msg);
        }));
        engine.start();

        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("time sentinel did not fire")
            .unwrap();
        assert!(msg.contains("Time Sentinel Triggered"));
        assert!(msg.contains("Heartbeat"));
        engine.stop();
    }

    #[tokio::test]
    async fn fire_hotkey_matches_registered_combo() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        engine.add_hotkey("ctrl+alt+r", "capture idea").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        engine.set_callback(Arc::new(move |msg| {
            let _ = tx.send(msg);
        }));

        assert!(engine.fire_hotkey("ctrl+alt+r"));
        assert!(!engine.fire_hotkey("ctrl+q"));

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(msg.contains("Behavior Sentinel Triggered"));
        assert!(msg.contains("capture idea"));
    }

    #[tokio::test]
    async fn file_sentinel_requires_existing_path() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        assert!(engine.add_file("/no/such/path/at/all", "watch").is_err());
    }

    #[tokio::test]
    async fn hotkey_registrations_follow_mutations() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Arc::new(ManualHotkeyBackend::new());
        let engine = SentinelEngine::new(&tmp.path().join("sentinels.json"), backend.clone());
        engine.start();

        let id = engine.add_hotkey("ctrl+alt+x", "x").unwrap();
        assert_eq!(backend.registered(), vec!["ctrl+alt+x".to_string()]);

        engine.remove(SentinelKind::Hotkey, &id);
        assert!(backend.registered().is_empty());
        engine.stop();
    }

    #[tokio::test]
    #[ignore = "depends on OS filesystem watcher timing"]
    async fn file_sentinel_fires_on_modification() {
        let tmp = tempfile::tempdir().unwrap();
        let watched = tmp.path().join("watched.txt");
        std::fs::write(&watched, "initial").unwrap();

        let engine = engine(tmp.path());
        engine
            .add_file(watched.to_str().unwrap(), "config drift")
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        engine.set_callback(Arc::new(move |msg| {
            let _ = tx.send(msg);
        }));
        engine.start();

        // Give the watcher a moment to arm before touching the file.
        tokio::time::sleep(Duration::from_millis(500)).await;
        std::fs::write(&watched, "changed").unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("file sentinel did not fire")
            .unwrap();
        assert!(msg.contains("File Sentinel Triggered"));
        assert!(msg.contains("config drift"));
        engine.stop();
    }
}
