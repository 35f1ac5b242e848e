//! Global hotkey registration backend.
//!
//! The OS-level keyboard hook is an external collaborator; the engine
//! only needs registration bookkeeping and a way to be told a combo
//! fired. [`ManualHotkeyBackend`] records registrations and lets the
//! HTTP layer and tests fire combos by hand; a desktop build supplies a
//! real hook behind the same trait.

use parking_lot::Mutex;

/// Registration surface the engine drives when hotkey sentinels change.
pub trait HotkeyBackend: Send + Sync {
    /// Register a combo (e.g. `"ctrl+alt+r"`). Replaces any previous
    /// registration of the same combo.
    fn register(&self, combo: &str);
    /// Drop every registration.
    fn clear(&self);
    /// Currently registered combos.
    fn registered(&self) -> Vec<String>;
}

/// Default backend: pure bookkeeping, no OS hook.
#[derive(Default)]
pub struct ManualHotkeyBackend {
    combos: Mutex<Vec<String>>,
}

impl ManualHotkeyBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HotkeyBackend for ManualHotkeyBackend {
    fn register(&self, combo: &str) {
        let mut combos = self.combos.lock();
        if !combos.iter().any(|c| c == combo) {
            combos.push(combo.to_owned());
        }
    }

    fn clear(&self) {
        self.combos.lock().clear();
    }

    fn registered(&self) -> Vec<String> {
        self.combos.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_deduplicated() {
        let backend = ManualHotkeyBackend::new();
        backend.register("ctrl+alt+r");
        backend.register("ctrl+alt+r");
        backend.register("ctrl+shift+p");
        assert_eq!(backend.registered().len(), 2);
        backend.clear();
        assert!(backend.registered().is_empty());
    }
}
