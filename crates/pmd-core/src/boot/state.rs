use std::{collections::HashMap, sync::Mutex};

use tokio::sync::watch;

type Slot = watch::Sender<Option<bool>>;

/// Write-once boolean flags keyed by name, awaited by dependents.
///
/// Keys spring into existence on first use, so waiting may precede the release.
#[derive(Default)]
pub struct StateMachine {
    keys: Mutex<HashMap<String, Slot>>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until every key is released; returns the AND of their values.
    ///
    /// Returns `false` as soon as one awaited key is released `false`.
    pub async fn wait<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        for key in keys {
            let mut rx = self.with_slot(key.as_ref(), Slot::subscribe);
            if !matches!(rx.wait_for(Option::is_some).await.as_deref(), Ok(Some(true))) {
                return false;
            }
        }
        true
    }

    /// Waits until every key is released, whatever the values.
    pub async fn wait_all<S: AsRef<str>>(&self, keys: &[S]) {
        for key in keys {
            let mut rx = self.with_slot(key.as_ref(), Slot::subscribe);
            let _ = rx.wait_for(Option::is_some).await;
        }
    }

    /// Releases `key` with `value`. Returns `false` if it was already released.
    pub fn release(&self, key: &str, value: bool) -> bool {
        self.with_slot(key, |slot| {
            slot.send_if_modified(|state| {
                if state.is_some() {
                    return false;
                }
                *state = Some(value);
                true
            })
        })
    }

    pub fn is_released(&self, key: &str) -> Option<bool> {
        self.with_slot(key, |slot| *slot.borrow())
    }

    fn with_slot<R>(&self, key: &str, f: impl FnOnce(&Slot) -> R) -> R {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        let slot = keys
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(None).0);
        f(slot)
    }
}
