use std::sync::{Arc, Mutex};

use serde_json::Value;

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

pub fn listener(f: impl Fn(&Value) + Send + Sync + 'static) -> Listener {
    Arc::new(f)
}

/// Handle returned by `listen`-style registrations. Returns whether the
/// listener was still registered.
pub type Unsubscribe = Box<dyn FnOnce() -> bool + Send + Sync>;

struct Entry {
    event: String,
    listener: Listener,
    once: bool,
}

/// Event-name to listener-list registry. Listeners run in registration order
/// and are removed by identity.
#[derive(Default)]
pub struct EventEmitter {
    entries: Mutex<Vec<Entry>>,
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event: &str, listener: Listener) {
        self.push(event, listener, false);
    }

    pub fn once(&self, event: &str, listener: Listener) {
        self.push(event, listener, true);
    }

    fn push(&self, event: &str, listener: Listener, once: bool) {
        if let Ok(mut g) = self.entries.lock() {
            g.push(Entry {
                event: event.to_owned(),
                listener,
                once,
            });
        }
    }

    /// Removes the first registration of `listener` for `event`.
    pub fn off(&self, event: &str, listener: &Listener) -> bool {
        let Ok(mut g) = self.entries.lock() else {
            return false;
        };
        match g
            .iter()
            .position(|e| e.event == event && same_listener(&e.listener, listener))
        {
            Some(idx) => {
                g.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Registers `listener` and hands back a closure that removes it again.
    pub fn subscribe(self: &Arc<Self>, event: &str, listener: Listener) -> Unsubscribe {
        self.on(event, Arc::clone(&listener));
        let emitter = Arc::clone(self);
        let event = event.to_owned();
        Box::new(move || emitter.off(&event, &listener))
    }

    pub fn remove_all_listeners(&self, event: Option<&str>) {
        if let Ok(mut g) = self.entries.lock() {
            match event {
                Some(event) => g.retain(|e| e.event != event),
                None => g.clear(),
            }
        }
    }

    /// Calls every listener of `event`. Returns whether any listener ran.
    pub fn emit(&self, event: &str, payload: &Value) -> bool {
        let listeners: Vec<Listener> = {
            let Ok(mut g) = self.entries.lock() else {
                return false;
            };
            let selected = g
                .iter()
                .filter(|e| e.event == event)
                .map(|e| Arc::clone(&e.listener))
                .collect();
            g.retain(|e| !(e.once && e.event == event));
            selected
        };
        // Listeners may re-enter the emitter, so the lock is released first.
        for listener in &listeners {
            listener(payload);
        }
        !listeners.is_empty()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.entries
            .lock()
            .map(|g| g.iter().filter(|e| e.event == event).count())
            .unwrap_or(0)
    }

    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        if let Ok(g) = self.entries.lock() {
            for e in g.iter() {
                if !names.contains(&e.event) {
                    names.push(e.event.clone());
                }
            }
        }
        names
    }

    /// Every (event, listener) registration in registration order.
    pub fn listener_pairs(&self) -> Vec<(String, Listener)> {
        self.entries
            .lock()
            .map(|g| {
                g.iter()
                    .map(|e| (e.event.clone(), Arc::clone(&e.listener)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emission_follows_registration_order() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            emitter.on(
                "chainChanged",
                listener(move |_| seen.lock().expect("seen lock").push(tag)),
            );
        }
        assert!(emitter.emit("chainChanged", &Value::Null));
        assert_eq!(*seen.lock().expect("seen lock"), vec!["a", "b", "c"]);
    }

    #[test]
    fn off_removes_by_identity_only() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = {
            let hits = Arc::clone(&hits);
            listener(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let other = listener(|_| {});
        emitter.on("connect", Arc::clone(&counted));
        emitter.on("connect", Arc::clone(&other));

        assert!(emitter.off("connect", &counted));
        assert!(!emitter.off("connect", &counted));
        assert_eq!(emitter.listener_count("connect"), 1);
        emitter.emit("connect", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn subscribe_returns_working_unsubscribe() {
        let emitter = Arc::new(EventEmitter::new());
        let unsubscribe = emitter.subscribe("change", listener(|_| {}));
        assert_eq!(emitter.listener_count("change"), 1);
        assert!(unsubscribe());
        assert_eq!(emitter.listener_count("change"), 0);
    }

    #[test]
    fn once_listener_runs_a_single_time() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        emitter.once(
            "disconnect",
            listener(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        emitter.emit("disconnect", &Value::Null);
        emitter.emit("disconnect", &Value::Null);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
