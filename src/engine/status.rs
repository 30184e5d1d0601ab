use std::sync::{Arc, RwLock};

/// Receives human-readable progress messages from a run.
///
/// Called inline from the loop, so implementations must return quickly.
pub trait StatusListener: Send + Sync {
    fn on_status(&self, message: &str, progress_percent: Option<u8>);
}

/// Fan-out to any number of listeners (UI, logs, tests).
#[derive(Default)]
pub struct StatusHub {
    listeners: RwLock<Vec<Arc<dyn StatusListener>>>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn StatusListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }

    pub fn emit(&self, message: &str, progress_percent: Option<u8>) {
        let listeners = match self.listeners.read() {
            Ok(l) => l.clone(),
            Err(_) => return,
        };
        for listener in listeners {
            listener.on_status(message, progress_percent);
        }
    }
}

/// Forwards status messages to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusListener;

impl StatusListener for TracingStatusListener {
    fn on_status(&self, message: &str, progress_percent: Option<u8>) {
        match progress_percent {
            Some(progress) => tracing::info!(progress, "{}", message),
            None => tracing::info!("{}", message),
        }
    }
}
