//! Connectivity tracking.
//!
//! [`NetworkMonitor`] holds the current online flag and fires registered
//! callbacks on online↔offline transitions. Reports that repeat the current
//! state are coalesced, so flapping probes never fire a callback twice in a
//! row for the same state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

type Listener = Box<dyn Fn() + Send + Sync>;

struct ListenerPair {
    on_online: Listener,
    on_offline: Listener,
}

/// Current connectivity plus transition callbacks.
pub struct NetworkMonitor {
    state: watch::Sender<bool>,
    listeners: Mutex<Vec<ListenerPair>>,
}

impl NetworkMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self {
            state,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Register a pair of transition callbacks.
    ///
    /// Callbacks run inline on the thread reporting the transition, one at a
    /// time. They must return quickly and must not report connectivity back
    /// into this monitor.
    pub fn register_listeners<F, G>(&self, on_online: F, on_offline: G)
    where
        F: Fn() + Send + Sync + 'static,
        G: Fn() + Send + Sync + 'static,
    {
        let mut listeners = match self.listeners.lock() {
            Ok(l) => l,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.push(ListenerPair {
            on_online: Box::new(on_online),
            on_offline: Box::new(on_offline),
        });
    }

    /// Watch channel for async consumers.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Report observed connectivity. Returns `true` if this was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            tracing::info!(online, "connectivity changed");
            let listeners = match self.listeners.lock() {
                Ok(l) => l,
                Err(poisoned) => poisoned.into_inner(),
            };
            for pair in listeners.iter() {
                if online {
                    (pair.on_online)();
                } else {
                    (pair.on_offline)();
                }
            }
        }

        changed
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

/// A reachability check feeding the monitor.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn check(&self) -> bool;
}

/// Probe that treats any HTTP response from the API host as reachable.
pub struct HttpProbe {
    client: reqwest::Client,
    url: url::Url,
}

impl HttpProbe {
    pub fn new(url: url::Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn check(&self) -> bool {
        match self.client.head(self.url.clone()).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "reachability probe failed");
                false
            }
        }
    }
}

/// Poll `probe` every `interval` and feed the result into `monitor`.
pub fn spawn_probe(
    monitor: Arc<NetworkMonitor>,
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let online = probe.check().await;
            monitor.set_online(online);
        }
    })
}
