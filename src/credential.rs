//! Credential Pool
//!
//! Tiered credential discovery with failure quarantine. Candidates are
//! recomputed on every acquisition so newly added credentials are picked up
//! immediately; only failure state (the quarantine map) is cached. Quarantine
//! is keyed by credential value, so the same secret is never retried twice
//! within the window regardless of which tier exposed it.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Compiled-in last-resort credential, always the final candidate.
pub const FALLBACK_CREDENTIAL: &str = "scribe-local-dev-credential";

/// Tier a credential was discovered from, in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialTier {
    Caller,
    SharedPool,
    Environment,
    Fallback,
}

/// One usable access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub source: CredentialTier,
    pub value: String,
}

/// Per-caller credential lookup. Returns zero or one credential.
pub trait CallerCredentialSource: Send + Sync {
    fn for_caller(&self, caller: &str) -> Option<String>;
}

/// Shared-pool credential lookup.
pub trait SharedCredentialSource: Send + Sync {
    fn all(&self) -> Vec<String>;
}

/// Map-backed caller source; entries can be added at runtime and show up on
/// the next acquisition.
#[derive(Default)]
pub struct StaticCallerSource {
    creds: RwLock<HashMap<String, String>>,
}

impl StaticCallerSource {
    pub fn new(creds: HashMap<String, String>) -> Self {
        Self {
            creds: RwLock::new(creds),
        }
    }

    pub fn insert(&self, caller: impl Into<String>, value: impl Into<String>) {
        self.creds.write().insert(caller.into(), value.into());
    }
}

impl CallerCredentialSource for StaticCallerSource {
    fn for_caller(&self, caller: &str) -> Option<String> {
        self.creds.read().get(caller).cloned()
    }
}

/// List-backed shared-pool source.
#[derive(Default)]
pub struct StaticSharedSource {
    creds: RwLock<Vec<String>>,
}

impl StaticSharedSource {
    pub fn new(creds: Vec<String>) -> Self {
        Self {
            creds: RwLock::new(creds),
        }
    }

    pub fn push(&self, value: impl Into<String>) {
        self.creds.write().push(value.into());
    }
}

impl SharedCredentialSource for StaticSharedSource {
    fn all(&self) -> Vec<String> {
        self.creds.read().clone()
    }
}

/// Ordered credential discovery with quarantine.
pub struct CredentialPool {
    caller_source: Arc<dyn CallerCredentialSource>,
    shared_source: Arc<dyn SharedCredentialSource>,
    env_var: String,
    quarantine: Mutex<HashMap<String, Instant>>,
    window: Duration,
}

impl CredentialPool {
    pub fn new(
        caller_source: Arc<dyn CallerCredentialSource>,
        shared_source: Arc<dyn SharedCredentialSource>,
        env_var: impl Into<String>,
        window: Duration,
    ) -> Self {
        Self {
            caller_source,
            shared_source,
            env_var: env_var.into(),
            quarantine: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Ordered candidate list for this caller: caller-specific credential
    /// first, then shared-pool credentials, then the environment credential,
    /// then the compiled-in fallback. Quarantined values are filtered out;
    /// if that would leave nothing, the first unfiltered candidate is
    /// returned instead, since exhausting all options beats refusing to try.
    pub fn acquire(&self, caller: Option<&str>) -> Vec<Credential> {
        let unfiltered = self.discover(caller);

        let filtered: Vec<Credential> = {
            let mut quarantine = self.quarantine.lock();
            let now = Instant::now();
            quarantine.retain(|_, until| *until > now);
            unfiltered
                .iter()
                .filter(|c| !quarantine.contains_key(&c.value))
                .cloned()
                .collect()
        };

        if filtered.is_empty() {
            warn!(
                caller = caller.unwrap_or("-"),
                candidates = unfiltered.len(),
                "all credentials quarantined, returning first candidate anyway"
            );
            return unfiltered.into_iter().take(1).collect();
        }

        filtered
    }

    /// Quarantine a credential value for the configured window.
    pub fn quarantine(&self, value: &str) {
        let until = Instant::now() + self.window;
        self.quarantine.lock().insert(value.to_string(), until);
        debug!(window_secs = self.window.as_secs(), "credential quarantined");
    }

    /// Remove any quarantine entry for a credential value.
    pub fn clear(&self, value: &str) {
        self.quarantine.lock().remove(value);
    }

    pub fn is_quarantined(&self, value: &str) -> bool {
        let mut quarantine = self.quarantine.lock();
        match quarantine.get(value) {
            Some(until) if *until > Instant::now() => true,
            Some(_) => {
                quarantine.remove(value);
                false
            }
            None => false,
        }
    }

    fn discover(&self, caller: Option<&str>) -> Vec<Credential> {
        let mut candidates = Vec::new();
        let mut push = |source: CredentialTier, value: String| {
            if value.is_empty() {
                return;
            }
            // First occurrence wins; the same secret exposed by two tiers is
            // one candidate.
            if candidates.iter().any(|c: &Credential| c.value == value) {
                return;
            }
            candidates.push(Credential { source, value });
        };

        if let Some(caller) = caller {
            if let Some(value) = self.caller_source.for_caller(caller) {
                push(CredentialTier::Caller, value);
            }
        }

        for value in self.shared_source.all() {
            push(CredentialTier::SharedPool, value);
        }

        if let Ok(value) = std::env::var(&self.env_var) {
            push(CredentialTier::Environment, value);
        }

        push(CredentialTier::Fallback, FALLBACK_CREDENTIAL.to_string());

        candidates
    }
}
