//! One-shot stop signal shared between a session and its source loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Inner {
    signaled: Mutex<bool>,
    cvar: Condvar,
}

/// A single-use cancellation token.
///
/// Clones share the same flag. Once signaled it stays signaled, and every
/// waiter wakes immediately.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<Inner>,
}

impl StopToken {
    /// Create a new, unsignaled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the token. Returns true only for the call that flipped it.
    pub fn signal(&self) -> bool {
        let mut signaled = self.inner.signaled.lock();
        if *signaled {
            return false;
        }
        *signaled = true;
        self.inner.cvar.notify_all();
        true
    }

    /// Returns true once the token has been signaled.
    pub fn is_signaled(&self) -> bool {
        *self.inner.signaled.lock()
    }

    /// Sleep for up to `timeout`, waking early on signal.
    ///
    /// Returns true if the token is signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.inner.signaled.lock();
        while !*signaled {
            if self
                .inner
                .cvar
                .wait_until(&mut signaled, deadline)
                .timed_out()
            {
                break;
            }
        }
        *signaled
    }

    /// Block until the token is signaled.
    pub fn wait(&self) {
        let mut signaled = self.inner.signaled.lock();
        while !*signaled {
            self.inner.cvar.wait(&mut signaled);
        }
    }
}
