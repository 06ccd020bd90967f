//! Process-wide logger handle.
//!
//! The engine emits structured events through `tracing`; this module holds
//! the only piece of process-global mutable state in the crate. Call
//! [`init_default`] once at process start (or let callers
//! install their own `tracing` subscriber — the crate never assumes one is
//! present and every `tracing::*!` call is a no-op without a subscriber).

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a reasonable default `tracing_subscriber` if the caller hasn't
/// already set one up. Safe to call more than once; only the first call has
/// an effect. Intended for binaries embedding `strata` that don't otherwise
/// configure tracing.
pub fn init_default() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}
