//! enigmad internals: gateway router, metrics, registry reload and the daemon
//! lifecycle. The `enigmad` binary is a thin CLI over [`daemon::run`].

pub mod daemon;
pub mod gateway;
pub mod metrics;
pub mod registry_watch;
