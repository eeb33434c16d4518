//! OS tuning for many concurrent (pooled) connections.

#[cfg(target_family = "unix")]
mod unix;

#[cfg(target_family = "unix")]
pub use self::unix::{raise_nofile, rlim_t};
