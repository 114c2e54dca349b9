//! # Built-in Backends
//!
//! | Backend | Scheme | Notes |
//! |---------|--------|-------|
//! | [`HostFs`] | `local`, `file` | Unix only; optional root via `chroot` |
//! | [`StringFs`] | `rostring` | Read-only text from the `value` argument |
//!
//! Remote drivers (9P, FISH) live outside this crate and plug in through
//! [`SchemeRegistry::register`](crate::SchemeRegistry::register).

#[cfg(unix)]
mod host;
mod string_file;

#[cfg(unix)]
pub use host::HostFs;
pub use string_file::{ARG_VALUE, StringFile, StringFs};
