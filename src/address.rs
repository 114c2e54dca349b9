//! # Addresses
//!
//! URL-like address strings and their canonical connection keys.
//!
//! ## Grammar
//!
//! ```text
//! scheme://[user[:secret]@]host[:port]/path
//! scheme:///path                 (no host)
//! /absolute/path                 (scheme "local")
//! ```
//!
//! ## Canonical keys
//!
//! [`Address::canonical_key`] drops the path and keeps everything that identifies a
//! connection, so `9p://srv/a` and `9p://srv/b` share the key `9p://srv/`. Registries
//! pool connections under that key.

use std::fmt;
use std::str::FromStr;

use crate::{FsError, ParseError};

/// Scheme assigned to bare absolute paths.
pub const LOCAL_SCHEME: &str = "local";

/// A parsed address.
///
/// Empty components are stored as `None`.
///
/// # Example
///
/// ```rust
/// use switchfs::Address;
///
/// let addr = Address::parse("9p://user:secret@host:564/a/b").unwrap();
/// assert_eq!(addr.scheme.as_deref(), Some("9p"));
/// assert_eq!(addr.username.as_deref(), Some("user"));
/// assert_eq!(addr.port.as_deref(), Some("564"));
/// assert_eq!(addr.path.as_deref(), Some("a/b"));
/// assert_eq!(addr.canonical_key(), "9p://user:secret@host:564/");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    /// Backend selector, e.g. `local`, `9p`, `fish`.
    pub scheme: Option<String>,
    /// Host name.
    pub host: Option<String>,
    /// Port, kept as text.
    pub port: Option<String>,
    /// User name.
    pub username: Option<String>,
    /// Password or other secret.
    pub secret: Option<String>,
    /// Path on the backend.
    pub path: Option<String>,
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() { None } else { Some(s.to_owned()) }
}

impl Address {
    /// Parse an address string.
    ///
    /// # Errors
    ///
    /// [`FsError::Parse`] with the [`ParseError`] describing the defect.
    pub fn parse(text: &str) -> Result<Self, FsError> {
        let fail = |kind| FsError::Parse {
            input: text.to_owned(),
            kind,
        };

        if text.starts_with('/') {
            return Ok(Self {
                scheme: Some(LOCAL_SCHEME.to_owned()),
                path: Some(text.to_owned()),
                ..Default::default()
            });
        }

        let (scheme, rest) = match text.split_once(':') {
            None => return Err(fail(ParseError::MissingScheme)),
            Some(("", _)) => return Err(fail(ParseError::EmptyScheme)),
            Some(parts) => parts,
        };
        let rest = rest
            .strip_prefix("//")
            .ok_or_else(|| fail(ParseError::MissingSlashSlash))?;

        let mut addr = Self {
            scheme: Some(scheme.to_owned()),
            ..Default::default()
        };

        if rest.is_empty() {
            return Ok(addr);
        }
        if rest.starts_with('/') {
            addr.path = Some(rest.to_owned());
            return Ok(addr);
        }

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, non_empty(path)),
            None => (rest, None),
        };
        addr.path = path;

        let hostport = match authority.split_once('@') {
            Some((userinfo, hostport)) => {
                match userinfo.split_once(':') {
                    Some((user, secret)) => {
                        addr.username = non_empty(user);
                        addr.secret = non_empty(secret);
                    }
                    None => addr.username = non_empty(userinfo),
                }
                if hostport.is_empty() {
                    return Err(fail(ParseError::Incomplete));
                }
                hostport
            }
            None => authority,
        };

        match hostport.split_once(':') {
            Some((_, "")) => return Err(fail(ParseError::Incomplete)),
            Some((host, port)) => {
                addr.host = non_empty(host);
                addr.port = Some(port.to_owned());
            }
            None => addr.host = non_empty(hostport),
        }

        Ok(addr)
    }

    /// Copy of this address without its path.
    pub fn canonical(&self) -> Self {
        Self {
            path: None,
            ..self.clone()
        }
    }

    /// Connection key: `scheme://[user[:secret]@]host[:port]/`.
    ///
    /// Never includes the path, so addresses differing only by path share a key.
    pub fn canonical_key(&self) -> String {
        self.canonical().to_string()
    }

    /// Port parsed as a number, if present and numeric.
    pub fn port_number(&self) -> Option<u16> {
        self.port.as_deref().and_then(|p| p.parse().ok())
    }

    /// Path, or `/` when the address carries none.
    pub fn path_or_root(&self) -> &str {
        self.path.as_deref().unwrap_or("/")
    }

    fn serialized_len(&self) -> usize {
        let len = |s: &Option<String>| s.as_deref().map_or(0, str::len);
        // "://", ":" twice, "@", "/" plus one spare
        len(&self.scheme)
            + len(&self.username)
            + len(&self.secret)
            + len(&self.host)
            + len(&self.port)
            + len(&self.path)
            + 8
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::with_capacity(self.serialized_len());
        out.push_str(self.scheme.as_deref().unwrap_or_default());
        out.push_str("://");
        if self.username.is_some() || self.secret.is_some() {
            out.push_str(self.username.as_deref().unwrap_or_default());
            if let Some(secret) = &self.secret {
                out.push(':');
                out.push_str(secret);
            }
            out.push('@');
        }
        if let Some(host) = &self.host {
            out.push_str(host);
        }
        if let Some(port) = &self.port {
            out.push(':');
            out.push_str(port);
        }
        match self.path.as_deref() {
            Some(path) if self.host.is_none() && path.starts_with('/') => out.push_str(path),
            Some(path) => {
                out.push('/');
                out.push_str(path.trim_start_matches('/'));
            }
            None => out.push('/'),
        }
        f.write_str(&out)
    }
}

impl FromStr for Address {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
