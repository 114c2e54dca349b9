//! Connection arguments handed to backend constructors.

use std::collections::BTreeMap;

use crate::{Address, FsError};

/// Backend scheme key.
pub const ARG_TYPE: &str = "type";
/// Host key.
pub const ARG_HOST: &str = "host";
/// Port key.
pub const ARG_PORT: &str = "port";
/// User name key.
pub const ARG_USERNAME: &str = "username";
/// Secret key.
pub const ARG_SECRET: &str = "secret";
/// Path key.
pub const ARG_PATH: &str = "path";
/// Original address text key.
pub const ARG_URL: &str = "url";
/// Root directory key understood by the host backend.
pub const ARG_CHROOT: &str = "chroot";

/// String key/value set describing a connection.
///
/// Built from an [`Address`], then possibly adjusted (the registries clear `path`
/// so backends never root themselves inside the target file) before being handed
/// to a [`BackendFactory`](crate::BackendFactory). Backends may read extra keys.
///
/// # Example
///
/// ```rust
/// use switchfs::ConnectArgs;
///
/// let mut args = ConnectArgs::from_url("9p://srv:564/tmp/x").unwrap();
/// assert_eq!(args.get("type"), Some("9p"));
/// args.remove("path");
/// assert_eq!(args.to_url(), "9p://srv:564/");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectArgs {
    values: BTreeMap<String, String>,
}

impl ConnectArgs {
    /// Empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an address and convert it.
    pub fn from_url(url: &str) -> Result<Self, FsError> {
        let address = Address::parse(url)?;
        let mut args = Self::from_address(&address);
        args.set(ARG_URL, url);
        Ok(args)
    }

    /// Convert the components of an address; absent components are left unset.
    pub fn from_address(address: &Address) -> Self {
        let mut args = Self::new();
        let fields = [
            (ARG_TYPE, &address.scheme),
            (ARG_HOST, &address.host),
            (ARG_PORT, &address.port),
            (ARG_USERNAME, &address.username),
            (ARG_SECRET, &address.secret),
            (ARG_PATH, &address.path),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                args.set(key, value.as_str());
            }
        }
        args
    }

    /// Value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Value for `key`, or `default` when unset.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Set `key`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Remove `key`, returning its old value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Backend scheme (`type` key).
    pub fn scheme(&self) -> Option<&str> {
        self.get(ARG_TYPE)
    }

    /// Address made of the well-known keys. Empty values count as absent.
    pub fn address(&self) -> Address {
        let take = |key: &str| self.get(key).filter(|v| !v.is_empty()).map(str::to_owned);
        Address {
            scheme: take(ARG_TYPE),
            host: take(ARG_HOST),
            port: take(ARG_PORT),
            username: take(ARG_USERNAME),
            secret: take(ARG_SECRET),
            path: take(ARG_PATH),
        }
    }

    /// Serialize the well-known keys back to address text.
    pub fn to_url(&self) -> String {
        self.address().to_string()
    }

    /// Iterate over all keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_url_sets_known_keys() {
        let args = ConnectArgs::from_url("fish://me:pw@box:22/home/me").unwrap();
        assert_eq!(args.get(ARG_TYPE), Some("fish"));
        assert_eq!(args.get(ARG_USERNAME), Some("me"));
        assert_eq!(args.get(ARG_SECRET), Some("pw"));
        assert_eq!(args.get(ARG_HOST), Some("box"));
        assert_eq!(args.get(ARG_PORT), Some("22"));
        assert_eq!(args.get(ARG_PATH), Some("home/me"));
        assert_eq!(args.get(ARG_URL), Some("fish://me:pw@box:22/home/me"));
    }

    #[test]
    fn absent_components_are_unset() {
        let args = ConnectArgs::from_url("/tmp").unwrap();
        assert_eq!(args.get(ARG_HOST), None);
        assert_eq!(args.get_or(ARG_HOST, ""), "");
        assert_eq!(args.scheme(), Some("local"));
    }

    #[test]
    fn cleared_path_drops_out_of_url() {
        let mut args = ConnectArgs::from_url("9p://srv/a/b").unwrap();
        args.set(ARG_PATH, "");
        assert_eq!(args.to_url(), "9p://srv/");
        assert_eq!(
            args.to_url(),
            Address::parse("9p://srv/a/b").unwrap().canonical_key()
        );
    }

    #[test]
    fn extra_keys_survive() {
        let mut args = ConnectArgs::new();
        args.set(ARG_CHROOT, "/srv");
        args.set(ARG_TYPE, "local");
        let keys: Vec<_> = args.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["chroot", "type"]);
        assert_eq!(args.remove(ARG_CHROOT).as_deref(), Some("/srv"));
        assert_eq!(args.get(ARG_CHROOT), None);
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(matches!(
            ConnectArgs::from_url("nonsense"),
            Err(FsError::Parse { .. })
        ));
    }
}
