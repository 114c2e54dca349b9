//! Scheme-dispatching backend construction.

use std::collections::BTreeMap;
use std::fmt;

use crate::{ConnectArgs, FsError, FsHandle};

/// Creates filesystem handles from connection arguments.
///
/// Registries call this on a pool miss. Any `Fn(&ConnectArgs) -> Result<FsHandle, FsError>`
/// closure is a factory, which keeps test doubles short.
pub trait BackendFactory: Send + Sync {
    /// Connect a new backend instance.
    ///
    /// # Errors
    ///
    /// - [`FsError::UnknownScheme`] if no backend handles the `type` argument
    /// - whatever the backend constructor reports
    fn connect(&self, args: &ConnectArgs) -> Result<FsHandle, FsError>;
}

impl<F> BackendFactory for F
where
    F: Fn(&ConnectArgs) -> Result<FsHandle, FsError> + Send + Sync,
{
    fn connect(&self, args: &ConnectArgs) -> Result<FsHandle, FsError> {
        self(args)
    }
}

type Constructor = Box<dyn Fn(&ConnectArgs) -> Result<FsHandle, FsError> + Send + Sync>;

/// Maps schemes to backend constructors.
///
/// # Example
///
/// ```rust
/// use switchfs::{BackendFactory, ConnectArgs, FsError, SchemeRegistry};
///
/// let factory = SchemeRegistry::new();
/// let args = ConnectArgs::from_url("gopher://host/").unwrap();
/// assert!(matches!(factory.connect(&args), Err(FsError::UnknownScheme { .. })));
/// ```
#[derive(Default)]
pub struct SchemeRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl SchemeRegistry {
    /// A registry with no schemes.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in drivers: `local` and `file` map to
    /// [`HostFs`](crate::backends::HostFs) on unix, `rostring` to
    /// [`StringFs`](crate::backends::StringFs).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("rostring", |args: &ConnectArgs| {
            crate::backends::StringFs::from_args(args).map(FsHandle::new)
        });
        #[cfg(unix)]
        {
            use crate::backends::HostFs;
            let host = |args: &ConnectArgs| HostFs::from_args(args).map(FsHandle::new);
            registry.register(crate::LOCAL_SCHEME, host);
            registry.register("file", host);
        }
        registry
    }

    /// Register (or replace) the constructor for `scheme`.
    pub fn register<F>(&mut self, scheme: impl Into<String>, constructor: F)
    where
        F: Fn(&ConnectArgs) -> Result<FsHandle, FsError> + Send + Sync + 'static,
    {
        self.constructors.insert(scheme.into(), Box::new(constructor));
    }

    /// Whether a constructor exists for `scheme`.
    pub fn supports(&self, scheme: &str) -> bool {
        self.constructors.contains_key(scheme)
    }

    /// Registered schemes in order.
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

impl BackendFactory for SchemeRegistry {
    fn connect(&self, args: &ConnectArgs) -> Result<FsHandle, FsError> {
        let scheme = args.scheme().unwrap_or_default();
        let Some(constructor) = self.constructors.get(scheme) else {
            tracing::debug!(scheme, "no backend for scheme");
            return Err(FsError::UnknownScheme {
                scheme: scheme.to_owned(),
            });
        };
        tracing::debug!(scheme, url = %args.to_url(), "connecting backend");
        constructor(args)
    }
}

impl fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.schemes()).finish()
    }
}
