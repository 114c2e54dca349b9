//! # Layer Trait
//!
//! Tower-style middleware composition over filesystem handles.
//!
//! ## Overview
//!
//! A decorator (such as [`MetaCache`](crate::MetaCache)) wraps one [`FsHandle`]
//! and is itself a [`Filesystem`](crate::Filesystem). The [`Layer`] trait keeps
//! the decorator's configuration separate from the act of wrapping:
//!
//! ```text
//! FsHandle ──▶ Layer::layer() ──▶ Decorator ──▶ FsHandle::new() ──▶ FsHandle
//! ```
//!
//! ## Example
//!
//! ```rust
//! use switchfs::{Filesystem, FsHandle, LayerExt, MetaCacheConfig, MetaCacheLayer};
//! use std::time::Duration;
//!
//! struct Remote;
//! impl Filesystem for Remote {}
//!
//! let remote = FsHandle::new(Remote);
//! let cached = remote.wrap(MetaCacheLayer::with_config(
//!     MetaCacheConfig::default().with_ttl(Duration::from_secs(30)),
//! ));
//! assert_eq!(cached.kind(), switchfs::BackendKind::MetaCache);
//! ```

use crate::{Filesystem, FsHandle};

/// A layer that wraps a backend to add functionality.
///
/// # Type Parameters
///
/// - `B`: what is being wrapped, normally [`FsHandle`]
///
/// # Design Notes
///
/// - `layer(self, backend)` consumes both the layer and backend
/// - Layers are compile-time composition; the trait is not object-safe
pub trait Layer<B> {
    /// The resulting backend type after applying this layer.
    type Backend;

    /// Wrap the given backend with this layer's functionality.
    fn layer(self, backend: B) -> Self::Backend;
}

/// Fluent layer composition for [`FsHandle`].
pub trait LayerExt: Sized {
    /// Apply a layer, returning the decorator.
    fn layer<L: Layer<Self>>(self, layer: L) -> L::Backend {
        layer.layer(self)
    }

    /// Apply a layer and put the decorator behind a fresh handle.
    fn wrap<L>(self, layer: L) -> FsHandle
    where
        L: Layer<Self>,
        L::Backend: Filesystem + 'static,
    {
        FsHandle::new(self.layer(layer))
    }
}

impl LayerExt for FsHandle {}
