//! Filesystem impl for switches that resolve a name to `(FsHandle, residual)`.

/// Implement [`Filesystem`](crate::Filesystem) for a type with an inherent
/// `resolve(&self, &str) -> Result<(FsHandle, String), FsError>`.
///
/// Every operation resolves its name, then runs on the resolved handle with the
/// residual path. Rename needs both names on the same backend instance.
macro_rules! resolving_filesystem {
    ($ty:ty, $kind:expr) => {
        impl $crate::Filesystem for $ty {
            fn kind(&self) -> $crate::BackendKind {
                $kind
            }

            fn open(
                &self,
                name: &str,
                mode: $crate::OpenMode,
            ) -> Result<Box<dyn $crate::File>, $crate::FsError> {
                let (fs, rest) = self.resolve(name)?;
                Ok(Box::new(fs.open(&rest, mode)?))
            }

            fn stat(&self, name: &str) -> Result<$crate::Stat, $crate::FsError> {
                let (fs, rest) = self.resolve(name)?;
                fs.stat(&rest)
            }

            fn unlink(&self, name: &str) -> Result<(), $crate::FsError> {
                let (fs, rest) = self.resolve(name)?;
                fs.unlink(&rest)
            }

            fn rename(&self, from: &str, to: &str) -> Result<(), $crate::FsError> {
                let (fs, from_rest) = self.resolve(from)?;
                let (to_fs, to_rest) = self.resolve(to)?;
                if !fs.ptr_eq(&to_fs) {
                    tracing::debug!(from, to, "rename across backends");
                    return Err($crate::FsError::NotSupported {
                        operation: "rename across backends",
                    });
                }
                fs.rename(&from_rest, &to_rest)
            }

            fn chmod(&self, name: &str, mode: u32) -> Result<(), $crate::FsError> {
                let (fs, rest) = self.resolve(name)?;
                fs.chmod(&rest, mode)
            }

            fn chown(&self, name: &str, owner: &str, group: &str) -> Result<(), $crate::FsError> {
                let (fs, rest) = self.resolve(name)?;
                fs.chown(&rest, owner, group)
            }

            fn mkdir(&self, name: &str, mode: u32) -> Result<(), $crate::FsError> {
                let (fs, rest) = self.resolve(name)?;
                fs.mkdir(&rest, mode)
            }

            fn symlink(&self, target: &str, name: &str) -> Result<(), $crate::FsError> {
                let (fs, rest) = self.resolve(name)?;
                fs.symlink(target, &rest)
            }

            fn readlink(&self, name: &str) -> Result<$crate::SymlinkTarget, $crate::FsError> {
                let (fs, rest) = self.resolve(name)?;
                fs.readlink(&rest)
            }
        }
    };
}

pub(crate) use resolving_filesystem;
