//! Process-wide registry of named VFS implementations.
//!
//! Mirrors the host database's registration model: VFSes are looked up by
//! name, and the head of the list is the default used for opens that do not
//! name one.  The platform VFS is registered lazily on first use, so the
//! registry is never empty once consulted.

use std::sync::{Arc, Mutex};

use super::os::OsVfs;
use super::Vfs;

static REGISTRY: Mutex<Vec<Arc<dyn Vfs>>> = Mutex::new(Vec::new());

fn with_registry<R>(f: impl FnOnce(&mut Vec<Arc<dyn Vfs>>) -> R) -> R {
    let mut reg = REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if reg.is_empty() {
        reg.push(Arc::new(OsVfs::new()));
    }
    f(&mut reg)
}

/// Registers `vfs`, replacing any previous registration under the same
/// name.  With `make_default` the new VFS becomes the head of the list and
/// thus the default.
pub fn register(vfs: Arc<dyn Vfs>, make_default: bool) {
    with_registry(|reg| {
        reg.retain(|existing| existing.name() != vfs.name());
        if make_default {
            reg.insert(0, vfs);
        } else {
            reg.push(vfs);
        }
    });
}

/// Looks up a VFS by name.
pub fn find(name: &str) -> Option<Arc<dyn Vfs>> {
    with_registry(|reg| reg.iter().find(|v| v.name() == name).cloned())
}

/// The current default VFS.
pub fn default_vfs() -> Arc<dyn Vfs> {
    with_registry(|reg| Arc::clone(&reg[0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::os::OS_VFS_NAME;
    use crate::vfs::{AccessCheck, OpenFlags, VfsResult};
    use std::path::{Path, PathBuf};

    struct DummyVfs(&'static str);

    impl Vfs for DummyVfs {
        fn name(&self) -> &str {
            self.0
        }
        fn open(
            &self,
            _path: Option<&Path>,
            _flags: OpenFlags,
        ) -> VfsResult<Box<dyn crate::vfs::VfsFile>> {
            Err(crate::vfs::VfsError::Unsupported)
        }
        fn delete(&self, _path: &Path, _sync_dir: bool) -> VfsResult<()> {
            Ok(())
        }
        fn access(&self, _path: &Path, _check: AccessCheck) -> VfsResult<bool> {
            Ok(false)
        }
        fn full_pathname(&self, path: &Path) -> VfsResult<PathBuf> {
            Ok(path.to_path_buf())
        }
    }

    #[test]
    fn platform_vfs_is_always_present() {
        assert!(find(OS_VFS_NAME).is_some());
        // A default always exists once the registry has been consulted.
        let _ = default_vfs();
    }

    #[test]
    fn register_and_find_by_name() {
        let first: Arc<dyn Vfs> = Arc::new(DummyVfs("dummy-a"));
        register(Arc::clone(&first), false);
        let found = find("dummy-a").expect("registered vfs");
        assert!(Arc::ptr_eq(&first, &found));
        assert!(find("no-such-vfs").is_none());

        // Re-registering under the same name replaces, not duplicates.
        let second: Arc<dyn Vfs> = Arc::new(DummyVfs("dummy-a"));
        register(Arc::clone(&second), false);
        let found = find("dummy-a").expect("replacement");
        assert!(Arc::ptr_eq(&second, &found));
    }
}
