use std::{
    fs, io,
    path::{Path, PathBuf},
};

use derive_more::{Display, Error, From};
use tracing::{debug, error};

use crate::profile::Profile;

/// Configuration store access errors.
#[derive(Debug, Display, From, Error)]
pub(crate) enum StoreError {
    /// IO-related error.
    Io(io::Error),
}

/// Storage of the shared configuration resource.
pub(crate) trait ConfigStore {
    /// Read the full resource content.
    fn read(&self) -> Result<String, StoreError>;

    /// Replace the full resource content.
    fn write(&mut self, content: &str) -> Result<(), StoreError>;
}

/// Configuration resource stored on the local filesystem.
pub(crate) struct FileStore {
    /// Resource file path.
    path: PathBuf,
}

impl FileStore {
    /// Create a new store backed by the file at `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Resource file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileStore {
    fn read(&self) -> Result<String, StoreError> {
        Ok(fs::read_to_string(&self.path)?)
    }

    fn write(&mut self, content: &str) -> Result<(), StoreError> {
        Ok(fs::write(&self.path, content)?)
    }
}

/// Errors that may occur while patching the configuration resource.
#[derive(Debug, Display, Error)]
pub(crate) enum PatchError {
    /// Unable to read the resource, nothing was modified.
    #[display(fmt = "unable to read configuration resource: {}", _0)]
    Read(StoreError),

    /// Unable to write substituted content.
    #[display(fmt = "unable to write configuration resource: {}", _0)]
    Write(StoreError),

    /// Unable to write the original content back.
    #[display(fmt = "unable to restore configuration resource: {}", _0)]
    Restore(StoreError),
}

/// Resource content captured before substitution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Snapshot(String);

impl Snapshot {
    /// Captured content.
    pub fn content(&self) -> &str {
        &self.0
    }
}

/// Replace every binding token with its value, in profile order.
///
/// Each binding is applied to the result of the previous one, so a later
/// binding also sees values inserted by earlier bindings. Returns the
/// substituted content and the number of replaced occurrences.
pub(crate) fn substitute(content: &str, profile: &Profile) -> (String, usize) {
    let mut replaced = 0;

    let content = profile
        .bindings()
        .iter()
        .fold(content.to_owned(), |content, binding| {
            let count = content.matches(binding.token.as_str()).count();

            if count == 0 {
                return content;
            }

            replaced += count;
            content.replace(binding.token.as_str(), &binding.value)
        });

    (content, replaced)
}

/// Reversible patching of the shared configuration resource.
pub(crate) struct ResourcePatcher<S> {
    /// Underlying resource storage.
    store: S,
}

impl<S: ConfigStore> ResourcePatcher<S> {
    /// Create a new patcher on top of the provided store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying resource storage.
    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Substitute profile bindings into the resource.
    ///
    /// Returned [`PatchGuard`] holds the original content and restores it
    /// either explicitly, with [`PatchGuard::restore`], or when dropped.
    /// Since the guard borrows the patcher, another patch cannot be applied
    /// until the previous one is restored.
    pub fn apply(&mut self, profile: &Profile) -> Result<PatchGuard<'_, S>, PatchError> {
        let original = self.store.read().map_err(PatchError::Read)?;
        let (patched, replaced) = substitute(&original, profile);

        let snapshot = Snapshot(original);

        if let Err(write_error) = self.store.write(&patched) {
            // The write may have been partial.
            if let Err(e) = self.restore(&snapshot) {
                error!(%e, "unable to restore configuration resource after a failed write");
            }

            return Err(PatchError::Write(write_error));
        }

        debug!(profile = profile.name(), replaced, "configuration resource patched");

        Ok(PatchGuard {
            patcher: self,
            snapshot: Some(snapshot),
        })
    }

    /// Write snapshot content back verbatim.
    ///
    /// Restoring the same snapshot multiple times is safe.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.store.write(snapshot.content())?;
        debug!("configuration resource restored");
        Ok(())
    }

    /// Run `f` while the resource is patched with `profile`.
    ///
    /// The resource is restored after `f` returns or unwinds.
    pub fn scoped<T, F>(&mut self, profile: &Profile, f: F) -> Result<T, PatchError>
    where
        F: FnOnce() -> T,
    {
        let guard = self.apply(profile)?;
        let output = f();
        guard.restore().map_err(PatchError::Restore)?;
        Ok(output)
    }
}

/// Active patch of the configuration resource.
pub(crate) struct PatchGuard<'a, S: ConfigStore> {
    /// Patcher that applied this patch.
    patcher: &'a mut ResourcePatcher<S>,

    /// Original content, taken once restored.
    snapshot: Option<Snapshot>,
}

impl<'a, S: ConfigStore> PatchGuard<'a, S> {
    /// Original resource content.
    #[cfg(test)]
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Restore the original content.
    pub fn restore(mut self) -> Result<(), StoreError> {
        match self.snapshot.take() {
            Some(snapshot) => self.patcher.restore(&snapshot),
            None => Ok(()),
        }
    }
}

impl<'a, S: ConfigStore> Drop for PatchGuard<'a, S> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            if let Err(e) = self.patcher.restore(&snapshot) {
                error!(%e, "unable to restore configuration resource");
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        cell::RefCell,
        io,
        panic::{self, AssertUnwindSafe},
        rc::Rc,
    };

    use crate::profile::{tests::test_registry, BindingOverride, Environment, ProfileRegistry};

    use super::{substitute, ConfigStore, FileStore, PatchError, ResourcePatcher, StoreError};

    pub(crate) const CONSTANTS: &str = r#"const MARKETPLACE = address("MARKETPLACE_ADDRESS");
const ADMIN = address("ADMIN_ADDRESS");
const USDT = address("USDT_ADDRESS");
const UNUSED = "UNKNOWN_ADDRESS";
"#;

    /// In-memory configuration store, clones share the same buffer.
    #[derive(Clone, Default)]
    pub(crate) struct MemoryStore {
        /// Shared resource content.
        content: Rc<RefCell<String>>,

        /// Every written content, in order.
        history: Rc<RefCell<Vec<String>>>,

        /// Fail every read.
        fail_reads: bool,

        /// Fail writes after this many successful ones.
        fail_writes_after: Option<usize>,
    }

    impl MemoryStore {
        pub(crate) fn new(content: &str) -> Self {
            Self {
                content: Rc::new(RefCell::new(content.to_owned())),
                ..Default::default()
            }
        }

        pub(crate) fn failing_reads(mut self) -> Self {
            self.fail_reads = true;
            self
        }

        pub(crate) fn failing_writes_after(mut self, writes: usize) -> Self {
            self.fail_writes_after = Some(writes);
            self
        }

        pub(crate) fn content(&self) -> String {
            self.content.borrow().clone()
        }

        pub(crate) fn writes(&self) -> usize {
            self.history.borrow().len()
        }

        pub(crate) fn history(&self) -> Vec<String> {
            self.history.borrow().clone()
        }
    }

    impl ConfigStore for MemoryStore {
        fn read(&self) -> Result<String, StoreError> {
            if self.fail_reads {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read denied").into());
            }

            Ok(self.content())
        }

        fn write(&mut self, content: &str) -> Result<(), StoreError> {
            if self.fail_writes_after == Some(self.writes()) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "write denied").into());
            }

            self.history.borrow_mut().push(content.to_owned());
            *self.content.borrow_mut() = content.to_owned();
            Ok(())
        }
    }

    #[test]
    fn round_trip_for_every_profile() {
        let registry = ProfileRegistry::load(None).unwrap();

        for environment in [Environment::Test, Environment::Testnet, Environment::Mainnet] {
            let store = MemoryStore::new(CONSTANTS);
            let mut patcher = ResourcePatcher::new(store.clone());
            let profile = registry.profile(environment);

            let guard = patcher.apply(&profile).unwrap();
            assert_ne!(store.content(), CONSTANTS);
            assert!(!store.content().contains("\"MARKETPLACE_ADDRESS\""));
            assert!(store.content().contains("\"UNKNOWN_ADDRESS\""));

            guard.restore().unwrap();
            assert_eq!(store.content(), CONSTANTS);
        }
    }

    #[test]
    fn substitution_is_sequential() {
        let registry = test_registry();
        let profile = registry.profile(Environment::Test);

        let (content, replaced) = substitute(CONSTANTS, &profile);

        assert_eq!(replaced, 2);
        assert!(content.contains("address(\"test-marketplace\")"));
        assert!(content.contains("address(\"test-admin\")"));
        assert!(content.contains("address(\"USDT_ADDRESS\")"));

        let chained = registry.profile(Environment::Test).with_override(
            &BindingOverride {
                slot: 0,
                token: String::from("\"MARKETPLACE_ADDRESS\""),
                value: String::from("\"ADMIN_ADDRESS\""),
            },
        );

        let (content, replaced) = substitute(CONSTANTS, &chained);

        assert_eq!(replaced, 3);
        assert_eq!(content.matches("\"test-admin\"").count(), 2);
    }

    #[test]
    fn unmatched_tokens_leave_content_untouched() {
        let registry = test_registry();
        let mainnet = registry.profile(Environment::Mainnet);
        let (content, replaced) = substitute("nothing to replace", &mainnet);

        assert_eq!(content, "nothing to replace");
        assert_eq!(replaced, 0);
    }

    #[test]
    fn restore_is_idempotent() {
        let store = MemoryStore::new(CONSTANTS);
        let mut patcher = ResourcePatcher::new(store.clone());
        let profile = test_registry().profile(Environment::Mainnet);

        let guard = patcher.apply(&profile).unwrap();
        let snapshot = guard.snapshot().cloned().unwrap();
        assert_ne!(store.content(), CONSTANTS);

        guard.restore().unwrap();
        patcher.restore(&snapshot).unwrap();

        assert_eq!(store.content(), CONSTANTS);
    }

    #[test]
    fn dropped_guard_restores() {
        let store = MemoryStore::new(CONSTANTS);
        let mut patcher = ResourcePatcher::new(store.clone());
        let profile = test_registry().profile(Environment::Testnet);

        {
            let _guard = patcher.apply(&profile).unwrap();
            assert!(store.content().contains("testnet-admin"));
        }

        assert_eq!(store.content(), CONSTANTS);
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn scoped_restores_on_panic() {
        let store = MemoryStore::new(CONSTANTS);
        let mut patcher = ResourcePatcher::new(store.clone());
        let profile = test_registry().profile(Environment::Test);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            patcher
                .scoped::<(), _>(&profile, || panic!("tool crashed"))
                .ok();
        }));

        assert!(result.is_err());
        assert_eq!(store.content(), CONSTANTS);
    }

    #[test]
    fn scoped_observes_patched_content() {
        let store = MemoryStore::new(CONSTANTS);
        let mut patcher = ResourcePatcher::new(store.clone());
        let profile = test_registry().profile(Environment::Test);

        let seen = patcher.scoped(&profile, || store.content()).unwrap();

        assert!(seen.contains("test-marketplace"));
        assert_eq!(patcher.store().content(), CONSTANTS);
    }

    #[test]
    fn read_failure_writes_nothing() {
        let store = MemoryStore::new(CONSTANTS).failing_reads();
        let mut patcher = ResourcePatcher::new(store.clone());
        let profile = test_registry().profile(Environment::Test);

        assert!(matches!(patcher.apply(&profile), Err(PatchError::Read(_))));
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn write_failure_is_reported() {
        let store = MemoryStore::new(CONSTANTS).failing_writes_after(0);
        let mut patcher = ResourcePatcher::new(store.clone());
        let profile = test_registry().profile(Environment::Test);

        assert!(matches!(patcher.apply(&profile), Err(PatchError::Write(_))));
        assert_eq!(store.content(), CONSTANTS);
    }

    #[test]
    fn restore_failure_is_reported() {
        let store = MemoryStore::new(CONSTANTS).failing_writes_after(1);
        let mut patcher = ResourcePatcher::new(store.clone());
        let profile = test_registry().profile(Environment::Test);

        assert!(matches!(
            patcher.scoped(&profile, || ()),
            Err(PatchError::Restore(_))
        ));
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("constants.tolk");
        std::fs::write(&path, CONSTANTS).unwrap();

        let mut patcher = ResourcePatcher::new(FileStore::new(&path));
        let profile = ProfileRegistry::load(None).unwrap().profile(Environment::Test);

        let seen = patcher
            .scoped(&profile, || std::fs::read_to_string(&path).unwrap())
            .unwrap();

        assert!(seen.contains("address(\"EQAX21A4fIw7hX1jmRjvJT0DX7H_FUItj2duCBWtK4ayEiC_\")"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), CONSTANTS);
    }

    #[test]
    fn file_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("missing.tolk"));

        assert_eq!(store.path(), dir.path().join("missing.tolk"));

        let mut patcher = ResourcePatcher::new(store);
        let profile = test_registry().profile(Environment::Test);

        assert!(matches!(patcher.apply(&profile), Err(PatchError::Read(_))));
        assert!(!dir.path().join("missing.tolk").exists());
    }
}
