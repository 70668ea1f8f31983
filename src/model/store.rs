//! Persistence of trained models, keyed by account id.

use super::codec::{self, ModelArtifacts};
use super::network::DenseNetwork;
use crate::error::{ModelLoadError, StoreError};
use crate::source::types::AccountId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    ModelJson,
    Weights,
}

impl Artifact {
    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::ModelJson => "model.json",
            Artifact::Weights => "weights.bin",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Artifact::ModelJson => "application/json",
            Artifact::Weights => "application/octet-stream",
        }
    }

    fn select(self, artifacts: &ModelArtifacts) -> Vec<u8> {
        match self {
            Artifact::ModelJson => artifacts.model_json.as_bytes().to_vec(),
            Artifact::Weights => artifacts.weights.clone(),
        }
    }
}

#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn save(&self, account: &str, model: &DenseNetwork) -> Result<(), StoreError>;

    /// `Ok(None)` when no model was ever saved for `account`.
    async fn load(&self, account: &str) -> Result<Option<DenseNetwork>, ModelLoadError>;

    /// Raw bytes of one artifact file, for serving.
    async fn read_artifact(
        &self,
        account: &str,
        artifact: Artifact,
    ) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Account ids become directory names, so only a conservative character set is accepted.
pub fn validate_account_key(account: &str) -> Result<(), StoreError> {
    let valid = !account.is_empty()
        && account.len() <= 128
        && account != "."
        && account != ".."
        && account
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidAccount(account.to_string()))
    }
}

fn corrupt(account: &str, reason: impl Into<String>) -> ModelLoadError {
    ModelLoadError::Corrupt {
        account: account.to_string(),
        reason: reason.into(),
    }
}

/// Stores each model under `{root}/{account}/model.json` and `weights.bin`.
///
/// Each account has its own read/write lock: a save holds the write side until
/// both files are in place, and loads or artifact reads wait for it. A lock
/// lives in the table only while some operation on that account holds it.
pub struct FsModelStore {
    root: PathBuf,
    locks: LockTable,
}

type LockMap = HashMap<AccountId, Arc<RwLock<()>>>;
type LockTable = Mutex<LockMap>;

fn lock_table(locks: &LockTable) -> MutexGuard<'_, LockMap> {
    match locks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One operation's share of an account lock. Dropping the last share removes
/// the entry from the table.
struct AccountLock<'a> {
    table: &'a LockTable,
    account: String,
    lock: Arc<RwLock<()>>,
}

impl Drop for AccountLock<'_> {
    fn drop(&mut self) {
        let mut locks = lock_table(self.table);
        // the table's entry plus this share
        let unshared = Arc::strong_count(&self.lock) == 2;
        let ours = locks
            .get(&self.account)
            .is_some_and(|l| Arc::ptr_eq(l, &self.lock));
        if unshared && ours {
            locks.remove(&self.account);
        }
    }
}

impl FsModelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn account_dir(&self, account: &str) -> PathBuf {
        self.root.join(account)
    }

    fn lock_for(&self, account: &str) -> AccountLock<'_> {
        let lock = lock_table(&self.locks)
            .entry(account.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone();
        AccountLock {
            table: &self.locks,
            account: account.to_string(),
            lock,
        }
    }

    #[cfg(test)]
    fn locked_accounts(&self) -> usize {
        lock_table(&self.locks).len()
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await
    }
}

async fn read_optional(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ModelStore for FsModelStore {
    async fn save(&self, account: &str, model: &DenseNetwork) -> Result<(), StoreError> {
        validate_account_key(account)?;
        let artifacts = codec::encode(model)?;
        let dir = self.account_dir(account);

        let lock = self.lock_for(account);
        let _guard = lock.lock.write().await;
        tokio::fs::create_dir_all(&dir).await?;
        Self::write_atomic(&dir.join(Artifact::Weights.file_name()), &artifacts.weights).await?;
        Self::write_atomic(
            &dir.join(Artifact::ModelJson.file_name()),
            artifacts.model_json.as_bytes(),
        )
        .await?;

        tracing::info!(account, dir = %dir.display(), "model saved");
        Ok(())
    }

    async fn load(&self, account: &str) -> Result<Option<DenseNetwork>, ModelLoadError> {
        if validate_account_key(account).is_err() {
            return Ok(None);
        }
        let dir = self.account_dir(account);
        let io = |source| ModelLoadError::Io {
            account: account.to_string(),
            source,
        };

        let lock = self.lock_for(account);
        let _guard = lock.lock.read().await;
        let Some(model_json) = read_optional(&dir.join(Artifact::ModelJson.file_name()))
            .await
            .map_err(io)?
        else {
            return Ok(None);
        };
        let weights = read_optional(&dir.join(Artifact::Weights.file_name()))
            .await
            .map_err(io)?
            .ok_or_else(|| corrupt(account, "weights.bin is missing"))?;

        let model_json = String::from_utf8(model_json)
            .map_err(|_| corrupt(account, "model.json is not UTF-8"))?;
        let model =
            codec::decode(&model_json, &weights).map_err(|reason| corrupt(account, reason))?;
        tracing::debug!(account, "model loaded");
        Ok(Some(model))
    }

    async fn read_artifact(
        &self,
        account: &str,
        artifact: Artifact,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        validate_account_key(account)?;
        let lock = self.lock_for(account);
        let _guard = lock.lock.read().await;
        Ok(read_optional(&self.account_dir(account).join(artifact.file_name())).await?)
    }
}

/// Keeps encoded artifacts in memory; models still round-trip through the codec.
#[derive(Default)]
pub struct InMemoryModelStore {
    models: RwLock<HashMap<AccountId, ModelArtifacts>>,
}

impl InMemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw artifacts as-is, e.g. to simulate a damaged upload.
    pub async fn insert_raw(&self, account: &str, artifacts: ModelArtifacts) {
        self.models.write().await.insert(account.to_string(), artifacts);
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn save(&self, account: &str, model: &DenseNetwork) -> Result<(), StoreError> {
        validate_account_key(account)?;
        let artifacts = codec::encode(model)?;
        self.models.write().await.insert(account.to_string(), artifacts);
        Ok(())
    }

    async fn load(&self, account: &str) -> Result<Option<DenseNetwork>, ModelLoadError> {
        let models = self.models.read().await;
        let Some(artifacts) = models.get(account) else {
            return Ok(None);
        };
        codec::decode(&artifacts.model_json, &artifacts.weights)
            .map(Some)
            .map_err(|reason| corrupt(account, reason))
    }

    async fn read_artifact(
        &self,
        account: &str,
        artifact: Artifact,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        validate_account_key(account)?;
        Ok(self.models.read().await.get(account).map(|a| artifact.select(a)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn network(seed: u64) -> DenseNetwork {
        let mut rng = StdRng::seed_from_u64(seed);
        DenseNetwork::initialise(&[6, 3], &mut rng)
    }

    #[test]
    fn test_account_key_validation() {
        assert!(validate_account_key("alice.near").is_ok());
        assert!(validate_account_key("a-b_c.tg").is_ok());
        assert!(validate_account_key("").is_err());
        assert!(validate_account_key("..").is_err());
        assert!(validate_account_key("../etc").is_err());
        assert!(validate_account_key("a/b").is_err());
    }

    #[tokio::test]
    async fn test_fs_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        let net = network(5);
        store.save("alice.near", &net).await.unwrap();

        assert!(dir.path().join("alice.near/model.json").exists());
        assert!(dir.path().join("alice.near/weights.bin").exists());
        assert!(!dir.path().join("alice.near/model.tmp").exists());

        let loaded = store.load("alice.near").await.unwrap().unwrap();
        let row = [1.0, 0.5, 3.0, 3.0];
        assert!((loaded.predict(&row) - net.predict(&row)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fs_missing_model_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        assert!(store.load("nobody.near").await.unwrap().is_none());
        assert!(store
            .read_artifact("nobody.near", Artifact::ModelJson)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_fs_locks_released_after_use() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        for i in 0..20 {
            let account = format!("ghost{}.near", i);
            assert!(store.load(&account).await.unwrap().is_none());
            store.read_artifact(&account, Artifact::Weights).await.unwrap();
        }
        store.save("alice.near", &network(3)).await.unwrap();
        store.load("alice.near").await.unwrap();
        assert_eq!(store.locked_accounts(), 0);
    }

    #[test]
    fn test_fs_lock_kept_while_shared() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        let first = store.lock_for("alice.near");
        let second = store.lock_for("alice.near");
        assert!(Arc::ptr_eq(&first.lock, &second.lock));
        drop(first);
        assert_eq!(store.locked_accounts(), 1);
        drop(second);
        assert_eq!(store.locked_accounts(), 0);
    }

    #[tokio::test]
    async fn test_fs_missing_weights_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        store.save("alice.near", &network(1)).await.unwrap();
        std::fs::remove_file(dir.path().join("alice.near/weights.bin")).unwrap();
        let err = store.load("alice.near").await.unwrap_err();
        assert!(matches!(err, ModelLoadError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_fs_overwrite_replaces_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        store.save("alice.near", &network(1)).await.unwrap();
        let second = network(2);
        store.save("alice.near", &second).await.unwrap();
        assert_eq!(store.load("alice.near").await.unwrap().unwrap(), second);
    }

    #[tokio::test]
    async fn test_fs_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        let err = store.save("../evil", &network(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidAccount(_)));
        assert!(store.load("../evil").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fs_artifact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore::new(dir.path());
        let net = network(4);
        store.save("alice.near", &net).await.unwrap();
        let weights = store
            .read_artifact("alice.near", Artifact::Weights)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(weights.len(), net.parameter_count() * 4);
    }

    #[tokio::test]
    async fn test_memory_round_trip_and_corruption() {
        let store = InMemoryModelStore::new();
        let net = network(9);
        store.save("bob.near", &net).await.unwrap();
        assert_eq!(store.load("bob.near").await.unwrap().unwrap(), net);

        store
            .insert_raw(
                "carol.near",
                ModelArtifacts {
                    model_json: "{}".to_string(),
                    weights: Vec::new(),
                },
            )
            .await;
        assert!(store.load("carol.near").await.is_err());
    }
}
