// src/core/meta/owner.rs

//! `MetaOwner<T>`: serializes and publishes versioned updates to one
//! metadata artifact via `modify(ctx)` with `pre`/`post`/`final` hooks.

use crate::core::errors::ClusterError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Capability every metadata kind (Smap, Bmd, Rmd, GlobalConfig) implements
/// so `MetaOwner` can generically bump, validate, and name it.
pub trait MetaKind: Clone + Send + Sync + 'static {
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
    fn assert_consistent(&self) -> Result<(), String>;
    fn kind_name() -> &'static str;
    /// The uuid of the cluster this revision belongs to, so a push from a
    /// different cluster can be told apart from a stale or fresh one.
    fn cluster_uuid(&self) -> &str;
}

type PreHook<T> = Box<dyn FnOnce(&mut T) -> Result<(), ClusterError> + Send>;
type PostHook<T> = Box<dyn FnOnce(Arc<T>) -> BoxFuture<'static, ()> + Send>;
type FinalHook<T> = Box<dyn FnOnce(Arc<T>) -> BoxFuture<'static, ()> + Send>;

/// The hook bundle passed to `MetaOwner::modify`. `pre` may fail without
/// side effects; `post` and `final` are best-effort once `pre` succeeds.
#[derive(Default)]
pub struct ModifyCtx<T> {
    pub wait: bool,
    pre: Option<PreHook<T>>,
    post: Option<PostHook<T>>,
    final_hook: Option<FinalHook<T>>,
}

impl<T> ModifyCtx<T> {
    pub fn new() -> Self {
        Self {
            wait: false,
            pre: None,
            post: None,
            final_hook: None,
        }
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn pre(mut self, hook: impl FnOnce(&mut T) -> Result<(), ClusterError> + Send + 'static) -> Self {
        self.pre = Some(Box::new(hook));
        self
    }

    pub fn post<F>(mut self, hook: impl FnOnce(Arc<T>) -> F + Send + 'static) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.post = Some(Box::new(move |t| Box::pin(hook(t))));
        self
    }

    pub fn final_hook<F>(mut self, hook: impl FnOnce(Arc<T>) -> F + Send + 'static) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.final_hook = Some(Box::new(move |t| Box::pin(hook(t))));
        self
    }
}

pub struct MetaOwner<T: MetaKind> {
    current: parking_lot::RwLock<Arc<T>>,
    write_lock: AsyncMutex<()>,
    persist_path: Option<PathBuf>,
}

impl<T: MetaKind + Serialize + DeserializeOwned> MetaOwner<T> {
    pub fn new(initial: T, persist_path: Option<PathBuf>) -> Self {
        Self {
            current: parking_lot::RwLock::new(Arc::new(initial)),
            write_lock: AsyncMutex::new(()),
            persist_path,
        }
    }

    /// Lock-free (beyond a pointer-copy read lock) snapshot read.
    pub fn current(&self) -> Arc<T> {
        self.current.read().clone()
    }

    /// `load(path)` half of the load/save/version trio assumed by §6.
    pub fn from_file_or(path: PathBuf, fallback: T) -> Self {
        let loaded = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<T>(&s).ok());
        match loaded {
            Some(v) => {
                info!(kind = T::kind_name(), version = v.version(), "loaded persisted metadata");
                Self::new(v, Some(path))
            }
            None => Self::new(fallback, Some(path)),
        }
    }

    fn persist(&self, value: &T) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let Ok(json) = serde_json::to_string_pretty(value) else {
            error!(kind = T::kind_name(), "failed to serialize for persistence");
            return;
        };
        let tmp = path.with_extension("tmp");
        if let Err(e) = std::fs::write(&tmp, json) {
            error!(kind = T::kind_name(), error = %e, "failed to write temp persistence file");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, path) {
            error!(kind = T::kind_name(), error = %e, "failed to rename temp persistence file");
        }
    }

    /// Executes `pre -> bump+persist+swap -> post -> final` under the
    /// owner's write mutex (`pre`/`post` under lock, `final` outside it).
    pub async fn modify(&self, mut ctx: ModifyCtx<T>) -> Result<Arc<T>, ClusterError> {
        let _guard = self.write_lock.lock().await;

        let mut clone = (*self.current()).clone();

        if let Some(pre) = ctx.pre.take() {
            pre(&mut clone)?;
        }

        if let Err(msg) = clone.assert_consistent() {
            return Err(ClusterError::Fatal(format!(
                "{} failed consistency check after pre: {msg}",
                T::kind_name()
            )));
        }
        clone.set_version(clone.version() + 1);
        self.persist(&clone);

        let installed = Arc::new(clone);
        *self.current.write() = installed.clone();
        info!(kind = T::kind_name(), version = installed.version(), "installed new version");

        if let Some(post) = ctx.post.take() {
            post(installed.clone()).await;
        }

        drop(_guard);

        if let Some(final_hook) = ctx.final_hook.take() {
            if ctx.wait {
                final_hook(installed.clone()).await;
            } else {
                let installed_bg = installed.clone();
                tokio::spawn(async move {
                    final_hook(installed_bg).await;
                });
            }
        }

        Ok(installed)
    }
}

impl<T: MetaKind + Serialize + DeserializeOwned> MetaOwner<T> {
    /// Adopts an externally-pushed revision (a metasync receive) if its
    /// version is strictly newer than what is currently installed.
    /// Out-of-order or duplicate deliveries are a no-op, per §4.3's
    /// delivery contract. Unlike `modify`, the incoming version is taken
    /// as-is rather than bumped, since it was already assigned by the
    /// sender.
    pub async fn adopt_if_newer(&self, incoming: T) -> bool {
        let _guard = self.write_lock.lock().await;
        let current = self.current();
        if incoming.cluster_uuid() != current.cluster_uuid() {
            let err = ClusterError::ClusterIntegrity {
                local: current.cluster_uuid().to_string(),
                remote: incoming.cluster_uuid().to_string(),
            };
            warn!(kind = T::kind_name(), %err, "rejected metasync revision from a foreign cluster");
            return false;
        }
        if incoming.version() <= current.version() {
            return false;
        }
        if let Err(msg) = incoming.assert_consistent() {
            warn!(kind = T::kind_name(), error = %msg, "rejected out-of-order or inconsistent metasync revision");
            return false;
        }
        self.persist(&incoming);
        let installed = Arc::new(incoming);
        info!(kind = T::kind_name(), version = installed.version(), "adopted metasync revision");
        *self.current.write() = installed;
        true
    }

    /// Unconditionally installs `incoming`, bypassing both the cluster-uuid
    /// and strictly-newer-version guards `adopt_if_newer` enforces. The only
    /// legitimate caller is the forced-primary-change merge (§4.4.6): the
    /// entire point of that protocol is to replace the local cluster's
    /// identity with the destination cluster's, so the ordinary foreign-uuid
    /// rejection does not apply.
    pub async fn force_install(&self, incoming: T) -> bool {
        let _guard = self.write_lock.lock().await;
        if let Err(msg) = incoming.assert_consistent() {
            warn!(kind = T::kind_name(), error = %msg, "rejected inconsistent forced-merge revision");
            return false;
        }
        self.persist(&incoming);
        let installed = Arc::new(incoming);
        info!(kind = T::kind_name(), version = installed.version(), "force-installed forced-merge revision");
        *self.current.write() = installed;
        true
    }
}

pub(crate) fn log_post_failure(kind: &'static str, err: &str) {
    warn!(kind, error = err, "post-modify hook failed; state remains installed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, serde::Deserialize)]
    struct Counter {
        version: u64,
        uuid: String,
        value: i64,
        poison: bool,
    }

    impl Counter {
        fn new(version: u64, value: i64, poison: bool) -> Self {
            Self { version, uuid: "U".to_string(), value, poison }
        }
    }

    impl MetaKind for Counter {
        fn version(&self) -> u64 {
            self.version
        }
        fn set_version(&mut self, version: u64) {
            self.version = version;
        }
        fn assert_consistent(&self) -> Result<(), String> {
            if self.poison { Err("poisoned".to_string()) } else { Ok(()) }
        }
        fn kind_name() -> &'static str {
            "counter"
        }
        fn cluster_uuid(&self) -> &str {
            &self.uuid
        }
    }

    #[tokio::test]
    async fn modify_bumps_version_and_swaps_atomically() {
        let owner = MetaOwner::new(Counter::new(1, 0, false), None);
        let installed = owner
            .modify(ModifyCtx::<Counter>::new().pre(|c: &mut Counter| {
                c.value += 1;
                Ok(())
            }))
            .await
            .unwrap();
        assert_eq!(installed.version, 2);
        assert_eq!(installed.value, 1);
        assert_eq!(owner.current().version, 2);
    }

    #[tokio::test]
    async fn modify_rejects_inconsistent_result_and_leaves_current_untouched() {
        let owner = MetaOwner::new(Counter::new(1, 0, false), None);
        let result = owner
            .modify(ModifyCtx::<Counter>::new().pre(|c: &mut Counter| {
                c.poison = true;
                Ok(())
            }))
            .await;
        assert!(result.is_err());
        assert_eq!(owner.current().version, 1, "a failed pre/consistency check must not install");
    }

    #[tokio::test]
    async fn adopt_if_newer_installs_strictly_newer_and_skips_stale() {
        let owner = MetaOwner::new(Counter::new(5, 0, false), None);
        assert!(!owner.adopt_if_newer(Counter::new(5, 99, false)).await);
        assert!(!owner.adopt_if_newer(Counter::new(3, 99, false)).await);
        assert_eq!(owner.current().value, 0, "stale or equal revisions must be a no-op");

        assert!(owner.adopt_if_newer(Counter::new(6, 42, false)).await);
        assert_eq!(owner.current().version, 6);
        assert_eq!(owner.current().value, 42);
    }

    #[tokio::test]
    async fn adopt_if_newer_rejects_foreign_cluster_uuid_even_if_newer() {
        let owner = MetaOwner::new(Counter::new(5, 0, false), None);
        let foreign = Counter { version: 9, uuid: "OTHER".to_string(), value: 77, poison: false };
        assert!(!owner.adopt_if_newer(foreign).await);
        assert_eq!(owner.current().version, 5, "a revision from a different cluster uuid must never install");
    }

    #[tokio::test]
    async fn adopt_if_newer_rejects_inconsistent_revision() {
        let owner = MetaOwner::new(
            Counter::new(1, 0, false),
            None,
        );
        assert!(!owner.adopt_if_newer(Counter { version: 2, uuid: "U".to_string(), value: 1, poison: true }).await);
        assert_eq!(owner.current().version, 1);
    }
}
