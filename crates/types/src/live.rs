//! Hot-reloadable configuration, mirroring the teacher's
//! `restate_types::live`/`Updateable` pattern threaded through
//! `RocksDbOptions`/`StorageOptions`/`LogServerOptions` in the source
//! repository (`crates/storage-rocksdb/src/lib.rs`,
//! `crates/log-server/src/rocksdb_logstore/store.rs`).

use std::sync::Arc;

use arc_swap::ArcSwap;

/// Something that can be asked, repeatedly, for the current value of a
/// configuration fragment. `Live<T>` is the concrete root; `.map(...)`
/// produces a derived view over a sub-field without cloning the whole
/// configuration on every read.
pub trait Updateable<T> {
    fn load(&mut self) -> &T;
}

/// A type-erased [`Updateable`], the shape every crucible API that accepts
/// "some live configuration" actually takes, so callers don't need to name
/// the concrete mapped closure type.
pub type BoxedLiveLoad<T> = Box<dyn Updateable<T> + Send>;

/// The root of a hot-reloadable configuration tree.
///
/// Cloning a `Live<T>` is cheap (it shares the underlying `ArcSwap`);
/// updates published through [`Live::store`] become visible to every
/// clone and every derived `.map()` view on their next `load()`.
#[derive(Clone)]
pub struct Live<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Live<T> {
    pub fn from_value(value: T) -> Self {
        Live {
            inner: Arc::new(ArcSwap::from_pointee(value)),
        }
    }

    pub fn store(&self, value: T) {
        self.inner.store(Arc::new(value));
    }

    pub fn live_load(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Derive a view over a sub-field, re-projected on every `load()`.
    pub fn map<U, F>(&self, project: F) -> Mapped<T, U, F>
    where
        F: Fn(&T) -> &U,
    {
        Mapped {
            live: self.clone(),
            project,
            current: None,
        }
    }

    /// An [`Updateable`] view of the whole value (identity projection).
    pub fn boxed(&self) -> BoxedLiveLoad<T>
    where
        T: Send + Sync + 'static,
    {
        self.map(|v| v).boxed()
    }
}

/// A derived, lazily re-projected view of a [`Live<T>`] sub-field.
pub struct Mapped<T, U, F> {
    live: Live<T>,
    project: F,
    current: Option<Arc<T>>,
}

impl<T, U, F> Mapped<T, U, F>
where
    F: Fn(&T) -> &U,
{
    pub fn boxed(self) -> BoxedLiveLoad<U>
    where
        T: Send + Sync + 'static,
        U: Send + Sync + 'static,
        F: Send + 'static,
    {
        Box::new(self)
    }
}

impl<T, U, F> Updateable<U> for Mapped<T, U, F>
where
    F: Fn(&T) -> &U,
{
    fn load(&mut self) -> &U {
        self.current = Some(self.live.live_load());
        (self.project)(self.current.as_ref().expect("just set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Config {
        retries: u32,
    }

    #[test]
    fn live_reflects_latest_store() {
        let live = Live::from_value(Config { retries: 3 });
        let mut view = live.map(|c| &c.retries).boxed();
        assert_eq!(*view.load(), 3);

        live.store(Config { retries: 9 });
        assert_eq!(*view.load(), 9);
    }
}
