//! One-time loading and initialization of the external API bundle.
//!
//! The external API can only be initialized once per process, with a single
//! [`LoadConfiguration`]. A [`ScriptLoader`] guards that invariant: the first
//! [`ensure_loaded`](ScriptLoader::ensure_loaded) call starts the load, and
//! every caller (including ones that arrive while the load is in flight)
//! observes the same shared [`LoadSignal`].

use std::any::Any;
use std::fmt;
use std::sync::{Arc, LazyLock, Weak};

use async_trait::async_trait;
use maybe_sync::{MaybeSend, MaybeSync};
use parking_lot::Mutex;

use crate::async_runtime;
use crate::config::LoadConfiguration;
use crate::error::BridgeError;

/// Lifecycle stage of the external API initialization. Process-wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No load has been requested yet.
    NotStarted,
    /// The bundle is being fetched and initialized.
    Loading,
    /// The API is initialized and its handle is available.
    Ready,
    /// The load failed. Terminal: later load requests observe the same error.
    Failed,
}

/// The single opaque fetch of the external API bundle.
///
/// Implementations load the script by whatever means the platform offers
/// (a `<script>` tag on the web, an embedded engine elsewhere) and resolve
/// with the initialized API handle. Errors should use
/// [`BridgeError::ScriptLoad`]; any other error kind is coerced into it.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait ScriptFetcher<A>: MaybeSend + MaybeSync {
    /// Fetches and initializes the external API.
    async fn fetch(&self, config: &LoadConfiguration) -> Result<A, BridgeError>;
}

/// One-shot callback observing the outcome of the load.
pub trait LoadObserver<A>: MaybeSend {
    /// Delivers the load outcome, consuming the observer.
    fn notify(self: Box<Self>, outcome: Result<A, BridgeError>);
}

impl<A, F> LoadObserver<A> for F
where
    F: FnOnce(Result<A, BridgeError>) + MaybeSend,
{
    fn notify(self: Box<Self>, outcome: Result<A, BridgeError>) {
        self(outcome)
    }
}

enum Phase<A> {
    NotStarted,
    Loading { config: LoadConfiguration },
    Ready { config: LoadConfiguration, api: A },
    Failed { error: BridgeError },
}

struct LoaderInner<A> {
    phase: Phase<A>,
    next_waiter: u64,
    waiters: Vec<(u64, Box<dyn LoadObserver<A>>)>,
}

struct LoaderShared<A> {
    state: Mutex<LoaderInner<A>>,
}

impl<A> LoaderShared<A>
where
    A: Clone + MaybeSend + MaybeSync + 'static,
{
    fn complete(self: &Arc<Self>, outcome: Result<A, BridgeError>) {
        let (waiters, outcome) = {
            let mut inner = self.state.lock();
            let config = match std::mem::replace(&mut inner.phase, Phase::NotStarted) {
                Phase::Loading { config } => config,
                other => {
                    // Can only happen after a test-only reset raced the fetch.
                    inner.phase = other;
                    log::warn!("script load completion ignored: loader is not loading");
                    return;
                }
            };

            let outcome = match outcome {
                Ok(api) => {
                    log::info!("external API bundle is ready");
                    inner.phase = Phase::Ready {
                        config,
                        api: api.clone(),
                    };
                    Ok(api)
                }
                Err(error) => {
                    let error = match error {
                        e @ BridgeError::ScriptLoad(_) => e,
                        other => BridgeError::ScriptLoad(other.to_string()),
                    };
                    log::warn!("external API bundle failed to load: {error}");
                    inner.phase = Phase::Failed {
                        error: error.clone(),
                    };
                    Err(error)
                }
            };

            (std::mem::take(&mut inner.waiters), outcome)
        };

        // Waiters run outside the lock: a readiness callback may call back
        // into the loader (e.g. to subscribe another widget).
        for (_, waiter) in waiters {
            waiter.notify(outcome.clone());
        }
    }
}

/// Process-wide service that loads the external API exactly once.
///
/// The loader is generic over the API handle type `A` that the fetcher
/// resolves with; the handle is cloned into every subscriber.
pub struct ScriptLoader<A> {
    shared: Arc<LoaderShared<A>>,
    fetcher: Arc<dyn ScriptFetcher<A>>,
}

impl<A> Clone for ScriptLoader<A> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            fetcher: self.fetcher.clone(),
        }
    }
}

impl<A> ScriptLoader<A>
where
    A: Clone + MaybeSend + MaybeSync + 'static,
{
    /// Creates a loader that will use the given fetcher for the single load.
    pub fn new(fetcher: impl ScriptFetcher<A> + 'static) -> Self {
        Self {
            shared: Arc::new(LoaderShared {
                state: Mutex::new(LoaderInner {
                    phase: Phase::NotStarted,
                    next_waiter: 0,
                    waiters: Vec::new(),
                }),
            }),
            fetcher: Arc::new(fetcher),
        }
    }

    /// Requests the external API, starting the load if it has not started
    /// yet, and returns the shared readiness signal.
    ///
    /// The in-flight marker is set synchronously, before this method
    /// returns, so no concurrent or later caller can start a second load.
    /// A call with a configuration that differs from the one the load was
    /// started with fails fast with [`BridgeError::Configuration`]. After a
    /// failed load the returned signal rejects immediately with the sticky
    /// load error, whatever the configuration.
    pub fn ensure_loaded(
        &self,
        config: &LoadConfiguration,
    ) -> Result<LoadSignal<A>, BridgeError> {
        let start = {
            let mut inner = self.shared.state.lock();
            match &inner.phase {
                Phase::Loading { config: current } | Phase::Ready { config: current, .. }
                    if current != config =>
                {
                    return Err(BridgeError::Configuration(
                        "the external API was already requested with a different configuration"
                            .into(),
                    ));
                }
                _ => {}
            }

            let start = matches!(inner.phase, Phase::NotStarted);
            if start {
                inner.phase = Phase::Loading {
                    config: config.clone(),
                };
            }
            start
        };

        if start {
            log::info!("loading external API bundle");
            let shared = self.shared.clone();
            let fetcher = self.fetcher.clone();
            let config = config.clone();
            async_runtime::spawn(async move {
                let outcome = fetcher.fetch(&config).await;
                shared.complete(outcome);
            });
        }

        Ok(LoadSignal {
            shared: self.shared.clone(),
        })
    }

    /// Current load state.
    pub fn state(&self) -> LoadState {
        match self.shared.state.lock().phase {
            Phase::NotStarted => LoadState::NotStarted,
            Phase::Loading { .. } => LoadState::Loading,
            Phase::Ready { .. } => LoadState::Ready,
            Phase::Failed { .. } => LoadState::Failed,
        }
    }

    /// The loaded API handle, if the load has completed successfully.
    pub fn api(&self) -> Option<A> {
        match &self.shared.state.lock().phase {
            Phase::Ready { api, .. } => Some(api.clone()),
            _ => None,
        }
    }

    /// Forgets the load outcome and configuration, returning the loader to
    /// [`LoadState::NotStarted`]. Pending waiters are dropped without being
    /// notified. Test isolation only.
    #[cfg(feature = "_tests")]
    pub fn reset(&self) {
        let mut inner = self.shared.state.lock();
        inner.phase = Phase::NotStarted;
        inner.waiters.clear();
    }
}

/// Shared readiness signal of the one script load.
///
/// All subscribers, current and future, observe the same outcome: the API
/// handle on success or the sticky load error on failure.
pub struct LoadSignal<A> {
    shared: Arc<LoaderShared<A>>,
}

impl<A> LoadSignal<A>
where
    A: Clone + MaybeSend + MaybeSync + 'static,
{
    /// Subscribes to the load outcome.
    ///
    /// If the outcome is already known the observer is invoked before this
    /// method returns. Otherwise it is registered and invoked once the load
    /// completes, unless the returned waiter is cancelled first.
    pub fn subscribe(&self, observer: impl LoadObserver<A> + 'static) -> LoadWaiter<A> {
        let known = {
            let mut inner = self.shared.state.lock();
            match &inner.phase {
                Phase::Ready { api, .. } => Some(Ok(api.clone())),
                Phase::Failed { error } => Some(Err(error.clone())),
                _ => {
                    let id = inner.next_waiter;
                    inner.next_waiter += 1;
                    inner.waiters.push((id, Box::new(observer)));
                    return LoadWaiter {
                        shared: Arc::downgrade(&self.shared),
                        id: Some(id),
                    };
                }
            }
        };

        if let Some(outcome) = known {
            LoadObserver::notify(Box::new(observer), outcome);
        }
        LoadWaiter {
            shared: Weak::new(),
            id: None,
        }
    }
}

impl<A> Clone for LoadSignal<A> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<A> fmt::Debug for LoadSignal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadSignal").finish()
    }
}

/// A pending readiness wait. Cancelling it guarantees the observer will
/// never be invoked afterwards.
pub struct LoadWaiter<A> {
    shared: Weak<LoaderShared<A>>,
    id: Option<u64>,
}

impl<A> LoadWaiter<A> {
    /// Cancels the wait. A no-op if the observer has already been notified.
    pub fn cancel(self) {
        if let (Some(shared), Some(id)) = (self.shared.upgrade(), self.id) {
            shared.state.lock().waiters.retain(|(wid, _)| *wid != id);
        }
    }
}

static GLOBAL_LOADER: LazyLock<Mutex<Option<Arc<dyn Any + Send + Sync>>>> =
    LazyLock::new(|| Mutex::new(None));

/// Installs the process-global loader instance. The first writer wins;
/// returns `false` (keeping the existing loader) if one is already installed.
pub fn install_global<A>(loader: Arc<ScriptLoader<A>>) -> bool
where
    A: Clone + MaybeSend + MaybeSync + 'static,
    ScriptLoader<A>: Send + Sync,
{
    let mut slot = GLOBAL_LOADER.lock();
    if slot.is_some() {
        log::warn!("global script loader is already installed; keeping the first one");
        return false;
    }
    *slot = Some(loader);
    true
}

/// Returns the process-global loader, if one of this API handle type has
/// been installed.
pub fn global<A>() -> Option<Arc<ScriptLoader<A>>>
where
    A: Clone + MaybeSend + MaybeSync + 'static,
    ScriptLoader<A>: Send + Sync,
{
    let slot = GLOBAL_LOADER.lock().clone();
    slot.and_then(|any| any.downcast::<ScriptLoader<A>>().ok())
}

/// Clears the process-global loader slot. Test isolation only.
#[cfg(feature = "_tests")]
pub fn reset_global() {
    *GLOBAL_LOADER.lock() = None;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use futures_intrusive::sync::ManualResetEvent;

    use super::*;
    use crate::config::Lang;

    type TestApi = Arc<str>;

    struct CountingFetcher {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ScriptFetcher<TestApi> for CountingFetcher {
        async fn fetch(&self, _config: &LoadConfiguration) -> Result<TestApi, BridgeError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::from("api"))
        }
    }

    struct GatedFetcher {
        count: Arc<AtomicUsize>,
        gate: Arc<ManualResetEvent>,
    }

    #[async_trait]
    impl ScriptFetcher<TestApi> for GatedFetcher {
        async fn fetch(&self, _config: &LoadConfiguration) -> Result<TestApi, BridgeError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.gate.wait().await;
            Ok(Arc::from("api"))
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl ScriptFetcher<TestApi> for FailingFetcher {
        async fn fetch(&self, _config: &LoadConfiguration) -> Result<TestApi, BridgeError> {
            Err(BridgeError::ScriptLoad("bundle unreachable".into()))
        }
    }

    /// Lets spawned tasks on the current-thread test runtime run to their
    /// next suspension point.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn config() -> LoadConfiguration {
        LoadConfiguration::new(Lang::EnUs).with_apikey("key")
    }

    #[test]
    fn script_loads_once_for_many_subscribers() {
        tokio_test::block_on(async {
            let count = Arc::new(AtomicUsize::new(0));
            let loader = ScriptLoader::new(CountingFetcher {
                count: count.clone(),
            });

            let results = Arc::new(Mutex::new(Vec::new()));
            for _ in 0..3 {
                let signal = loader.ensure_loaded(&config()).expect("load request failed");
                let results = results.clone();
                signal.subscribe(move |outcome: Result<TestApi, BridgeError>| {
                    results.lock().push(outcome.is_ok());
                });
            }

            settle().await;

            assert_eq!(count.load(Ordering::SeqCst), 1);
            assert_eq!(*results.lock(), vec![true, true, true]);
            assert_eq!(loader.state(), LoadState::Ready);

            // A late subscriber observes the outcome immediately.
            let late = Arc::new(AtomicUsize::new(0));
            let l = late.clone();
            let signal = loader.ensure_loaded(&config()).expect("load request failed");
            signal.subscribe(move |outcome: Result<TestApi, BridgeError>| {
                assert!(outcome.is_ok());
                l.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(late.load(Ordering::SeqCst), 1);
            assert_eq!(count.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn conflicting_configuration_fails_fast() {
        tokio_test::block_on(async {
            let count = Arc::new(AtomicUsize::new(0));
            let gate = Arc::new(ManualResetEvent::new(false));
            let loader = ScriptLoader::new(GatedFetcher {
                count: count.clone(),
                gate: gate.clone(),
            });

            loader.ensure_loaded(&config()).expect("load request failed");
            settle().await;

            // Conflicting request while the load is in flight.
            let other = LoadConfiguration::new(Lang::RuRu);
            assert_matches!(
                loader.ensure_loaded(&other),
                Err(BridgeError::Configuration(_))
            );

            gate.set();
            settle().await;
            assert_eq!(loader.state(), LoadState::Ready);

            // And after it completed.
            assert_matches!(
                loader.ensure_loaded(&other),
                Err(BridgeError::Configuration(_))
            );
            assert_eq!(count.load(Ordering::SeqCst), 1);

            // The matching configuration still shares the outcome.
            let signal = loader.ensure_loaded(&config()).expect("load request failed");
            assert_eq!(format!("{signal:?}"), "LoadSignal");
        });
    }

    #[test]
    fn load_failure_is_sticky() {
        tokio_test::block_on(async {
            let loader = ScriptLoader::new(FailingFetcher);

            let signal = loader.ensure_loaded(&config()).expect("load request failed");
            let first = Arc::new(Mutex::new(None));
            let f = first.clone();
            signal.subscribe(move |outcome: Result<TestApi, BridgeError>| {
                *f.lock() = Some(outcome);
            });

            settle().await;
            assert_eq!(loader.state(), LoadState::Failed);
            assert_matches!(&*first.lock(), Some(Err(BridgeError::ScriptLoad(_))));

            // Every later request re-rejects immediately, whatever the
            // configuration, and no second load is attempted.
            let signal = loader
                .ensure_loaded(&LoadConfiguration::new(Lang::TrTr))
                .expect("failed state must re-reject through the signal");
            let second = Arc::new(Mutex::new(None));
            let s = second.clone();
            signal.subscribe(move |outcome: Result<TestApi, BridgeError>| {
                *s.lock() = Some(outcome);
            });
            assert_matches!(&*second.lock(), Some(Err(BridgeError::ScriptLoad(_))));
        });
    }

    #[test]
    fn cancelled_waiter_never_fires() {
        tokio_test::block_on(async {
            let gate = Arc::new(ManualResetEvent::new(false));
            let loader = ScriptLoader::new(GatedFetcher {
                count: Arc::new(AtomicUsize::new(0)),
                gate: gate.clone(),
            });

            let signal = loader.ensure_loaded(&config()).expect("load request failed");
            let fired = Arc::new(AtomicUsize::new(0));
            let f = fired.clone();
            let waiter = signal.subscribe(move |_: Result<TestApi, BridgeError>| {
                f.fetch_add(1, Ordering::SeqCst);
            });

            waiter.cancel();
            gate.set();
            settle().await;

            assert_eq!(loader.state(), LoadState::Ready);
            assert_eq!(fired.load(Ordering::SeqCst), 0);
        });
    }

    #[test]
    fn global_slot_is_first_writer_wins() {
        reset_global();

        let loader = Arc::new(ScriptLoader::<TestApi>::new(FailingFetcher));
        assert!(install_global(loader.clone()));
        assert!(!install_global(Arc::new(ScriptLoader::<TestApi>::new(
            FailingFetcher
        ))));

        let found = global::<TestApi>().expect("loader must be installed");
        assert!(Arc::ptr_eq(&found, &loader));

        reset_global();
        assert!(global::<TestApi>().is_none());
    }
}
