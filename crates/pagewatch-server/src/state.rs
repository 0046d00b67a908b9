use pagewatch_core::notify::{ChannelSender, NotificationDispatcher};
use pagewatch_core::proxy_pool::ProxyPool;
use pagewatch_core::scheduler::Scheduler;
use pagewatch_core::traits::{PageFetcher, Storage};

/// Scheduler wired to a notification dispatcher over channel sender `C`.
pub type WatchScheduler<F, S, C> = Scheduler<F, S, NotificationDispatcher<C>>;

/// Shared application state, available to handlers via `State<Arc<AppState<..>>>`.
pub struct AppState<F, S, C> {
    pub scheduler: WatchScheduler<F, S, C>,
    /// The pool the fetcher draws from; both hold the same shared inner state.
    pub proxies: ProxyPool,
    pub api_key: String,
}

impl<F, S, C> AppState<F, S, C>
where
    F: PageFetcher,
    S: Storage,
    C: ChannelSender,
{
    pub fn notifications(&self) -> &NotificationDispatcher<C> {
        self.scheduler.notifier()
    }
}
