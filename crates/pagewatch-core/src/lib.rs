pub mod detect;
pub mod error;
pub mod memory;
pub mod models;
pub mod notify;
pub mod proxy_pool;
pub mod scheduler;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use detect::{ChangeAnalysis, ChangeDetection, classify, detect_change, filter_noise};
pub use error::AppError;
pub use memory::MemoryStorage;
pub use models::{
    ChangeRecord, ChangeType, CheckInterval, ContentMode, DiffLine, DiffLineKind, FetchConfig,
    FetchedPage, Importance, NotifyChannels, RenderMode, Snapshot, SnapshotMetadata, Target,
    TargetPatch, compute_hash,
};
pub use notify::{
    ChangeNotice, ChannelKind, ChannelSender, Delivery, DispatchReport, NotificationDispatcher,
    NotifierDefaults,
};
pub use proxy_pool::{MAX_PROXY_FAILURES, ProxyEntry, ProxyPool, ProxyPoolStatus};
pub use scheduler::{
    CheckOutcome, Scheduler, SchedulerEvent, SchedulerReporter, SchedulerStatus,
    TracingSchedulerReporter,
};
pub use traits::{Notifier, PageFetcher, Storage};
