pub mod capture;
pub mod card;
pub mod correction;
pub mod dedup;
pub mod dispatch;
pub mod guard;
pub mod notify;
pub mod parse;
pub mod patterns;
pub mod session;
pub mod two_factor;
pub mod workflows;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use capture::{Capture, Screenshot, SessionState};
pub use dedup::DedupStore;
pub use dispatch::{DispatchPolicy, DispatchReport, Dispatcher};
pub use guard::{ExecutionGuard, LockGuard};
pub use notify::{AlertSink, ChatBackend};
pub use session::{fetch_with_reauth, FileSource, PageSource};
pub use workflows::{Pipeline, RunDeps, RunStats};
