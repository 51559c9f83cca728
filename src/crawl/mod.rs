//! Bounded-concurrency crawl of detail pages over a pool of browser sessions.

pub mod ledger;
pub mod scheduler;
pub mod session;

pub use ledger::{CrawlOutcome, FailureLedger};
pub use scheduler::CrawlScheduler;
pub use session::{DebugCapture, Session, SessionFactory};
