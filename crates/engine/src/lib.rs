//! Interactive filtering engine.
//!
//! One [`SessionManager`] owns the whole search lifecycle: every submitted
//! query bumps a shared generation counter, cancelling whatever session is
//! still running, and (after debouncing) starts a fresh [`session`] that
//! pulls candidates from a [`provider::SourceProvider`], scores them on the
//! shared [`pool::WorkerPool`] and streams throttled [`SessionUpdate`]
//! snapshots back to the caller.
//!
//! The generation counter is the only global mutable state; a session reads
//! its own generation once at start and treats any later value as a
//! cancellation signal, checked at every candidate pull and before every
//! scoring dispatch.

pub mod candidate;
pub mod error;
pub mod manager;
pub mod pool;
pub mod provider;
pub mod ranked;
pub mod session;

pub use candidate::{Candidate, ScoredCandidate};
pub use error::ProviderError;
pub use manager::{EngineOptions, ProviderFactory, SessionManager};
pub use pool::WorkerPool;
pub use provider::{CommandProvider, Fetch, MemoryProvider, PagedProvider, SourceProvider};
pub use ranked::RankedSet;
pub use session::{FailureKind, SessionEvent, SessionState, SessionUpdate, StaleFilter};
