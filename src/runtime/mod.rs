//! Runtime
//!
//! Everything around the engine that deals with time and I/O: the effect
//! scheduler, the synchronous session, undo history and, behind the
//! `async-bridge` feature, a tokio driver.

pub mod history;
pub mod scheduler;
pub mod session;

#[cfg(feature = "async-bridge")]
pub mod async_driver;

pub use history::{History, HistoryEntry};
pub use scheduler::{Debouncer, DueWork, EffectScheduler};
pub use session::{PreviewRenderer, PreviewRequest, Session, SessionEvent};

#[cfg(feature = "async-bridge")]
pub use async_driver::AsyncSession;
