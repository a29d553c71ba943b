//! Callback system for training events
//!
//! Callbacks observe the run at epoch, batch and micro-batch boundaries and
//! may rewrite the step logs. They influence the run only through the
//! [`CallbackAction`] they return: stop at the next epoch boundary, or ask
//! for a checkpoint.
//!
//! # Example
//!
//! ```rust
//! use ajustar::train::callback::{Callback, CallbackList, EarlyStopping, TerminateOnNaN};
//!
//! let user: Vec<Box<dyn Callback>> = vec![
//!     Box::new(EarlyStopping::new(5, 0.001)),
//!     Box::new(TerminateOnNaN::new()),
//! ];
//! let list = CallbackList::assemble(user, None, None);
//! assert_eq!(list.names(), vec!["EarlyStopping", "TerminateOnNaN", "History"]);
//! ```

mod checkpoint;
mod early_stopping;
mod history;
mod list;
mod progress;
mod smooth;
mod terminate_on_nan;
mod traits;

pub use checkpoint::{CheckpointCallback, SaveTrigger};
pub use early_stopping::{EarlyStopping, MonitorMode};
pub use history::{EpochRecord, History, StepRecord};
pub use list::{CallbackList, Dispatch};
pub use progress::{format_duration, KalmanEta, ProgressBar};
pub use smooth::SmoothMetrics;
pub use terminate_on_nan::TerminateOnNaN;
pub use traits::{Callback, CallbackAction, CallbackRole, TrainParams};
