//! User-facing workspace and its message channel

mod messages;
mod workspace;

pub use messages::{Message, MessageLevel, Messages};
pub use workspace::{Prediction, Workspace};
