mod actor;
mod call;
mod event;
mod namespace;
mod options;

pub use actor::WorkerActor;
pub use call::{BindingSummary, WorkerCall, WorkerReply};
pub use event::WorkerEvent;
pub use namespace::Namespace;
pub use options::{WorkerEnvironment, WorkerOptions};
