use crate::task::TaskReporter;
use crate::worker::call::{WorkerCall, WorkerReply};

pub enum WorkerEvent {
    RunTask {
        call: WorkerCall,
        reporter: TaskReporter<WorkerReply>,
    },
    Shutdown,
}
