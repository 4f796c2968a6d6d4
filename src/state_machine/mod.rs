mod job;
mod state;

pub use job::{ContentType, Job, JobPatch, NewJob, RunOptions, short_id};
pub use state::{JobStatus, StateMachine, Transition};
