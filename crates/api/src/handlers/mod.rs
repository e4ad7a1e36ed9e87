pub mod gate;
pub mod jobs;
pub mod queues;
