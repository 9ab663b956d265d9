//! Long-running tasks spawned next to the HTTP server

pub mod alarm_dispatcher;

pub use alarm_dispatcher::alarm_dispatcher_task;
