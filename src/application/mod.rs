pub mod ai;
pub mod bootstrap;
pub mod database;
pub mod schedule_sync;
pub mod session;
