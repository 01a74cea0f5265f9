pub mod api;
pub mod client;

pub use api::{Invoker, Notify};
pub use client::{ScheduleClient, Snapshots, FETCH_RETRY};
