//! Shared row types and change-feed model for `Taskboard`.

pub mod assignment;
pub mod change;
pub mod codec;
pub mod notification;
pub mod presence;
pub mod profile;
pub mod task;

mod ids;
