//! `Taskboard`: collaborative task board library.
//!
//! Reconciles a shared task collection from a snapshot plus a change feed,
//! tracks who is online over the profile directory, and notifies assignees.

pub mod auth;
pub mod backend;
pub mod board;
pub mod config;
pub mod notify;
pub mod presence;
pub mod session;
