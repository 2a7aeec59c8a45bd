//! Kanban board client: REST task store, STOMP push bridge and the board
//! reconciler that merges both into one consistent task list.

pub mod board;
pub mod cli;
pub mod config;
pub mod realtime;
pub mod store;
