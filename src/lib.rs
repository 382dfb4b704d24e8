pub mod api;
pub mod auth;
pub mod backup;
pub mod classes;
pub mod config;
pub mod db;
pub mod ipc;
pub mod outbox;
pub mod resolve;
pub mod submissions;
pub mod users;
pub mod violations;
