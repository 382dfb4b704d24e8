pub mod auth;
pub mod classes;
pub mod core;
pub mod outbox;
pub mod submissions;
pub mod users;
pub mod violations;
