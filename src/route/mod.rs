pub mod auth;
pub mod model;
pub mod posts;
pub mod users;
