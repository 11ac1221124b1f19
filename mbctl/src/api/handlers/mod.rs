pub mod models;
pub mod monitor;
pub mod projects;
pub mod proxy;
