pub mod metrics;
pub mod models;
pub mod retry;
pub mod session;
pub mod settings;
