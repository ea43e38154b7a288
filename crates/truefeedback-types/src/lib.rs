pub mod api;
pub mod models;
pub mod suggestions;
pub mod verification;
