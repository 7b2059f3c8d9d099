mod database;
mod logging;
mod socket_auth;

pub use database::Database;
pub use logging::RequestLogger;
pub use socket_auth::TokenSocketAuth;
