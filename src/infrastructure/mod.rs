pub mod credentials;
pub mod file_cache;
pub mod ga_client;

pub use credentials::{locate_credentials, ServiceAccountKey, TokenProvider};
pub use file_cache::FileCache;
pub use ga_client::GaClient;
