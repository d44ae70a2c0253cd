pub mod database;
pub mod jobservice;
pub mod observability;
pub mod registry_client;
pub mod webhook_sender;

pub use database::*;
pub use jobservice::HttpJobServiceClient;
pub use observability::*;
pub use registry_client::HttpRegistryClient;
pub use webhook_sender::HttpWebhookSender;
