pub mod context;
pub mod dispatcher;
pub mod filter;
pub mod http;
pub mod manifests;
pub mod metrics;
pub mod patterns;
pub mod plugins;
pub mod resolver;
pub mod selector;
pub mod url_repair;
