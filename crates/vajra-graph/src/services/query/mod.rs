pub mod service;

pub use service::{QueryService, DEFAULT_SEARCH_LIMIT, THREAT_NODE_TYPES};
