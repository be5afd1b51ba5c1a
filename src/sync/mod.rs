pub mod monitor;
pub mod runtime;
pub mod service;

pub use monitor::monitor;
pub use runtime::HttpRuntimeClient;
pub use service::{ModelState, Registry, run_publisher};
