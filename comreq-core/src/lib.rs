pub mod config;
pub mod error;
pub mod listener;
pub mod request;
pub mod state;

pub use config::{AppConfig, LogConfig, OutputConfig, SessionConfig};
pub use error::{CacheError, ConfigError};
pub use listener::{listener, ListenerId, ListenerResult, NotifyReport, SharedListener};
pub use request::{ComRequest, RequestId};
pub use state::RequestStateService;
