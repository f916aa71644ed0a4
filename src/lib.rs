pub mod config;
pub mod data;
pub mod error;
pub mod framework;
pub mod layout;
pub mod message;
pub mod panic_handler;
pub mod promise;
pub mod realtime;
pub mod scope;
pub mod types;
pub mod viewer;
pub mod zoom;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the entry points
pub use config::{Config, LayoutMode};
pub use framework::{Component, ComponentKind, Framework, Plugin};
pub use message::Message;
pub use scope::Scope;
pub use viewer::{PageLayer, Viewer, ViewerPhase};
