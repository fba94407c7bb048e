#![doc = include_str!("../README.md")]

pub mod server;

pub use server::config::{AdmissionPolicy, CliArgs, ServerConfig, SupervisorConfig};
pub use server::engine::{CommandRenderer, Renderer};
pub use server::lock::{RequestLock, WaitingSignal};
pub use server::request::{Request, ResultHandle};
pub use server::supervisor::{ShutdownHandle, Supervisor};
pub use server::transport::Transport;
// Public re-export so transports and renderers only need one dependency.
pub use webshot_core;
