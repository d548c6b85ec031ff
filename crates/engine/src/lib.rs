//! Request-interception and caching engine for waypost.
//!
//! This crate provides the per-request pipeline that sits between an
//! installed web application and the network: classification, the
//! BYPASS / NETWORK_FIRST / CACHE_FIRST strategies, the install/activate
//! lifecycle and the client control channel.

pub mod classify;
pub mod clients;
pub mod control;
pub mod engine;
pub mod fetch;
pub mod lifecycle;
pub mod request;
pub mod strategy;

pub use classify::{Classifier, Disposition, InterceptFilter, Interception, PassThroughReason, PdfUserAgentFilter};
pub use clients::{ClientHandle, ClientId, ClientRegistry, EngineMessage};
pub use control::{ControlChannel, ControlMessage, ControlOutcome};
pub use engine::{Engine, Handled};
pub use fetch::{FetchConfig, FetchMode, HttpTransport, Transport};
pub use lifecycle::{ActivateReport, InstallReport, LifecycleController, Phase};
pub use request::{Body, EngineRequest, EngineResponse, ResponseSource};
pub use strategy::StrategyExecutor;
