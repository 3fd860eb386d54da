//! Tracking pipeline
//!
//! This module holds everything between the probe feed and the history
//! store: the mutable tracking context, the watch registry over page
//! signals, the send-click filter, gem identity tracking, the status
//! indicator, the crash detector, and the engine that wires them into a
//! single dispatcher.

pub mod context;
pub mod engine;
pub mod gem;
pub mod observer;
pub mod send;
pub mod status;
pub mod watchdog;

pub use context::{CaptureState, TrackingContext};
pub use engine::{EngineCommand, EngineHandle, ReinitReason, TrackerEngine};
pub use gem::GemDetector;
pub use observer::{ObserverHandle, ObserverRegistry, UrlPair, WatchKind};
pub use send::{SendClickFilter, DEFAULT_SEND_PATTERNS};
pub use status::{StatusIndicator, TrackingStatus};
pub use watchdog::{CrashDetector, HealthHandle, HealthSnapshot, WatchdogConfig};
