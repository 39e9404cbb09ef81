//! # histscope: windowed history charts
//!
//! A chart engine for time series held in a remote history store. The
//! engine loads only the window being looked at, switches to server-side
//! binning for long spans, keeps a partially loaded series consistent while
//! the window is panned and zoomed, and plans axes whose labels never
//! overlap. It produces geometry; drawing is left to the host.
//!
//! ## Architecture
//!
//! - **Chart**: [`chart::HistoryChart`] owns state, store and scheduler for one chart
//! - **Backend**: [`backend::FetchBackend`] runs history reads on tokio
//! - **History**: [`history::HistorySource`] abstracts the history service
//! - **Protocol**: binary wire formats of raw and binned reads
//! - **Scripting**: Rhai display formulas mapping raw to displayed values
//! - **Communication**: Crossbeam channels between the chart host and the backend
//!
//! ## Configuration
//!
//! Chart configuration is read from the platform config directory under
//! `dev.hxyulin.histscope`:
//!
//! - **Linux**: `~/.config/dev.hxyulin.histscope/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.histscope/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.histscope\`
//!
//! ## Example
//!
//! ```ignore
//! use histscope::{AppConfig, FetchBackend, HistoryChart, MemoryHistory};
//! use std::sync::Arc;
//!
//! let config = AppConfig::load_or_default(None);
//! let mut chart = HistoryChart::new(config, 1200.0, 400.0)?;
//! let keys = chart.variables().iter().map(|v| v.key.clone()).collect();
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let (backend, frontend) =
//!     FetchBackend::new(Arc::new(MemoryHistory::new()), keys, runtime.handle().clone());
//! std::thread::spawn(move || backend.run());
//!
//! chart.start(now, None);
//! loop {
//!     for command in chart.take_commands() {
//!         frontend.dispatch(command);
//!     }
//!     for message in frontend.drain() {
//!         chart.apply(message, now);
//!     }
//!     if let Some(frame) = chart.frame(Instant::now(), now) {
//!         renderer.draw(&frame);
//!     }
//! }
//! ```

pub mod axis;
pub mod backend;
pub mod chart;
pub mod config;
pub mod error;
pub mod geometry;
pub mod history;
pub mod interaction;
pub mod mapper;
pub mod protocol;
pub mod scheduler;
pub mod scripting;
pub mod state;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use backend::{BackendMessage, FetchBackend, FrontendReceiver};
pub use chart::{ChartCommand, ChartEvent, Frame, HistoryChart};
pub use config::AppConfig;
pub use error::{HistScopeError, Result};
pub use history::{HistorySource, MemoryHistory};
pub use types::{Series, SeriesMode, Variable, VariableKey, Window};
