//! TUI module for camview
//!
//! Terminal user interface using Ratatui.

mod app;
pub mod log_capture;
mod ui;

pub use app::run;
