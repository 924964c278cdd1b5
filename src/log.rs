//! Logging facilities.
//!
//! The macros prefix each line with the simulation time, a colored level tag and the component name,
//! and use the component name as the log target so output can be filtered per component.

use colored::{ColoredString, Colorize};
use serde_type_name::type_name;

use crate::component::Id;
use crate::event::{EventData, EventId};

/// Formats a log line for the given component.
#[doc(hidden)]
pub fn format_line(time: f64, level: ColoredString, component: &str, msg: std::fmt::Arguments) -> String {
    format!("[{:.9} {} {}] {}", time, level, component, msg)
}

/// Logs a message at the trace level.
#[macro_export]
macro_rules! log_trace {
    ($ctx:expr, $($arg:tt)+) => (
        if ::log::log_enabled!(target: $ctx.name(), ::log::Level::Trace) {
            ::log::trace!(
                target: $ctx.name(),
                "{}",
                $crate::log::format_line($ctx.time(), $crate::colored::Colorize::blue("TRACE"), $ctx.name(), format_args!($($arg)+))
            );
        }
    );
}

/// Logs a message at the debug level.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $($arg:tt)+) => (
        if ::log::log_enabled!(target: $ctx.name(), ::log::Level::Debug) {
            ::log::debug!(
                target: $ctx.name(),
                "{}",
                $crate::log::format_line($ctx.time(), $crate::colored::Colorize::cyan("DEBUG"), $ctx.name(), format_args!($($arg)+))
            );
        }
    );
}

/// Logs a message at the info level.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $($arg:tt)+) => (
        if ::log::log_enabled!(target: $ctx.name(), ::log::Level::Info) {
            ::log::info!(
                target: $ctx.name(),
                "{}",
                $crate::log::format_line($ctx.time(), $crate::colored::Colorize::green("INFO"), $ctx.name(), format_args!($($arg)+))
            );
        }
    );
}

/// Logs a message at the warn level.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $($arg:tt)+) => (
        ::log::warn!(
            target: $ctx.name(),
            "{}",
            $crate::log::format_line($ctx.time(), $crate::colored::Colorize::yellow("WARN"), $ctx.name(), format_args!($($arg)+))
        )
    );
}

/// Logs a message at the error level.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $($arg:tt)+) => (
        ::log::error!(
            target: $ctx.name(),
            "{}",
            $crate::log::format_line($ctx.time(), $crate::colored::Colorize::red("ERROR"), $ctx.name(), format_args!($($arg)+))
        )
    );
}

fn payload_json(data: &dyn EventData) -> String {
    serde_json::to_string(data).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

fn payload_type(data: &dyn EventData) -> &'static str {
    type_name(&data).unwrap_or("<unknown>")
}

pub(crate) fn log_undelivered_event(id: EventId, time: f64, src: Id, dst: Id, data: &dyn EventData) {
    ::log::warn!(
        target: "simulation",
        "[{:.9} {} simulation] Discarded event {} {} for component {} without handler (src {}): {}",
        time,
        "WARN".yellow(),
        id,
        payload_type(data),
        dst,
        src,
        payload_json(data)
    );
}

/// Logs an event whose payload type the handler does not match.
#[doc(hidden)]
pub fn log_unhandled_event(id: EventId, time: f64, src: Id, dst: Id, data: Box<dyn EventData>) {
    ::log::warn!(
        target: "simulation",
        "[{:.9} {} simulation] Unhandled event {} {} at component {} (src {}): {}",
        time,
        "WARN".yellow(),
        id,
        payload_type(data.as_ref()),
        dst,
        src,
        payload_json(data.as_ref())
    );
}
