//! Event handling.

use crate::error::SimResult;
use crate::event::Event;

/// Trait for consuming events in simulation components.
pub trait EventHandler {
    /// Processes event.
    ///
    /// An error aborts the simulation run.
    fn on(&mut self, event: Event) -> SimResult;
}

/// Enables the use of pattern matching syntax for processing different types of events
/// by downcasting the event payload from [`EventData`](crate::event::EventData) to user-defined types.
///
/// Each arm must evaluate to [`SimResult`]. Payloads of other types are logged as unhandled and ignored.
///
/// ```rust
/// use serde::Serialize;
/// use fabricsim::{cast, Event, EventHandler, SimResult};
///
/// #[derive(Clone, Serialize)]
/// struct Ping {
///     seq: u32,
/// }
///
/// struct Counter {
///     last: u32,
/// }
///
/// impl EventHandler for Counter {
///     fn on(&mut self, event: Event) -> SimResult {
///         cast!(match event.data {
///             Ping { seq } => {
///                 self.last = seq;
///                 Ok(())
///             }
///         })
///     }
/// }
/// ```
#[macro_export]
macro_rules! cast {
    ( match $event:ident.data { $( $type:ident { $($tt:tt)* } => { $($expr:tt)* } )+ } ) => {
        'cast: {
            let mut __data = $event.data;
            $(
                __data = match __data.downcast::<$type>() {
                    Ok(__value) => {
                        let $type { $($tt)* } = *__value;
                        break 'cast ({ $($expr)* });
                    }
                    Err(__other) => __other,
                };
            )+
            $crate::log::log_unhandled_event($event.id, $event.time, $event.src, $event.dst, __data);
            Ok(())
        }
    };
}
