// Logging macros for dpram-link
//
// Thin forwarders to the tracing crate so call sites stay short and the
// backend can be swapped in one place.

#![allow(unused_macro_rules)]

// trace! - per-transfer detail: pointer values, byte counts, mailbox writes
macro_rules! trace {
    ($($arg:tt)*) => { ::tracing::trace!($($arg)*) }
}

// debug! - decisions: deferrals, ignored events, worker lifecycle
macro_rules! debug {
    ($($arg:tt)*) => { ::tracing::debug!($($arg)*) }
}

// info! - mode changes and handshakes
macro_rules! info {
    ($($arg:tt)*) => { ::tracing::info!($($arg)*) }
}

// warn! - recoverable faults
macro_rules! warn {
    ($($arg:tt)*) => { ::tracing::warn!($($arg)*) }
}

// error! - faults that force a CP crash
macro_rules! error {
    ($($arg:tt)*) => { ::tracing::error!($($arg)*) }
}
