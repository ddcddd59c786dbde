// Logging macros, gated by the optional `log` feature: a no-op
// expression when `log` is disabled, `log::$level!` otherwise.

#[allow(unused_macros)]
macro_rules! mr_trace {
    ($($arg:expr),*) => {
        #[cfg(feature = "log")]
        log::trace!($($arg),*);
    }
}

#[allow(unused_macros)]
macro_rules! mr_debug {
    ($($arg:expr),*) => {
        #[cfg(feature = "log")]
        log::debug!($($arg),*);
    }
}

#[allow(unused_macros)]
macro_rules! mr_warn {
    ($($arg:expr),*) => {
        #[cfg(feature = "log")]
        log::warn!($($arg),*);
    }
}

#[allow(unused_macros)]
macro_rules! mr_error {
    ($($arg:expr),*) => {
        #[cfg(feature = "log")]
        log::error!($($arg),*);
    }
}
