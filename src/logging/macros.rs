// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logging macros for convenient logging
//
// All of them capture the call site, since the facade's level methods are
// `#[track_caller]`.

/// Log a message with fatal severity and flush it to disk
///
/// # Examples
/// ```ignore
/// log_fatal!(log, "cannot continue: {}", err);
/// ```
#[macro_export]
macro_rules! log_fatal {
    ($log:expr, $($arg:tt)+) => {
        $log.fatal(::std::format_args!($($arg)+))
    };
}

/// Log a message with error severity
///
/// # Examples
/// ```ignore
/// log_error!(log, "request {} failed", id);
/// ```
#[macro_export]
macro_rules! log_error {
    ($log:expr, $($arg:tt)+) => {
        $log.error(::std::format_args!($($arg)+))
    };
}

/// Log a message with warning severity
#[macro_export]
macro_rules! log_warning {
    ($log:expr, $($arg:tt)+) => {
        $log.warning(::std::format_args!($($arg)+))
    };
}

/// Log a message with info severity
#[macro_export]
macro_rules! log_info {
    ($log:expr, $($arg:tt)+) => {
        $log.info(::std::format_args!($($arg)+))
    };
}

/// Log a message with debug severity
#[macro_export]
macro_rules! log_debug {
    ($log:expr, $($arg:tt)+) => {
        $log.debug(::std::format_args!($($arg)+))
    };
}
