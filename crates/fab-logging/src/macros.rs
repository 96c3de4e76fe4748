//! ---
//! fab_section: "03-persistence-logging"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Structured logging adapters and sinks."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
//! Context-aware wrappers around `tracing::event!`.

#[doc(hidden)]
#[macro_export]
macro_rules! __fab_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            client = ctx.client.unwrap_or(""),
            address = ctx.address.unwrap_or(""),
            task_id = ctx.task_id.unwrap_or_default(),
            process_id = ctx.process_id.unwrap_or_default(),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with client context.
#[macro_export]
macro_rules! fab_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fab_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fab_event!(tracing::Level::INFO, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a debug log enriched with client context.
#[macro_export]
macro_rules! fab_debug {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fab_event!(tracing::Level::DEBUG, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fab_event!(tracing::Level::DEBUG, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with client context.
#[macro_export]
macro_rules! fab_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fab_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fab_event!(tracing::Level::WARN, $crate::LogContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with client context.
#[macro_export]
macro_rules! fab_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fab_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fab_event!(tracing::Level::ERROR, $crate::LogContext::default(), $($arg)+)
    };
}
