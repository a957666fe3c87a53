mod logging;

pub use logging::{log_requests_middleware, trace_span_for};
