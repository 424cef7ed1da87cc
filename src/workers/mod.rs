//! Background tasks started by the server and stopped at shutdown.

pub mod rate_limit_sweeper;
