//! Type-safe cache key builders

use std::fmt;

pub const VERSION: &str = "v1";

pub mod ratelimit {
    use super::*;

    pub const NAMESPACE: &str = "ratelimit";

    /// Counter for one client within one rate-limit scope.
    #[derive(Debug, Clone)]
    pub struct RateLimitKey {
        pub scope: String,
        pub client: String,
    }

    impl RateLimitKey {
        pub fn new(scope: impl Into<String>, client: impl Into<String>) -> Self {
            Self {
                scope: scope.into(),
                client: client.into(),
            }
        }
    }

    impl fmt::Display for RateLimitKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(
                f,
                "{}:{}:{}:{}",
                VERSION, NAMESPACE, self.scope, self.client
            )
        }
    }
}
