//! Integration tests for mcp-compose.
//!
//! Everything here drives the assembled system: the proxy router with the
//! OAuth endpoints mounted, real sessions against scripted stdio backends,
//! and the lifecycle scheduler over the `NullRuntime`.

#[cfg(test)]
mod support;

#[cfg(test)]
mod lifecycle_tests;
#[cfg(test)]
mod oauth_flow_tests;
#[cfg(test)]
mod proxy_bridge_tests;
