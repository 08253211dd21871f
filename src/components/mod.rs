//! Components managed by the registry.
//!
//! Each kind exposes the narrow surface the lifecycle needs: start/stop for
//! the scheduler and HTTP server, close/stop for data-store and coordination
//! clients, and a dispatch plus raw writer for loggers.

pub mod coordination;
pub mod logger;
pub mod scheduler;
pub mod server;
pub mod store;

pub use coordination::{
    CoordinationClient, CoordinationConnector, DefaultCoordinationConnector,
    LazyCoordinationClient,
};
pub use logger::{LogWriter, Logger};
pub use scheduler::{CrontabTask, JobFn, Scheduler};
pub use server::{HttpServer, RouteRegistration};
pub use store::{DefaultDocumentStoreConnector, DocumentStore, DocumentStoreConnector, LazyDocumentStore};

/// Splits `host:port`, rejecting empty hosts and non-numeric ports.
pub(crate) fn split_host_port(addr: &str) -> Option<(&str, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    Some((host, port.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("db1:27017"), Some(("db1", 27017)));
        assert_eq!(split_host_port("[::1]:2181"), Some(("[::1]", 2181)));
        assert_eq!(split_host_port("db1"), None);
        assert_eq!(split_host_port(":80"), None);
        assert_eq!(split_host_port("db1:http"), None);
    }
}
