//! Constants for the download module (timeouts, channel sizes).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes without receiving data).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Number of discovered tasks the crawler may run ahead of the transfer workers.
pub const CRAWL_CHANNEL_CAPACITY: usize = 64;
