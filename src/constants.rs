use std::time::Duration;

pub const ANNOTATION_ENABLED: &str = "svcdns.io/enabled";
pub const ANNOTATION_HOSTNAME: &str = "svcdns.io/hostname";

pub const RECORD_KEY_PREFIX: &str = "dns:";
/// Deadline for a single store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// TTL written by the reconciler. Short on purpose: resync refreshes live records.
pub const DEFAULT_RECORD_TTL_SECS: u32 = 10;
/// TTL answered for stored records that carry none.
pub const DEFAULT_ANSWER_TTL_SECS: u32 = 3600;

pub const DEFAULT_WORKER_COUNT: usize = 1;
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(5);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(1000);
pub const WATCH_RESTART_DELAY: Duration = Duration::from_secs(1);

pub const DEFAULT_DNS_BIND_ADDRESS: &str = "0.0.0.0:53";
pub const DEFAULT_DNS_TCP_TIMEOUT: Duration = Duration::from_secs(5);
