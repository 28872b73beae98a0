//! Collaborator traits
//!
//! The external pieces the workflow drives, behind interfaces so tests can
//! substitute them.
//!
//! - [`DnsClient`]: raw DNS provider API
//! - [`SpeedTester`]: external speed test process
//! - [`IpSource`]: candidate IP list

pub mod dns_client;
pub mod ip_source;
pub mod speed_tester;

pub use dns_client::{DnsClient, RecordPayload, RecordQuery};
pub use ip_source::{IpSource, LocalIpFile};
pub use speed_tester::SpeedTester;
