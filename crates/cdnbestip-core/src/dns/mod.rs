//! DNS records, zone resolution and reconciliation
//!
//! ```text
//! ordered IPs ──► Reconciler ──► DnsClient (provider API)
//!                     │
//!                     └── ZoneResolver (domain → zone id)
//! ```

pub mod naming;
pub mod reconcile;
pub mod record;
pub mod zone;

pub use naming::{indexed_name, prefix_index};
pub use reconcile::{
    FailedOperation, Operation, ReconcileReport, Reconciler, RecordDefaults, UpsertOptions,
};
pub use record::{DnsRecord, Zone};
pub use zone::ZoneResolver;
