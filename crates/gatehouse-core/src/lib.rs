#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Access-control domain for the Gatehouse live portal.
//!
//! Members sign in with an eight-digit identifier drawn from an administrator
//! curated registry and receive one opaque session token at a time. Administrators
//! authenticate against a stored Argon2 credential and operate the registry, the
//! live sessions, and the stream settings through [`AdminGateway`].

pub mod access;
pub mod admin;
pub mod backend;
pub mod clock;
pub mod error;
pub mod identifier;
pub mod memory;
pub mod model;
pub mod password;
pub mod registry;
pub mod session;
pub mod sessions;
pub mod settings;
pub mod sweeper;

use std::sync::Arc;

pub use access::AccessController;
pub use admin::AdminGateway;
pub use backend::{
    Backends, CredentialBackend, IdentifierBackend, InsertOutcome, SessionBackend,
    SettingsBackend,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{ErrorKind, GateError, GateResult, StorageError, StorageResult};
pub use identifier::{MemberId, split_bulk};
pub use memory::{IdentifierSet, SessionTable, memory_backends};
pub use model::{
    AdminCredential, BulkAddReport, DashboardSnapshot, GeoPolicy, GeoPolicyPatch, ScheduleFields,
    SessionView, StreamSettings, StreamSettingsPatch,
};
pub use registry::IdentifierRegistry;
pub use session::{ExpiryPolicy, Session, SessionToken};
pub use sessions::{Namespace, SessionStore};
pub use settings::SettingsStore;
pub use sweeper::{ReapObserver, SessionSweeper, SweeperHandle};

/// Fully wired services sharing one set of backends and one clock.
#[derive(Clone)]
pub struct Portal {
    /// Member-facing operations.
    pub access: AccessController,
    /// Administrator operations.
    pub admin: AdminGateway,
}

impl Portal {
    /// Wire the services over `backends`.
    #[must_use]
    pub fn assemble(
        backends: Backends,
        member_policy: ExpiryPolicy,
        admin_policy: ExpiryPolicy,
        clock: SharedClock,
    ) -> Self {
        let member_sessions = SessionStore::new(
            backends.member_sessions,
            member_policy,
            Arc::clone(&clock),
            Namespace::Member,
        );
        let admin_sessions = SessionStore::new(
            backends.admin_sessions,
            admin_policy,
            Arc::clone(&clock),
            Namespace::Admin,
        );
        let registry = IdentifierRegistry::new(backends.identifiers, member_sessions.clone());
        let settings = SettingsStore::new(backends.settings, clock);
        let access = AccessController::new(registry.clone(), member_sessions.clone(), settings.clone());
        let admin = AdminGateway::new(
            backends.credentials,
            admin_sessions,
            member_sessions,
            registry,
            settings,
        );
        Self { access, admin }
    }

    /// Sweeper covering both session namespaces.
    #[must_use]
    pub fn sweeper(&self, period: std::time::Duration) -> SessionSweeper {
        SessionSweeper::new(
            vec![self.access.sessions().clone(), self.admin.sessions().clone()],
            period,
        )
    }
}
