//! Collection bindings for the domain types

use society_auth::Role;
use society_types::{
    AnimalTag, ChatMessage, DailyAttendance, Delivery, GatePass, LedgerEntry, MaintenanceTicket,
    Member, Notice, Poll, Resident, SecurityGuard, ServicePass, Society, Tenant,
};

use crate::auth::Account;
use crate::store::Document;

macro_rules! society_document {
    ($ty:ty, $collection:literal) => {
        impl Document for $ty {
            const COLLECTION: &'static str = $collection;

            fn id(&self) -> &str {
                &self.id
            }

            fn society_id(&self) -> Option<&str> {
                Some(&self.society_id)
            }
        }
    };
}

society_document!(Resident, "residents");
society_document!(Tenant, "tenants");
society_document!(SecurityGuard, "security");
society_document!(AnimalTag, "animal_tags");
society_document!(GatePass, "gate_passes");
society_document!(ServicePass, "service_passes");
society_document!(Delivery, "deliveries");
society_document!(ChatMessage, "messages");
society_document!(Notice, "notices");
society_document!(Poll, "polls");
society_document!(MaintenanceTicket, "tickets");
society_document!(LedgerEntry, "ledger");
society_document!(Account, "accounts");

impl Document for Society {
    const COLLECTION: &'static str = "societies";

    fn id(&self) -> &str {
        &self.id
    }

    fn society_id(&self) -> Option<&str> {
        Some(&self.id)
    }
}

impl Document for DailyAttendance {
    const COLLECTION: &'static str = "daily_attendance";

    fn id(&self) -> &str {
        &self.id
    }

    fn society_id(&self) -> Option<&str> {
        Some(&self.society_id)
    }

    fn before_save(&mut self) {
        self.recompute_summary();
    }
}

/// Onboardable profile with a login account
pub trait MemberDocument: Document + Member + Clone {
    const ROLE: Role;
    /// Singular label used in messages
    const LABEL: &'static str;
}

impl MemberDocument for Resident {
    const ROLE: Role = Role::Resident;
    const LABEL: &'static str = "resident";
}

impl MemberDocument for Tenant {
    const ROLE: Role = Role::Tenant;
    const LABEL: &'static str = "tenant";
}

impl MemberDocument for SecurityGuard {
    const ROLE: Role = Role::Security;
    const LABEL: &'static str = "security guard";
}
