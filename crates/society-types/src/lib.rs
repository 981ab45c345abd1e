//! Domain documents for residential society management
//!
//! Every record the API persists lives here as a plain serde type, together
//! with the small rules that govern it: verification gates, PIN format,
//! attendance summaries, delivery and ticket lifecycles, poll voting and the
//! billing roll-up.

pub mod attendance;
pub mod billing;
pub mod chat;
pub mod common;
pub mod delivery;
pub mod error;
pub mod members;
pub mod notice;
pub mod passes;
pub mod ticket;

pub use attendance::{AttendanceSummary, DailyAttendance, VisitorEntry, VisitorStatus, VisitorType};
pub use billing::{BillingReport, CategoryTotal, EntryKind, LedgerEntry, PendingDue};
pub use chat::{ChatMessage, MessageStatus};
pub use common::{new_id, Location, Pin, VerificationStatus};
pub use delivery::{Delivery, DeliveryStatus, ItemType};
pub use error::DomainError;
pub use members::{Member, Resident, SecurityGuard, Shift, Society, Tenant};
pub use notice::{Notice, Poll, PollOption};
pub use passes::{AnimalTag, GateCheck, GatePass, PassStatus, PinDocument, ServicePass};
pub use ticket::{MaintenanceTicket, TicketPriority, TicketStatus};
