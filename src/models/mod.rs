pub mod availability;
pub mod booking;
pub mod court;
pub mod event;
pub mod payment;
pub mod slot;

pub use availability::{OpeningWindow, OperatingHours};
pub use booking::{Booking, BookingStatus, PaymentSnapshot, PaymentStatus};
pub use court::{Court, ExcludedRange, SlotConfig};
pub use event::{BookingEvent, StoredEvent};
pub use payment::BookingContext;
pub use slot::{PersistedSlot, ResolvedSlot, SlotKind, SlotRef, SlotStatus, VirtualSlotKey};
