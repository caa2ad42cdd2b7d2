pub mod admission;
pub mod calendar;
pub mod cancellation;
pub mod commit;
pub mod events;
pub mod intent;
pub mod ledger;
pub mod payments;
pub mod slots;
