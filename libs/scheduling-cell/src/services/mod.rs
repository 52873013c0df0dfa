pub mod schedule;
pub mod slots;

pub use schedule::ScheduleBoardService;
pub use slots::SlotCatalogService;
