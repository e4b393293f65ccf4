// Services layer: business logic between HTTP handlers and storage

pub mod document;
pub mod event;
pub mod export;

pub use document::DocumentService;
pub use event::EventService;
pub use export::ExportService;
