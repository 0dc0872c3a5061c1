// Adapters layer: HTTP clients for the ILS and the interlibrary loan services,
// translating their payloads into domain types.

pub mod borrow_direct;
pub mod cache;
pub mod folio;
pub mod http;
pub mod illiad;
pub mod reshare;
pub mod symphony;

pub use borrow_direct::BorrowDirectClient;
pub use folio::FolioClient;
pub use illiad::IlliadClient;
pub use reshare::ReshareClient;
pub use symphony::SymphonyClient;
