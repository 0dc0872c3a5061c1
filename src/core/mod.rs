// Controllers: each operation loads the patron through the ILS port, applies
// the domain rules and answers with a view model or a Flash message.

pub mod checkouts;
pub mod feedback;
pub mod fines;
pub mod flash;
pub mod payments;
pub mod portal;
pub mod report;
pub mod requests;

#[cfg(test)]
pub(crate) mod testing;

pub use flash::{Flash, FlashLevel};
pub use portal::PortalService;
pub use requests::RequestAggregator;
