// Domain layer: view models over ILS data plus the business rules that act on them.
// Nothing here performs IO; adapters build these types and core/ orchestrates them.

pub mod cdl;
pub mod checkout;
pub mod fine;
pub mod group;
pub mod money;
pub mod patron;
pub mod pickup;
pub mod ports;
pub mod renewal;
pub mod request;
pub mod sort;

pub use checkout::{Checkout, LoanPolicy, Renewals};
pub use fine::{Fine, Payment};
pub use group::{Group, GroupMember, View};
pub use patron::{Patron, Role, Standing};
pub use pickup::PickupLibraries;
pub use request::{Request, RequestSource};
pub use sort::SortField;
