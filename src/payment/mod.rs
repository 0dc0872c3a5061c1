// Payment layer: Cybersource Secure Acceptance hosted checkout.
// Requests are signed here and posted by the patron's browser; the gateway
// posts a signed response back, which is verified before anything is recorded.

pub mod request;
pub mod response;
pub mod security;

pub use request::{FormField, PaymentRequest};
pub use response::PaymentResponse;
pub use security::Security;
