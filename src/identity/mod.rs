//! Identity: principals, issued tokens and the request-scoped auth gate.
//! Keep the public surface thin and split implementation across sub-modules.

mod gate;
mod principal;
mod token;

pub use gate::{confirmed_principal, AuthGate, AuthResult, RejectReason};
pub use principal::{Capability, Principal, Role};
pub use token::{Token, TokenService};
