//! Phone-number authentication
//!
//! [`AuthSession`] walks the user from a phone number to a signed-in
//! [`Identity`](crate::model::Identity), publishing every step as an
//! [`AuthState`]. Other components only see the result through an
//! [`IdentityHandle`].

mod identity_handle;
mod session;
mod state;

pub use identity_handle::IdentityHandle;
pub use session::AuthSession;
pub use state::{AuthFailure, AuthState, SIGN_IN_FAILED, VERIFICATION_FAILED, VERIFICATION_NOT_STARTED};
