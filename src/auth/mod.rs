//! Authentication module
//!
//! Challenge-response login with a keyed salted digest, plus HTTP Basic and
//! anonymous fallbacks. A successful login yields the `co_SId` session used
//! for every later request.

pub mod client;
pub mod ksh;

pub use client::{
    AuthClient, AuthError, AuthMode, AuthState, Challenge, Credentials, SessionId, Step,
    SESSION_COOKIE,
};
pub use ksh::{HashPrimitive, KeyedSaltedHasher};
