//! Gophermart authentication
//!
//! Stateless bearer tokens: the user id followed by an HMAC-SHA256 over it,
//! hex-encoded. There is no session store and no revocation list; a token
//! stays valid for as long as the signing secret does.

pub mod token;

pub use token::{IssuedToken, TokenCodec, TokenError};
