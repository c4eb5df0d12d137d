//! # seal-element
//!
//! Capability interface to the device's secure element.
//!
//! The secure element generates random numbers, custodies the device key
//! pair, exposes raw protected storage and hashes data on-chip. This crate
//! provides:
//!
//! - [`SecureKeyStore`]: the operations the attestation core consumes
//! - [`ElementSession`]: the single scoped session a process holds on the
//!   element, released on every exit path
//! - [`SimulatedElement`]: a software element for development and tests
//! - `NativeElement`: the vendor library binding (feature `native`)
//!
//! ## Quick Start
//!
//! ```rust
//! use seal_element::{ElementSession, SimulatedElement};
//!
//! let session = ElementSession::open(SimulatedElement::new()).unwrap();
//! let digest = session.sha256(b"hello").unwrap();
//! assert_eq!(digest.len(), 32);
//! session.close().unwrap();
//! ```

#![cfg_attr(not(feature = "native"), forbid(unsafe_code))]
#![warn(missing_docs)]

pub mod error;
#[cfg(feature = "native")]
pub mod native;
pub mod session;
pub mod simulated;
pub mod store;

pub use error::{ElementError, ElementOp, Result};
#[cfg(feature = "native")]
pub use native::NativeElement;
pub use session::ElementSession;
pub use simulated::{SimulatedElement, SimulatorControl};
pub use store::{
    BoxedKeyStore, SecureKeyStore, DIGEST_LEN, KEY_LEN, KEY_SLOT, PRIVATE_KEY_OFFSET,
};
