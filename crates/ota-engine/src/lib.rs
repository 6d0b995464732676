//! Dual-slot firmware update engine.
//!
//! - [`update`] receives an image packet by packet into a free slot
//! - [`store`] keeps the persisted slot table consistent across power loss
//! - [`boot`] promotes a freshly received slot, or re-verifies the running one, at startup
//!
//! Boot selection and update attempts share the flash and must never overlap.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

use crate::err::Error;

pub mod boot;
pub mod err;
pub mod flash;
pub mod store;
pub mod update;

pub use boot::{BootOutcome, select};
pub use store::{ConfigStore, RebootCause, Record, SlotEntry};
pub use update::{Session, State, Updater, run_attempt};

pub type Result<T> = core::result::Result<T, Error>;
