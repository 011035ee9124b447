//! # vouch-core
//!
//! Core types shared across the Vouch escrow engine:
//!
//! - [`Amount`] — money in minor currency units with checked arithmetic
//! - [`TransactionId`], [`DisputeId`], [`PartyId`] — typed identifiers
//! - [`Party`] — the buyer/seller role of a transaction participant

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod amount;
pub mod id;
pub mod party;

pub use amount::Amount;
pub use id::{DisputeId, PartyId, TransactionId};
pub use party::Party;
