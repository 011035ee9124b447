//! # vouch-escrow
//!
//! Escrow trust-transaction engine for the Vouch marketplace.
//!
//! This crate provides:
//!
//! - The escrow state machine over the transaction lifecycle
//!   (`pending → funded → shipped → delivered → completed`, with a
//!   dispute path to `refunded`)
//! - Fee calculation, fixed once at creation
//! - Dispute arbitration with partial refunds
//! - Deferred auto-completion via a persisted due-work queue and a
//!   polling inspection worker
//!
//! Storage, payment capture, payouts, notifications, and seller limits
//! are boundary traits injected into [`EscrowEngine`]; in-memory
//! implementations back tests and development.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispute;
pub mod engine;
pub mod error;
pub mod fees;
pub mod notify;
pub mod processor;
pub mod scheduler;
pub mod store;
pub mod transaction;

pub use dispute::{DisputeCase, DisputeStatus, EvidenceItem, EvidenceKind, Resolution};
pub use engine::{DeliverySignal, EscrowEngine};
pub use error::{EscrowError, Result};
pub use fees::{FeeBreakdown, FEE_CEILING, FEE_FLOOR, INSURANCE_THRESHOLD};
pub use notify::{EscrowEvent, NotificationGateway, NullGateway, RecordingGateway};
pub use processor::{
    MemoryProcessor, PaymentMethod, PaymentProcessor, PayoutProcessor, StaticLimits,
    TransactionLimits,
};
pub use scheduler::{DueAction, DueTask, InspectionWorker, MemoryWorkQueue, WorkQueue};
pub use store::{DisputeStore, MemoryDisputeStore, MemoryTransactionStore, TransactionStore};
pub use transaction::{
    Agreement, AgreementTerms, Conditions, EscrowStats, ResolutionMode, TrackingInfo, Transaction,
    TransactionStatus,
};
