//! Lightning backend contract for lnmesh.
//!
//! The node core never talks to a Lightning implementation directly;
//! everything money-related goes through the [`LnClient`] trait. A
//! production deployment implements it against its node's RPC (lnd,
//! CLN, ...); tests use the scripted [`mock::MockLnClient`].

pub mod client;
pub mod mock;

pub use client::{
    Channel, CreateInvoice, DecodedPaymentRequest, Invoice, LnClient, PayRequest, Payment,
    WalletInfo,
};
