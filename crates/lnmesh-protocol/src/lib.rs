//! Wire protocol for the lnmesh cluster.
//!
//! Three layers, innermost first:
//!
//! - [`message`] — the application payloads (`hello`, `payInvoice`,
//!   `paymentResult`).
//! - [`canonical`] — deterministic JSON encoding the signatures are
//!   computed over.
//! - [`envelope`] — the signed outer record
//!   `{"message": ..., "timestamp": <ms>, "signature": "<hex>"}` with
//!   HMAC-SHA256 signing, verification, and the freshness window.

pub mod canonical;
pub mod envelope;
pub mod message;
