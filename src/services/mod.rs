//! Services Layer
//!
//! Business logic between the webhook handlers and the venue adapters. Every
//! service is a unit struct whose functions take the shared [`AppState`] and
//! re-read venue state on each call.
//!
//! # Architecture
//!
//! ```text
//! Webhook handler --> SymbolService --> SizingService --> SmartOrderService
//!                                                           │
//!                      PositionService <────────────────────┤
//!                      OrderService ────> ExchangeGateway <─┘
//! ```
//!
//! # Services
//!
//! - `SymbolService` - Ticker normalization and universe lookup
//! - `QuotesService` - Reference prices (last, then book mid)
//! - `SizingService` - Quantization, notional conversion, limit anchors
//! - `PositionService` - Position interpretation and flatness polling
//! - `OrderService` - Market-equivalent submission with bounded retries
//! - `SmartOrderService` - FLAT / ALIGNED / OPPOSED reconciliation
//!
//! [`AppState`]: crate::state::AppState

pub mod order_service;
pub mod position_service;
pub mod quotes_service;
pub mod sizing_service;
pub mod smart_order_service;
pub mod symbol_service;

pub use order_service::{OrderService, SubmittedOrder};
pub use position_service::{PositionService, PositionShape};
pub use quotes_service::QuotesService;
pub use sizing_service::SizingService;
pub use smart_order_service::{
    ExecutionStatus, ReconcilePlan, ReconcileState, SmartOrderRequest, SmartOrderResult,
    SmartOrderService,
};
pub use symbol_service::SymbolService;
