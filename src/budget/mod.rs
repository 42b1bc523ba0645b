//! Budget accounting: the session-wide manager (C2) and per-step scopes (C4).

pub mod manager;
pub mod scope;

pub use manager::{AlwaysApprove, AlwaysDeny, ApprovalSink, BudgetManager};
pub use scope::{BudgetScope, BudgetScopeSnapshot};
