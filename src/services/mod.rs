//! Contract-level data access
//!
//! Every operation takes the authenticated caller's id and never a
//! user id supplied by the model.

pub mod account;
pub mod finance;

pub use account::AccountService;
pub use finance::{FinanceService, ListQuery, MAX_AMOUNT, MAX_LIST_LIMIT, SEARCH_LIMIT};
