//! Client for the expenses REST API.

mod categories;
pub mod client;
mod codes;
pub mod error;
pub mod transport;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use client::ApiClient;
pub use error::{ApiError, Operation};
pub use types::{Category, CreateCategory, CreateExpenseCode, ExpenseCode, UpdateCategory, UpdateExpenseCode};
