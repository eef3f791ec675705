mod expenses;
mod fault;

pub use expenses::ExpensesView;
pub use fault::FaultView;
