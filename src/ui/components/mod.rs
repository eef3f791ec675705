mod form;
mod input;

pub use form::{FormEvent, FormModal};

/// Outcome of offering a key to a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  /// Key consumed, nothing for the parent to do
  Handled,
  /// Key consumed and produced an event for the parent
  Event(T),
  /// Key not consumed, parent should try the next handler
  NotHandled,
}
