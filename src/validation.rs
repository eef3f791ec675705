//! Form validation, run before any mutation is dispatched.
//!
//! Each validator turns raw form input into a request body or the first rule
//! it breaks.

use std::fmt;

use thiserror::Error;

use crate::api::{CreateCategory, CreateExpenseCode, UpdateCategory, UpdateExpenseCode};

pub const CATEGORY_NAME_MAX: usize = 120;
pub const CODE_MAX: usize = 64;
pub const DESCRIPTION_MAX: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
  Name,
  Code,
  Description,
}

impl fmt::Display for Field {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Name => write!(f, "name"),
      Self::Code => write!(f, "code"),
      Self::Description => write!(f, "description"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
  pub field: Field,
  pub message: &'static str,
}

impl ValidationError {
  fn new(field: Field, message: &'static str) -> Self {
    Self { field, message }
  }
}

/// Trimmed category name of 1 to 120 characters.
pub fn category_name(input: &str) -> Result<String, ValidationError> {
  let name = input.trim();
  match name.chars().count() {
    0 => Err(ValidationError::new(
      Field::Name,
      "Category name must be at least 1 character",
    )),
    n if n > CATEGORY_NAME_MAX => Err(ValidationError::new(
      Field::Name,
      "Category name must be at most 120 characters",
    )),
    _ => Ok(name.to_string()),
  }
}

/// Trimmed code of 1 to 64 characters.
pub fn code(input: &str) -> Result<String, ValidationError> {
  let code = input.trim();
  match code.chars().count() {
    0 => Err(ValidationError::new(
      Field::Code,
      "Code must be at least 1 character",
    )),
    n if n > CODE_MAX => Err(ValidationError::new(
      Field::Code,
      "Code must be at most 64 characters",
    )),
    _ => Ok(code.to_string()),
  }
}

/// Optional description of at most 500 characters. Empty means absent.
pub fn description(input: &str) -> Result<Option<String>, ValidationError> {
  if input.is_empty() {
    return Ok(None);
  }
  if input.chars().count() > DESCRIPTION_MAX {
    return Err(ValidationError::new(
      Field::Description,
      "Description must be at most 500 characters",
    ));
  }
  Ok(Some(input.to_string()))
}

pub fn create_category(name: &str) -> Result<CreateCategory, ValidationError> {
  Ok(CreateCategory {
    name: category_name(name)?,
  })
}

pub fn update_category(name: &str, is_active: bool) -> Result<UpdateCategory, ValidationError> {
  Ok(UpdateCategory {
    name: Some(category_name(name)?),
    is_active: Some(is_active),
  })
}

pub fn create_code(code_input: &str, description_input: &str) -> Result<CreateExpenseCode, ValidationError> {
  Ok(CreateExpenseCode {
    code: code(code_input)?,
    description: description(description_input)?,
  })
}

pub fn update_code(description_input: &str, is_active: bool) -> Result<UpdateExpenseCode, ValidationError> {
  Ok(UpdateExpenseCode {
    description: description(description_input)?,
    is_active: Some(is_active),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_name_over_limit_rejected_with_exact_message() {
    let err = create_category(&"a".repeat(121)).unwrap_err();
    assert_eq!(err.field, Field::Name);
    assert_eq!(
      err.to_string(),
      "Category name must be at most 120 characters"
    );
    assert!(create_category(&"a".repeat(120)).is_ok());
  }

  #[test]
  fn test_name_is_trimmed_before_checking() {
    assert_eq!(category_name("  Travel  ").unwrap(), "Travel");
    assert_eq!(
      category_name("   ").unwrap_err().message,
      "Category name must be at least 1 character"
    );
    // Surrounding whitespace does not count toward the limit
    assert!(category_name(&format!("  {}  ", "a".repeat(120))).is_ok());
  }

  #[test]
  fn test_limits_count_characters_not_bytes() {
    assert!(category_name(&"é".repeat(120)).is_ok());
    assert!(code(&"ü".repeat(64)).is_ok());
  }

  #[test]
  fn test_code_bounds() {
    assert_eq!(
      code("").unwrap_err().message,
      "Code must be at least 1 character"
    );
    assert_eq!(
      code(&"X".repeat(65)).unwrap_err().message,
      "Code must be at most 64 characters"
    );
    assert_eq!(code(" MEAL ").unwrap(), "MEAL");
  }

  #[test]
  fn test_empty_description_is_absent() {
    let body = create_code("MEAL", "").unwrap();
    assert_eq!(body.description, None);

    let body = update_code("", false).unwrap();
    assert_eq!(body.description, None);
    assert_eq!(body.is_active, Some(false));
  }

  #[test]
  fn test_description_limit() {
    let err = update_code(&"d".repeat(501), true).unwrap_err();
    assert_eq!(err.field, Field::Description);
    assert_eq!(err.message, "Description must be at most 500 characters");
    assert!(description(&"d".repeat(500)).unwrap().is_some());
  }

  #[test]
  fn test_update_category_sends_both_fields() {
    let body = update_category(" Trips ", false).unwrap();
    assert_eq!(body.name.as_deref(), Some("Trips"));
    assert_eq!(body.is_active, Some(false));
  }
}
