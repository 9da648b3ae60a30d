//! Luhn checksum for order numbers.

use std::fmt;

use thiserror::Error;

/// Luhn check over a non-negative integer. The rightmost digit is the check digit.
pub fn is_valid(number: u64) -> bool {
    (number % 10 + checksum(number / 10)) % 10 == 0
}

fn checksum(mut number: u64) -> u64 {
    let mut sum = 0;
    let mut position = 0;
    while number > 0 {
        let digit = number % 10;
        sum += adjusted(digit, position);
        number /= 10;
        position += 1;
    }
    sum % 10
}

/// Every second digit left of the check digit is doubled, folding values above 9.
fn adjusted(digit: u64, position: usize) -> u64 {
    if position % 2 == 0 {
        let doubled = digit * 2;
        if doubled > 9 { doubled - 9 } else { doubled }
    } else {
        digit
    }
}

/// Same rule as [`is_valid`] over a digit string of any length.
///
/// Callers must reject non-digit input first; any non-digit makes this return false.
pub fn is_valid_digits(digits: &str) -> bool {
    if digits.is_empty() {
        return false;
    }

    let mut sum = 0u64;
    for (i, b) in digits.bytes().rev().enumerate() {
        if !b.is_ascii_digit() {
            return false;
        }
        let digit = u64::from(b - b'0');
        sum += if i == 0 { digit } else { adjusted(digit, i - 1) };
    }
    sum % 10 == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderNumberError {
    #[error("order number is empty")]
    Empty,
    #[error("order number must contain only digits")]
    NotDigits,
    #[error("order number fails the Luhn checksum")]
    Checksum,
}

/// A digit string that passed the Luhn check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn parse(raw: &str) -> Result<Self, OrderNumberError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(OrderNumberError::Empty);
        }
        if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OrderNumberError::NotDigits);
        }
        if !is_valid_digits(trimmed) {
            return Err(OrderNumberError::Checksum);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_numbers() {
        assert!(!is_valid(123));
        assert!(!is_valid(1234567890));
        assert!(is_valid(12344));
        assert!(is_valid(12345678903));
        assert!(is_valid(79927398713));
        assert!(is_valid(1230));
    }

    #[test]
    fn digit_string_agrees_with_integer_form() {
        for n in [0u64, 18, 123, 1230, 12344, 1234567890, 12345678903, 79927398713, 4561261212345467] {
            assert_eq!(is_valid_digits(&n.to_string()), is_valid(n), "mismatch for {}", n);
        }
    }

    #[test]
    fn digit_string_beyond_u64() {
        // 25 digits: "7992739871" repeated pattern with a computed check digit
        let body = "799273987179927398717992";
        let check = (0..10)
            .find(|d| is_valid_digits(&format!("{}{}", body, d)))
            .unwrap();
        assert!(is_valid_digits(&format!("{}{}", body, check)));
        assert!(!is_valid_digits(&format!("{}{}", body, (check + 1) % 10)));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(OrderNumber::parse("  "), Err(OrderNumberError::Empty));
        assert_eq!(OrderNumber::parse("12a4"), Err(OrderNumberError::NotDigits));
        assert_eq!(OrderNumber::parse("-1230"), Err(OrderNumberError::NotDigits));
        assert_eq!(OrderNumber::parse("1234567890"), Err(OrderNumberError::Checksum));
    }

    #[test]
    fn parse_trims_whitespace() {
        let number = OrderNumber::parse(" 12345678903\n").unwrap();
        assert_eq!(number.as_str(), "12345678903");
    }
}
