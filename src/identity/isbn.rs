// Circulation Core - School Library Circulation Engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! ISBN normalization
//!
//! Every ISBN the core compares or stores for lookup is reduced to its
//! 13-digit EAN form. ISBN-10 values gain the `978` prefix and a freshly
//! computed EAN-13 check digit (weights alternate 1 and 3, sum mod 10).
//! The ISBN-10 check digit is dropped, not verified, so a scanner that
//! reads a smudged final character still resolves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized 13-digit ISBN
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Isbn13(String);

impl Isbn13 {
    /// Parse any accepted ISBN spelling
    pub fn parse(raw: &str) -> Option<Self> {
        normalize_isbn(raw).map(Isbn13)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Isbn13 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Isbn13 {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize an ISBN to its 13-digit form
///
/// Hyphens and whitespace are ignored. Returns `None` for blank input or
/// anything that is not shaped like an ISBN-10 or ISBN-13.
pub fn normalize_isbn(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    match cleaned.len() {
        13 if cleaned.chars().all(|c| c.is_ascii_digit()) => Some(cleaned),
        10 => {
            let (body, last) = cleaned.split_at(9);
            let body_ok = body.chars().all(|c| c.is_ascii_digit());
            let last_ok = last.chars().all(|c| c.is_ascii_digit() || c == 'X');
            if !(body_ok && last_ok) {
                return None;
            }
            let prefixed = format!("978{}", body);
            let check = ean13_check_digit(&prefixed)?;
            Some(format!("{}{}", prefixed, check))
        }
        _ => None,
    }
}

/// EAN-13 check digit for a 12-digit body
pub fn ean13_check_digit(body: &str) -> Option<u32> {
    if body.len() != 12 {
        return None;
    }
    let mut sum = 0;
    for (i, c) in body.chars().enumerate() {
        let digit = c.to_digit(10)?;
        sum += if i % 2 == 0 { digit } else { digit * 3 };
    }
    Some((10 - sum % 10) % 10)
}

/// Whether two raw ISBNs name the same book
///
/// Both sides must normalize; a blank or malformed ISBN never matches.
pub fn same_isbn(a: &str, b: &str) -> bool {
    match (normalize_isbn(a), normalize_isbn(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isbn10_and_isbn13_agree() {
        assert_eq!(
            normalize_isbn("0-306-40615-2"),
            normalize_isbn("9780306406157")
        );
        assert_eq!(normalize_isbn("0-306-40615-2").as_deref(), Some("9780306406157"));
    }

    #[test]
    fn test_check_digit() {
        assert_eq!(ean13_check_digit("978030640615"), Some(7));
        // Dune, Ace paperback
        assert_eq!(ean13_check_digit("978044101359"), Some(3));
        assert_eq!(ean13_check_digit("97803064061"), None);
        assert_eq!(ean13_check_digit("97803064061a"), None);
    }

    #[test]
    fn test_x_check_character() {
        // 0-8044-2957-X
        assert_eq!(normalize_isbn("0-8044-2957-x").as_deref(), Some("9780804429573"));
    }

    #[test]
    fn test_whitespace_and_hyphens() {
        assert_eq!(
            normalize_isbn(" 978 0 441 01359 3 ").as_deref(),
            Some("9780441013593")
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(normalize_isbn(""), None);
        assert_eq!(normalize_isbn("   "), None);
        assert_eq!(normalize_isbn("12345"), None);
        assert_eq!(normalize_isbn("97803064061X7"), None);
        assert_eq!(normalize_isbn("X306406152"), None);
    }

    #[test]
    fn test_same_isbn() {
        assert!(same_isbn("0306406152", "978-0-306-40615-7"));
        assert!(!same_isbn("", ""));
        assert!(!same_isbn("0306406152", "9780441013593"));
    }

    #[test]
    fn test_newtype() {
        let isbn = Isbn13::parse("0-306-40615-2").unwrap();
        assert_eq!(isbn.as_str(), "9780306406157");
        assert_eq!(isbn.to_string(), "9780306406157");
        assert!(Isbn13::parse("nope").is_none());
    }
}
