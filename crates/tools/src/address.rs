use regex::Regex;

use hb_domain::error::{Error, Result};

/// City/state/zip pulled out of a free-form US street address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: Option<String>,
}

/// Heuristic parser for `"<street>, <city>[,] <ST> [zip]"`.
///
/// Compiled once at startup and shared by every tool call.
#[derive(Debug, Clone)]
pub struct AddressParser {
    pattern: Regex,
}

impl AddressParser {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(
            r"^\s*(?P<street>.+?),\s*(?P<city>[A-Za-z][A-Za-z .'\-]*?),?\s+(?P<state>[A-Za-z]{2})(?:\s+(?P<zip>\d{5})(?:-\d{4})?)?\s*$",
        )
        .map_err(|e| Error::Config(format!("address pattern: {e}")))?;
        Ok(Self { pattern })
    }

    /// `None` when the address does not carry a recognizable city and
    /// two-letter state.
    pub fn parse(&self, address: &str) -> Option<ParsedAddress> {
        let caps = self.pattern.captures(address)?;
        let street = caps.name("street")?.as_str().trim().to_string();
        let city = caps.name("city")?.as_str().trim().to_string();
        let state = caps.name("state")?.as_str().to_ascii_uppercase();
        if street.is_empty() || city.is_empty() {
            return None;
        }
        Some(ParsedAddress {
            street,
            city,
            state,
            zip: caps.name("zip").map(|m| m.as_str().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> AddressParser {
        AddressParser::new().unwrap()
    }

    #[test]
    fn city_and_state_without_comma() {
        let p = parser().parse("123 Main St, Austin TX").unwrap();
        assert_eq!(p.street, "123 Main St");
        assert_eq!(p.city, "Austin");
        assert_eq!(p.state, "TX");
        assert_eq!(p.zip, None);
    }

    #[test]
    fn multiword_city_comma_and_zip() {
        let p = parser().parse("9 Elm Ct, San Marcos, tx 78666").unwrap();
        assert_eq!(p.city, "San Marcos");
        assert_eq!(p.state, "TX");
        assert_eq!(p.zip.as_deref(), Some("78666"));
    }

    #[test]
    fn street_only_is_not_parsed() {
        assert!(parser().parse("123 Main St").is_none());
        assert!(parser().parse("123 Main St, Austin").is_none());
    }
}
