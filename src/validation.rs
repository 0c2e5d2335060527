//! Feed line validation.
//!
//! A feed line holds at most one host address, optionally followed by a
//! `#` comment. Anything else (CIDR ranges, `host:port`, hostnames) is
//! rejected with a [`MalformedAddress`] diagnostic so that the caller can
//! report it and move on to the next line.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::MalformedAddress;

/// Result of validating a single feed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank or comment-only line: nothing to report
    Empty,
    Address(IpAddr),
    Malformed(MalformedAddress),
}

/// Strip a trailing `#` comment and surrounding whitespace.
///
/// # Examples
/// ```
/// use blockade::validation::strip_comment;
/// assert_eq!(strip_comment("  2.2.2.2 # bad actor"), "2.2.2.2");
/// assert_eq!(strip_comment("# only a comment"), "");
/// ```
pub fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => line[..idx].trim(),
        None => line.trim(),
    }
}

/// Validate one feed line.
///
/// `line_no` is 1-based and only used for diagnostics.
///
/// # Examples
/// ```
/// use blockade::validation::{validate_line, LineOutcome};
/// assert_eq!(validate_line("", 1), LineOutcome::Empty);
/// assert!(matches!(validate_line("192.0.2.7", 2), LineOutcome::Address(_)));
/// assert!(matches!(validate_line("not-an-ip", 3), LineOutcome::Malformed(_)));
/// ```
pub fn validate_line(line: &str, line_no: usize) -> LineOutcome {
    let candidate = strip_comment(line);
    if candidate.is_empty() {
        return LineOutcome::Empty;
    }

    match parse_literal(candidate) {
        Ok(addr) => LineOutcome::Address(addr),
        Err(reason) => LineOutcome::Malformed(MalformedAddress {
            line_no,
            line: candidate.to_string(),
            reason: reason.to_string(),
        }),
    }
}

/// Validate a standalone address literal (no comment handling).
///
/// Unlike [`validate_line`], an empty string is an error here.
///
/// # Examples
/// ```
/// use blockade::validation::validate_address;
/// assert_eq!(validate_address("2001:db8::1").unwrap().to_string(), "2001:db8::1");
/// assert!(validate_address("10.0.0.0/8").is_err());
/// assert!(validate_address("").is_err());
/// ```
pub fn validate_address(literal: &str) -> Result<IpAddr, MalformedAddress> {
    let reason = if literal.is_empty() {
        "empty input"
    } else {
        match parse_literal(literal) {
            Ok(addr) => return Ok(addr),
            Err(reason) => reason,
        }
    };

    Err(MalformedAddress {
        line_no: 0,
        line: literal.to_string(),
        reason: reason.to_string(),
    })
}

/// Parse an address literal, classifying the common rejected forms.
fn parse_literal(s: &str) -> Result<IpAddr, &'static str> {
    if let Ok(addr) = s.parse::<IpAddr>() {
        return Ok(addr);
    }

    if s.contains('/') {
        return Err("CIDR ranges are not accepted");
    }
    if s.contains(char::is_whitespace) {
        return Err("more than one token on the line");
    }
    if s.contains('%') {
        return Err("zone identifiers are not accepted");
    }
    if s.starts_with('[') || looks_like_v4_with_port(s) {
        return Err("host:port form is not accepted");
    }
    if let Some((start, end)) = s.split_once('-') {
        if start.parse::<IpAddr>().is_ok() && end.parse::<IpAddr>().is_ok() {
            return Err("address ranges are not accepted");
        }
    }
    if s.contains('.') && s.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err("hostnames are not accepted");
    }

    Err("not an IPv4 or IPv6 literal")
}

fn looks_like_v4_with_port(s: &str) -> bool {
    match s.rsplit_once(':') {
        Some((host, port)) => host.parse::<Ipv4Addr>().is_ok() && port.parse::<u16>().is_ok(),
        None => false,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::net::Ipv6Addr;

    proptest! {
        /// Every IPv4 literal validates to itself
        #[test]
        fn prop_ipv4_round_trip(a: u8, b: u8, c: u8, d: u8) {
            let literal = Ipv4Addr::new(a, b, c, d).to_string();
            let parsed = validate_address(&literal).unwrap();
            prop_assert_eq!(parsed.to_string(), literal);
        }

        /// Every canonical IPv6 literal validates to itself
        #[test]
        fn prop_ipv6_round_trip(segments: [u16; 8]) {
            let addr = Ipv6Addr::from(segments);
            let literal = addr.to_string();
            prop_assert_eq!(validate_address(&literal).unwrap(), IpAddr::V6(addr));
        }

        /// A trailing comment never changes the parsed address
        #[test]
        fn prop_comment_is_ignored(a: u8, b: u8, c: u8, d: u8, comment in "[ -~]{0,40}") {
            let addr = IpAddr::V4(Ipv4Addr::new(a, b, c, d));
            let line = format!("{} #{}", addr, comment);
            prop_assert_eq!(validate_line(&line, 1), LineOutcome::Address(addr));
        }

        /// Arbitrary input never panics
        #[test]
        fn prop_arbitrary_line_no_panic(line in "\\PC{0,64}") {
            let _ = validate_line(&line, 1);
        }

        /// Any CIDR form is rejected
        #[test]
        fn prop_cidr_rejected(a: u8, b: u8, c: u8, d: u8, prefix in 0u8..=32) {
            let line = format!("{}.{}.{}.{}/{}", a, b, c, d, prefix);
            prop_assert!(matches!(validate_line(&line, 1), LineOutcome::Malformed(_)), "CIDR accepted");
        }
    }
}
