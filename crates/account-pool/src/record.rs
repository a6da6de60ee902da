//! Pool records and their line encoding
//!
//! Every pool file holds one record per line. `available` and `released` lines
//! are bare account strings; `cooldown` lines are `<epoch-seconds>|<account>`.
//! A cooldown line that does not parse is kept as [`CooldownLine::Malformed`]
//! and written back byte-for-byte on every rewrite.

use std::time::SystemTime;

use common::Secret;

use crate::clock;

/// A record that can be stored as a single line of a pool file.
pub trait Record: Sized + Send + Sync {
    /// Decode one line. Blank lines decode to `None` and are dropped.
    fn decode(line: &str) -> Option<Self>;

    /// Encode as a single line, without the terminator.
    fn encode(&self) -> String;
}

/// An opaque single-use credential. Redacted in `Debug` output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Account(Secret<String>);

impl Account {
    pub fn new(payload: impl Into<String>) -> Self {
        Self(Secret::new(payload.into()))
    }

    /// The raw credential payload.
    pub fn expose(&self) -> &str {
        self.0.expose()
    }
}

impl Record for Account {
    fn decode(line: &str) -> Option<Self> {
        let payload = line.trim();
        if payload.is_empty() {
            None
        } else {
            Some(Account::new(payload))
        }
    }

    fn encode(&self) -> String {
        self.expose().to_string()
    }
}

/// An account serving its cooldown, stamped with the time it was allocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownEntry {
    account: Account,
    allocated_at: SystemTime,
}

impl CooldownEntry {
    pub fn new(account: Account, allocated_at: SystemTime) -> Self {
        Self {
            account,
            allocated_at,
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn allocated_at(&self) -> SystemTime {
        self.allocated_at
    }

    pub fn into_account(self) -> Account {
        self.account
    }

    fn parse(line: &str) -> Option<Self> {
        let (stamp, payload) = line.trim().split_once('|')?;
        let allocated_at = clock::parse_epoch(stamp)?;
        let payload = payload.trim();
        if payload.is_empty() {
            return None;
        }
        Some(Self::new(Account::new(payload), allocated_at))
    }
}

/// One line of the cooldown pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownLine {
    Entry(CooldownEntry),
    /// Unparsable line, preserved verbatim so nothing is silently lost.
    Malformed(Secret<String>),
}

impl CooldownLine {
    pub fn entry(&self) -> Option<&CooldownEntry> {
        match self {
            CooldownLine::Entry(entry) => Some(entry),
            CooldownLine::Malformed(_) => None,
        }
    }

    pub fn account(&self) -> Option<&Account> {
        self.entry().map(CooldownEntry::account)
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, CooldownLine::Malformed(_))
    }
}

impl From<CooldownEntry> for CooldownLine {
    fn from(entry: CooldownEntry) -> Self {
        CooldownLine::Entry(entry)
    }
}

impl Record for CooldownLine {
    fn decode(line: &str) -> Option<Self> {
        if line.trim().is_empty() {
            return None;
        }
        Some(match CooldownEntry::parse(line) {
            Some(entry) => CooldownLine::Entry(entry),
            None => CooldownLine::Malformed(Secret::new(line.to_string())),
        })
    }

    fn encode(&self) -> String {
        match self {
            CooldownLine::Entry(entry) => format!(
                "{}|{}",
                clock::format_epoch(entry.allocated_at),
                entry.account.expose()
            ),
            CooldownLine::Malformed(raw) => raw.expose().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn account_decode_trims_and_skips_blank() {
        assert_eq!(Account::decode("  user:pass \r"), Some(Account::new("user:pass")));
        assert_eq!(Account::decode("   "), None);
        assert_eq!(Account::decode(""), None);
    }

    #[test]
    fn account_debug_is_redacted() {
        let debug = format!("{:?}", Account::new("user:hunter2"));
        assert!(!debug.contains("hunter2"), "got: {debug}");
    }

    #[test]
    fn cooldown_line_parses_timestamp_and_account() {
        let line = CooldownLine::decode("1700000000.5|user:pass").unwrap();
        let entry = line.entry().unwrap();
        assert_eq!(entry.account().expose(), "user:pass");
        assert_eq!(
            entry.allocated_at(),
            UNIX_EPOCH + Duration::from_millis(1_700_000_000_500)
        );
        assert_eq!(line.encode(), "1700000000.5|user:pass");
    }

    #[test]
    fn cooldown_account_may_contain_separator() {
        let line = CooldownLine::decode("100|a|b|c").unwrap();
        assert_eq!(line.account().unwrap().expose(), "a|b|c");
        assert_eq!(line.encode(), "100|a|b|c");
    }

    #[test]
    fn unparsable_cooldown_lines_are_kept_verbatim() {
        for raw in [
            "no separator here",
            "yesterday|user:pass",
            "1700000000|",
            "-1|user:pass",
            "  padded garbage  ",
        ] {
            let line = CooldownLine::decode(raw).unwrap();
            assert!(line.is_malformed(), "{raw:?} should be malformed");
            assert!(line.account().is_none());
            assert_eq!(line.encode(), raw);
        }
    }

    #[test]
    fn blank_cooldown_line_is_dropped() {
        assert_eq!(CooldownLine::decode(" \t "), None);
    }
}
