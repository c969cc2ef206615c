//! Source records and account-state decoding.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{SyncError, SyncResult};

/// `userAccountControl` bit set when an account is administratively disabled.
pub const ACCOUNT_DISABLE: u32 = 0x0002;

/// Decoded `userAccountControl` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAccountControl(pub u32);

impl UserAccountControl {
    pub fn parse(raw: &str) -> Result<Self, std::num::ParseIntError> {
        raw.trim().parse().map(Self)
    }

    pub fn is_disabled(self) -> bool {
        self.0 & ACCOUNT_DISABLE != 0
    }
}

/// Resolve the disabled flag from a raw `userAccountControl` value.
///
/// An absent or unparsable value is treated as disabled; a parse failure is
/// logged but never aborts the record.
pub fn account_disabled(raw: Option<&str>) -> bool {
    match raw {
        None => true,
        Some(value) => match UserAccountControl::parse(value) {
            Ok(uac) => uac.is_disabled(),
            Err(e) => {
                warn!(value = %value, error = %e, "Unparsable userAccountControl, treating account as disabled");
                true
            }
        },
    }
}

/// One record returned by a directory source.
///
/// Keys are matched case-insensitively. Only the first value of a
/// multi-valued attribute is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryRecord {
    values: HashMap<String, String>,
    unreadable: HashMap<String, String>,
    account_disabled: bool,
}

impl DirectoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_account_disabled(mut self, disabled: bool) -> Self {
        self.account_disabled = disabled;
        self
    }

    /// Record a value. Later values for the same key are ignored.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .entry(key.to_lowercase())
            .or_insert_with(|| value.into());
    }

    /// Builder form of [`DirectoryRecord::insert`].
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Record that `key` was returned but could not be read as text.
    pub fn mark_unreadable(&mut self, key: &str, reason: impl Into<String>) {
        self.unreadable.insert(key.to_lowercase(), reason.into());
    }

    /// Look up an attribute value.
    ///
    /// Returns `Ok(None)` when the source did not return the attribute and
    /// an error when it returned a value that could not be read.
    pub fn value(&self, key: &str) -> SyncResult<Option<&str>> {
        let key = key.to_lowercase();
        if let Some(value) = self.values.get(&key) {
            return Ok(Some(value.as_str()));
        }
        if let Some(reason) = self.unreadable.get(&key) {
            return Err(SyncError::AttributeUnreadable {
                attribute: key,
                reason: reason.clone(),
            });
        }
        Ok(None)
    }

    pub fn account_disabled(&self) -> bool {
        self.account_disabled
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_bit() {
        assert!(!account_disabled(Some("512")));
        assert!(account_disabled(Some("514")));
        assert!(account_disabled(Some("66050")));
        assert!(!account_disabled(Some("66048")));
    }

    #[test]
    fn test_absent_or_garbage_is_disabled() {
        assert!(account_disabled(None));
        assert!(account_disabled(Some("")));
        assert!(account_disabled(Some("not-a-number")));
    }

    #[test]
    fn test_uac_parse_trims() {
        assert_eq!(UserAccountControl::parse(" 2 ").unwrap(), UserAccountControl(2));
        assert!(UserAccountControl(2).is_disabled());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let record = DirectoryRecord::new().with("sAMAccountName", "jdoe");
        assert_eq!(record.value("samaccountname").unwrap(), Some("jdoe"));
        assert_eq!(record.value("SAMACCOUNTNAME").unwrap(), Some("jdoe"));
        assert_eq!(record.value("mail").unwrap(), None);
    }

    #[test]
    fn test_first_value_wins() {
        let mut record = DirectoryRecord::new();
        record.insert("proxyAddresses", "SMTP:a@contoso.com");
        record.insert("proxyAddresses", "smtp:b@contoso.com");
        assert_eq!(
            record.value("proxyaddresses").unwrap(),
            Some("SMTP:a@contoso.com")
        );
    }

    #[test]
    fn test_unreadable_attribute() {
        let mut record = DirectoryRecord::new();
        record.mark_unreadable("thumbnailPhoto", "binary value");
        let err = record.value("thumbnailPhoto").unwrap_err();
        assert_eq!(err.error_code(), "ATTRIBUTE_UNREADABLE");
    }
}
