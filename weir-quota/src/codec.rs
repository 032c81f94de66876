//! Wire format for persisted tag quotas.
//!
//! # Key layout
//!
//! Each tag's quota lives in the system keyspace at
//! `TAG_QUOTA_PREFIX || tag bytes`. The tag is recovered by stripping the
//! prefix; no escaping is needed because the prefix is only ever matched at
//! the start of the key.
//!
//! # Value format
//!
//! A fixed 32-byte value of four big-endian `i64` fields, in order:
//!
//! - total read quota (bytes/sec)
//! - total write quota (bytes/sec)
//! - reserved read quota (bytes/sec)
//! - reserved write quota (bytes/sec)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use weir_core::{Quota, Tag};

use crate::error::{QuotaError, QuotaResult};

/// Key prefix under which all tag quotas are stored.
pub const TAG_QUOTA_PREFIX: &[u8] = b"\xff/tagQuota/";

/// Exact length of an encoded quota value.
pub const QUOTA_VALUE_LEN: usize = 32;

/// Returns the storage key for a tag's quota.
#[must_use]
pub fn quota_key(tag: &Tag) -> Bytes {
    let mut key = BytesMut::with_capacity(TAG_QUOTA_PREFIX.len() + tag.len());
    key.put_slice(TAG_QUOTA_PREFIX);
    key.put_slice(tag.as_bytes());
    key.freeze()
}

/// Recovers the tag from a quota storage key.
///
/// # Errors
/// Returns an error if the key does not carry the quota prefix.
pub fn tag_from_quota_key(key: &[u8]) -> QuotaResult<Tag> {
    key.strip_prefix(TAG_QUOTA_PREFIX)
        .map(|tag| Tag::from(tag.to_vec()))
        .ok_or(QuotaError::BadKeyPrefix)
}

/// Encodes a quota into its 32-byte wire value.
#[must_use]
pub fn encode_quota(quota: &Quota) -> Bytes {
    let mut value = BytesMut::with_capacity(QUOTA_VALUE_LEN);
    value.put_i64(quota.total_read);
    value.put_i64(quota.total_write);
    value.put_i64(quota.reserved_read);
    value.put_i64(quota.reserved_write);
    value.freeze()
}

/// Decodes a quota from its wire value and validates its invariants.
///
/// # Errors
/// Returns an error if the value has the wrong length or the decoded quota
/// is invalid (negative fields, reservation above total).
pub fn decode_quota(value: &[u8]) -> QuotaResult<Quota> {
    if value.len() != QUOTA_VALUE_LEN {
        return Err(QuotaError::BadValueLength {
            expected: QUOTA_VALUE_LEN,
            actual: value.len(),
        });
    }
    let mut buf = value;
    let quota = Quota {
        total_read: buf.get_i64(),
        total_write: buf.get_i64(),
        reserved_read: buf.get_i64(),
        reserved_write: buf.get_i64(),
    };
    quota.validate()?;
    Ok(quota)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_roundtrip() {
        let tag = Tag::from("analytics");
        let key = quota_key(&tag);
        assert!(key.starts_with(TAG_QUOTA_PREFIX));
        assert_eq!(tag_from_quota_key(&key).unwrap(), tag);
    }

    #[test]
    fn test_key_without_prefix_rejected() {
        assert!(matches!(
            tag_from_quota_key(b"someOtherKey"),
            Err(QuotaError::BadKeyPrefix)
        ));
    }

    #[test]
    fn test_value_roundtrip() {
        let quota = Quota::with_totals(100, 250)
            .with_reserved_read(70)
            .with_reserved_write(0);
        let decoded = decode_quota(&encode_quota(&quota)).unwrap();
        assert_eq!(decoded, quota);
    }

    #[test]
    fn test_short_value_rejected() {
        assert!(matches!(
            decode_quota(&[0_u8; 31]),
            Err(QuotaError::BadValueLength {
                expected: 32,
                actual: 31
            })
        ));
    }

    #[test]
    fn test_invalid_quota_rejected() {
        // reserved_read (70) above total_read (50).
        let quota = Quota {
            total_read: 50,
            total_write: 0,
            reserved_read: 70,
            reserved_write: 0,
        };
        let encoded = encode_quota(&quota);
        assert!(matches!(
            decode_quota(&encoded),
            Err(QuotaError::Invalid(_))
        ));
    }
}
