//! Codec traits for the bridge node datastore.
//!
//! The datastore itself stores raw bytes. The traits here describe how typed keys and
//! values are turned into those bytes, and [`Table`] groups a key type, a value type and
//! a key prefix so that several logical tables can share one keyspace.

use std::fmt::Debug;

/// Trait that will transform the data to be saved in the DB.
pub trait Encode: Send + Sync + Sized + Debug {
    /// Encoded type.
    type Encoded: AsRef<[u8]> + Into<Vec<u8>> + Send + Sync + Debug;

    /// Encodes data going into the database.
    fn encode(self) -> Self::Encoded;
}

/// Trait that will transform the data to be read from the DB.
pub trait Decode: Send + Sync + Sized + Debug {
    /// Decodes data coming from the database.
    fn decode(value: &[u8]) -> Result<Self, DecodeError>;

    /// Decodes owned data coming from the database.
    fn decode_owned(value: Vec<u8>) -> Result<Self, DecodeError> {
        Self::decode(&value)
    }
}

/// Generic trait that enforces the database key to implement [`Encode`] and [`Decode`].
pub trait Key: Encode + Decode + Ord + Clone {}

impl<T> Key for T where T: Encode + Decode + Ord + Clone {}

/// Generic trait that enforces the database value to implement [`Encode`] and [`Decode`].
pub trait Value: Encode + Decode {}

impl<T> Value for T where T: Encode + Decode {}

/// A logical table inside the flat datastore keyspace.
///
/// Rows are stored under `PREFIX || key.encode()`. Prefixes of different tables must not
/// be prefixes of each other.
pub trait Table: Send + Sync + Debug + 'static {
    /// Key prefix that namespaces this table.
    const PREFIX: &'static [u8];

    /// Key type.
    type Key: Key;

    /// Value type.
    type Value: Value;

    /// Full datastore key for `key`.
    fn raw_key(key: Self::Key) -> Vec<u8> {
        let encoded = key.encode();
        let mut raw = Vec::with_capacity(Self::PREFIX.len() + encoded.as_ref().len());
        raw.extend_from_slice(Self::PREFIX);
        raw.extend_from_slice(encoded.as_ref());
        raw
    }

    /// Strips the table prefix from a raw datastore key and decodes the rest.
    fn decode_raw_key(raw: &[u8]) -> Result<Self::Key, DecodeError> {
        let rest = raw.strip_prefix(Self::PREFIX).ok_or(DecodeError::Prefix)?;
        Self::Key::decode(rest)
    }
}

/// Codec error type.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Value has the wrong length for a fixed-size type.
    #[error("expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },
    /// Raw key does not belong to the table being decoded.
    #[error("key does not carry the table prefix")]
    Prefix,
    /// Bytes are not valid UTF-8.
    #[error("invalid utf-8")]
    Utf8,
    /// Other unspecified error.
    #[error("{_0}")]
    Other(String),
}

macro_rules! impl_uint {
    ($($ty:ty),*) => {
        $(
            impl Encode for $ty {
                type Encoded = [u8; std::mem::size_of::<$ty>()];

                fn encode(self) -> Self::Encoded {
                    // Big-endian keeps numeric order equal to byte order.
                    self.to_be_bytes()
                }
            }

            impl Decode for $ty {
                fn decode(value: &[u8]) -> Result<Self, DecodeError> {
                    let bytes: [u8; std::mem::size_of::<$ty>()] =
                        value.try_into().map_err(|_| DecodeError::Length {
                            expected: std::mem::size_of::<$ty>(),
                            got: value.len(),
                        })?;
                    Ok(<$ty>::from_be_bytes(bytes))
                }
            }
        )*
    };
}

impl_uint!(u32, u64, u128);

impl Encode for Vec<u8> {
    type Encoded = Vec<u8>;

    fn encode(self) -> Self::Encoded {
        self
    }
}

impl Decode for Vec<u8> {
    fn decode(value: &[u8]) -> Result<Self, DecodeError> {
        Ok(value.to_vec())
    }

    fn decode_owned(value: Vec<u8>) -> Result<Self, DecodeError> {
        Ok(value)
    }
}

impl Encode for String {
    type Encoded = Vec<u8>;

    fn encode(self) -> Self::Encoded {
        self.into_bytes()
    }
}

impl Decode for String {
    fn decode(value: &[u8]) -> Result<Self, DecodeError> {
        std::str::from_utf8(value)
            .map(str::to_owned)
            .map_err(|_| DecodeError::Utf8)
    }

    fn decode_owned(value: Vec<u8>) -> Result<Self, DecodeError> {
        String::from_utf8(value).map_err(|_| DecodeError::Utf8)
    }
}

impl<const N: usize> Encode for [u8; N] {
    type Encoded = [u8; N];

    fn encode(self) -> Self::Encoded {
        self
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(value: &[u8]) -> Result<Self, DecodeError> {
        value.try_into().map_err(|_| DecodeError::Length {
            expected: N,
            got: value.len(),
        })
    }
}

#[cfg(feature = "alloy")]
mod alloy_impls {
    use super::{Decode, DecodeError, Encode};
    use alloy_primitives::{Address, B256};

    impl Encode for Address {
        type Encoded = [u8; 20];

        fn encode(self) -> Self::Encoded {
            self.0.0
        }
    }

    impl Decode for Address {
        fn decode(value: &[u8]) -> Result<Self, DecodeError> {
            <[u8; 20]>::decode(value).map(Address::from)
        }
    }

    impl Encode for B256 {
        type Encoded = [u8; 32];

        fn encode(self) -> Self::Encoded {
            self.0
        }
    }

    impl Decode for B256 {
        fn decode(value: &[u8]) -> Result<Self, DecodeError> {
            <[u8; 32]>::decode(value).map(B256::from)
        }
    }
}
