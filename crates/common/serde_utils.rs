use serde::{Deserialize, Deserializer, Serializer, de::Error};

pub mod u64 {
    use super::*;

    pub mod hex_str {
        use super::*;

        pub fn deserialize<'de, D>(d: D) -> Result<u64, D::Error>
        where
            D: Deserializer<'de>,
        {
            let value = String::deserialize(d)?;
            u64::from_str_radix(value.trim_start_matches("0x"), 16)
                .map_err(|_| D::Error::custom("Failed to deserialize u64 value"))
        }

        pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.serialize_str(&format!("{value:#x}"))
        }
    }
}

/// Arbitrary precision integers, as found in genesis allocations and header difficulty.
///
/// Accepts `0x`-prefixed hex or plain decimal strings; always serializes as `0x` hex so the
/// dump format round-trips exactly.
pub mod biguint {
    use super::*;
    use num_bigint::BigUint;
    use num_traits::Num;

    pub fn parse(value: &str) -> Option<BigUint> {
        match value.strip_prefix("0x") {
            Some("") => Some(BigUint::default()),
            Some(hex) => BigUint::from_str_radix(hex, 16).ok(),
            None => BigUint::from_str_radix(value, 10).ok(),
        }
    }

    pub fn deserialize<'de, D>(d: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(d)?;
        parse(&value).ok_or_else(|| D::Error::custom(format!("invalid integer: {value}")))
    }

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{value:#x}"))
    }
}

pub mod bytes {
    use ::bytes::Bytes;

    use super::*;

    pub fn deserialize<'de, D>(d: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(d)?;
        let bytes = hex::decode(value.trim_start_matches("0x"))
            .map_err(|e| D::Error::custom(e.to_string()))?;
        Ok(Bytes::from(bytes))
    }

    pub fn serialize<S>(value: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }
}
