//! Size and time units used when quoting storage.

/// Native token amount in wei.
pub type Wei = u128;

/// Bytes in one GiB, the unit quotas are bought in.
pub const GB: u64 = 1024 * 1024 * 1024;

/// Projection period used for monthly netflow quotes.
pub const MONTH_SECS: u64 = 30 * 24 * 60 * 60;

/// Period the quota prepayment is reserved for.
pub const WEEK_SECS: u64 = 7 * 24 * 60 * 60;

/// Wei per whole native token.
pub const WEI_PER_TOKEN: u128 = 1_000_000_000_000_000_000;

/// Converts whole GiB to bytes, saturating on overflow.
pub fn gb_to_bytes(gb: u64) -> u64 {
    gb.saturating_mul(GB)
}

/// Converts bytes to whole GiB, rounding down.
pub fn bytes_to_gb(bytes: u64) -> u64 {
    bytes / GB
}

/// Serializes large integers as decimal strings, the way the chain encodes
/// them; plain JSON numbers are accepted on input.
pub(crate) mod num_string {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }
        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text,
            Raw::Unsigned(n) => n.to_string(),
            Raw::Signed(n) => n.to_string(),
        };
        text.trim().parse().map_err(de::Error::custom)
    }
}
