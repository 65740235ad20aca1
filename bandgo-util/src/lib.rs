pub mod drain;
pub mod random;

use bytes::Bytes;
use http_body_util::Full;

const UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

#[inline]
pub fn empty_body() -> Full<Bytes> {
    Full::new(Bytes::new())
}

#[inline]
pub fn byte_body<B: Into<Bytes>>(bytes: B) -> Full<Bytes> {
    Full::new(bytes.into())
}

/// Formats a byte count on a 1024 scale with three decimals, `0` is `"0B"`.
#[must_use]
pub fn readable_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.3}{}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readable_bytes_scales() {
        assert_eq!("0B", readable_bytes(0));
        assert_eq!("1.000B", readable_bytes(1));
        assert_eq!("1023.000B", readable_bytes(1023));
        assert_eq!("1.000KB", readable_bytes(1024));
        assert_eq!("1.500KB", readable_bytes(1536));
        assert_eq!("1.000MB", readable_bytes(1_048_576));
        assert_eq!("1.000GB", readable_bytes(1 << 30));
        assert_eq!("16.000EB", readable_bytes(u64::MAX));
    }
}
