use std::fmt;

const KILO_BYTE: u64 = 1024;
const MEGA_BYTE: u64 = KILO_BYTE * 1024;
const GIGA_BYTE: u64 = MEGA_BYTE * 1024;

/// Human readable byte count for log output.
pub struct PrettySize(pub u64);

impl fmt::Display for PrettySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        let (unit, scale) = match bytes {
            b if b < KILO_BYTE => return write!(f, "{} B", b),
            b if b < MEGA_BYTE => ("KB", KILO_BYTE),
            b if b < GIGA_BYTE => ("MB", MEGA_BYTE),
            _ => ("GB", GIGA_BYTE),
        };
        write!(f, "{:.2} {}", bytes as f64 / scale as f64, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::PrettySize;

    #[test]
    fn pretty_sizes() {
        assert_eq!(PrettySize(512).to_string(), "512 B");
        assert_eq!(PrettySize(4096).to_string(), "4.00 KB");
        assert_eq!(PrettySize(32 * 1024 * 1024).to_string(), "32.00 MB");
    }
}
