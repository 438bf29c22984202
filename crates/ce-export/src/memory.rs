//! Resident memory sampling.

/// Resident set size of this process in bytes.
///
/// Read from `/proc/self/statm` on Linux; `None` on other platforms or when
/// the file cannot be parsed.
#[cfg(target_os = "linux")]
pub(crate) fn resident_bytes() -> Option<u64> {
    // statm reports pages; 4 KiB pages on the platforms we run on.
    const PAGE_SIZE: u64 = 4096;
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * PAGE_SIZE)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn resident_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_resident_bytes_on_linux() {
        assert!(resident_bytes().is_some_and(|bytes| bytes > 0));
    }
}
