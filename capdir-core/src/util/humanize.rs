//! src/util/humanize.rs

pub fn human_readable_size(size: u64) -> String {
    if size == 0 {
        return "0 B".to_string();
    }
    let units: [&'static str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];
    let mut size_f: f64 = size as f64;
    let mut unit_idx: usize = 0;

    while size_f >= 1024.0 && unit_idx < units.len() - 1 {
        size_f /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size, units[unit_idx])
    } else if size_f.fract() == 0.0 {
        format!("{} {}", size_f as u64, units[unit_idx])
    } else {
        format!("{:.1} {}", size_f, units[unit_idx])
    }
}

/// Count formatter used in batch summaries: `1 file`, `3 files`.
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(human_readable_size(0), "0 B");
        assert_eq!(human_readable_size(512), "512 B");
        assert_eq!(human_readable_size(1024), "1 KB");
        assert_eq!(human_readable_size(1536), "1.5 KB");
        assert_eq!(human_readable_size(1024 * 1024 * 1024), "1 GB");
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural(1, "file"), "1 file");
        assert_eq!(plural(0, "file"), "0 files");
    }
}
