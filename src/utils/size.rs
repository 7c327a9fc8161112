const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Convert a byte count into a human-readable size string, scaling by 1024.
///
/// Integral values print without a fraction ("1 KB"), everything else with
/// two decimals ("1.50 MB").
pub fn convert_file_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if size.fract() == 0.0 {
        format!("{} {}", size as u64, UNITS[unit])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
