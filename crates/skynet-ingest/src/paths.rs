use std::path::{Path, PathBuf};

/// Compute the sharded final path for a stored image:
/// `data/images/<a>/<b>/<id>_<slug>.<ext>`, where `<a><b>` are the first
/// four hex characters of the element id — two levels of two-character
/// shards keep any single directory from accumulating too many files.
pub fn sharded_image_path(images_root: &Path, element_id: &str, slug: &str, ext: &str) -> PathBuf {
    let hex: String = element_id.chars().filter(|c| c.is_ascii_hexdigit()).take(4).collect();
    let a = &hex[0..2.min(hex.len())];
    let b = if hex.len() >= 4 { &hex[2..4] } else { "00" };
    images_root.join(a).join(b).join(format!("{element_id}_{slug}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shards_by_first_four_hex_chars() {
        let root = Path::new("data/images");
        let path = sharded_image_path(root, "01ab23cd-0000-7000-8000-000000000000", "sunset", "jpg");
        assert_eq!(path, PathBuf::from("data/images/01/ab/01ab23cd-0000-7000-8000-000000000000_sunset.jpg"));
    }
}
