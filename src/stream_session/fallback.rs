//! Vendor-typical RTSP path variants

use url::Url;

/// Stream paths tried when the configured URL does not open, in order
pub const FALLBACK_PATHS: &[&str] = &[
    "h264Preview_01_main",
    "h264Preview_01_sub",
    "Preview_01_main",
    "Preview_01_sub",
    "h265Preview_01_main",
    "h265Preview_01_sub",
];

/// The configured URL followed by every distinct fallback variant
///
/// Variants keep scheme, credentials, host and port; only the path changes.
/// An unparseable URL yields just itself.
pub fn candidate_urls(url: &str) -> Vec<String> {
    let mut candidates = vec![url.to_string()];

    let Ok(base) = Url::parse(url) else {
        return candidates;
    };

    for path in FALLBACK_PATHS {
        let mut variant = base.clone();
        variant.set_path(&format!("/{}", path));
        variant.set_query(None);
        let variant = variant.to_string();
        if !candidates.contains(&variant) {
            candidates.push(variant);
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_url_first_and_skipped_in_variants() {
        let url = "rtsp://admin:pw@192.168.1.20:554/h264Preview_01_main";
        let candidates = candidate_urls(url);
        assert_eq!(candidates[0], url);
        assert_eq!(candidates[1], "rtsp://admin:pw@192.168.1.20:554/h264Preview_01_sub");
        assert_eq!(candidates.len(), FALLBACK_PATHS.len());
    }

    #[test]
    fn test_variants_keep_credentials_and_port() {
        let candidates = candidate_urls("rtsp://u:p@cam.local:8554/live?channel=1");
        assert_eq!(candidates.len(), FALLBACK_PATHS.len() + 1);
        for variant in &candidates[1..] {
            assert!(variant.starts_with("rtsp://u:p@cam.local:8554/"));
            assert!(!variant.contains('?'));
        }
    }

    #[test]
    fn test_unparseable_url() {
        assert_eq!(candidate_urls("junk"), vec!["junk".to_string()]);
    }
}
