use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};

use crate::types::Rendition;

/// Clean a filename by removing characters that are invalid on common
/// filesystems: `/`, `\`, `:`, `*`, `?`, `"`, `<`, `>`, `|`.
pub fn clean_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect()
}

/// Whether a remote name maps onto exactly one local path component.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Insert `__<rendition>` before the extension: `foo.jpg` → `foo__medium.jpg`.
pub fn rendition_filename(filename: &str, rendition: Rendition) -> String {
    match filename.rfind('.') {
        Some(dot) => {
            let (stem, ext) = filename.split_at(dot);
            format!("{}__{}{}", stem, rendition.as_str(), ext)
        }
        None => format!("{}__{}", filename, rendition.as_str()),
    }
}

/// Name of an original rendition: the added timestamp, then the remote name.
pub fn original_filename(filename: &str, added: &DateTime<Utc>) -> String {
    format!("{}_{}", added.format("%Y-%m-%d_%H-%M-%S"), filename)
}

/// `<destination>/<year>/<month>`, month without zero padding.
pub fn photo_dir(destination: &Path, added: &DateTime<Utc>) -> PathBuf {
    destination
        .join(added.year().to_string())
        .join(added.month().to_string())
}

/// Local path of one rendition of a photo.
pub fn local_photo_path(
    destination: &Path,
    filename: &str,
    added: &DateTime<Utc>,
    rendition: Rendition,
) -> PathBuf {
    let dir = photo_dir(destination, added);
    match rendition {
        Rendition::Original => dir.join(original_filename(filename, added)),
        other => dir.join(rendition_filename(filename, other)),
    }
}

/// Where earlier releases stored the original rendition.
pub fn legacy_original_path(destination: &Path, filename: &str, added: &DateTime<Utc>) -> PathBuf {
    photo_dir(destination, added).join(rendition_filename(filename, Rendition::Original))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn added() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap()
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("photo:1.jpg"), "photo1.jpg");
        assert_eq!(clean_filename("a/b\\c*d?e\"f<g>h|i"), "abcdefghi");
        assert_eq!(clean_filename("normal.jpg"), "normal.jpg");
    }

    #[test]
    fn test_is_safe_component() {
        assert!(is_safe_component("report.pdf"));
        assert!(is_safe_component(".hidden"));
        assert!(!is_safe_component(""));
        assert!(!is_safe_component("."));
        assert!(!is_safe_component(".."));
        assert!(!is_safe_component("a/b"));
        assert!(!is_safe_component("a\\b"));
    }

    #[test]
    fn test_rendition_filename() {
        assert_eq!(rendition_filename("foo.jpg", Rendition::Medium), "foo__medium.jpg");
        assert_eq!(rendition_filename("IMG_1.HEIC", Rendition::Thumb), "IMG_1__thumb.HEIC");
        assert_eq!(
            rendition_filename("archive.tar.gz", Rendition::Medium),
            "archive.tar__medium.gz"
        );
        assert_eq!(rendition_filename("noext", Rendition::Thumb), "noext__thumb");
    }

    #[test]
    fn test_original_filename_has_timestamp_prefix() {
        assert_eq!(
            original_filename("IMG_1.jpg", &added()),
            "2024-03-07_09-05-01_IMG_1.jpg"
        );
    }

    #[test]
    fn test_local_photo_path_layout() {
        let dest = Path::new("/photos");
        assert_eq!(
            local_photo_path(dest, "IMG_1.jpg", &added(), Rendition::Original),
            PathBuf::from("/photos/2024/3/2024-03-07_09-05-01_IMG_1.jpg")
        );
        assert_eq!(
            local_photo_path(dest, "IMG_1.jpg", &added(), Rendition::Medium),
            PathBuf::from("/photos/2024/3/IMG_1__medium.jpg")
        );
    }

    #[test]
    fn test_legacy_original_path() {
        assert_eq!(
            legacy_original_path(Path::new("/photos"), "IMG_1.jpg", &added()),
            PathBuf::from("/photos/2024/3/IMG_1__original.jpg")
        );
    }
}
