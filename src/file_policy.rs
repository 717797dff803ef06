//! Upload policy: allowed file categories, size limits, and size formatting.

use std::fmt;
use std::path::Path;

/// Allowed upload categories, each an explicit extension list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileCategory {
    Images,
    Documents,
    Archives,
    Audio,
    Video,
}

impl FileCategory {
    pub const ALL: [FileCategory; 5] = [
        FileCategory::Images,
        FileCategory::Documents,
        FileCategory::Archives,
        FileCategory::Audio,
        FileCategory::Video,
    ];

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FileCategory::Images => &["jpg", "jpeg", "png", "gif", "bmp", "webp"],
            FileCategory::Documents => &[
                "pdf", "doc", "docx", "txt", "xls", "xlsx", "ppt", "pptx",
            ],
            FileCategory::Archives => &["zip", "rar", "7z", "tar", "gz"],
            FileCategory::Audio => &["mp3", "wav", "ogg", "m4a", "flac"],
            FileCategory::Video => &["mp4", "avi", "mkv", "mov", "webm"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileCategory::Images => "images",
            FileCategory::Documents => "documents",
            FileCategory::Archives => "archives",
            FileCategory::Audio => "audio",
            FileCategory::Video => "video",
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased extension of `file_name`, without the dot
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Category of `file_name`, if its extension is allowed
pub fn classify(file_name: &str) -> Option<FileCategory> {
    let ext = extension_of(file_name)?;
    FileCategory::ALL
        .into_iter()
        .find(|category| category.extensions().contains(&ext.as_str()))
}

/// Why an upload was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadRejection {
    TooLarge { size: u64, max: u64 },
    UnsupportedType { extension: Option<String> },
}

impl fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadRejection::TooLarge { size, max } => {
                write!(f, "file of {} bytes exceeds limit of {} bytes", size, max)
            }
            UploadRejection::UnsupportedType { extension } => match extension {
                Some(ext) => write!(f, "extension '.{}' is not allowed", ext),
                None => write!(f, "file has no extension"),
            },
        }
    }
}

/// Check size first, then type.
pub fn validate_upload(
    file_name: &str,
    size: u64,
    max_size: u64,
) -> Result<FileCategory, UploadRejection> {
    if size > max_size {
        return Err(UploadRejection::TooLarge {
            size,
            max: max_size,
        });
    }

    classify(file_name).ok_or_else(|| UploadRejection::UnsupportedType {
        extension: extension_of(file_name),
    })
}

/// Human readable size: `0B`, `512.00 B`, `1.50 KB`, `50.00 MB`
pub fn format_file_size(size_bytes: u64) -> String {
    if size_bytes == 0 {
        return "0B".to_string();
    }

    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(classify("holiday.JPG"), Some(FileCategory::Images));
        assert_eq!(classify("thesis.docx"), Some(FileCategory::Documents));
        assert_eq!(classify("backup.7z"), Some(FileCategory::Archives));
        assert_eq!(classify("song.flac"), Some(FileCategory::Audio));
        assert_eq!(classify("clip.mkv"), Some(FileCategory::Video));
        assert_eq!(classify("setup.exe"), None);
        assert_eq!(classify("README"), None);
    }

    #[test]
    fn test_size_is_checked_before_type() {
        assert_eq!(
            validate_upload("virus.exe", 2_000, 1_000),
            Err(UploadRejection::TooLarge {
                size: 2_000,
                max: 1_000
            })
        );
        assert_eq!(
            validate_upload("virus.exe", 10, 1_000),
            Err(UploadRejection::UnsupportedType {
                extension: Some("exe".to_string())
            })
        );
        assert_eq!(validate_upload("notes.txt", 1_000, 1_000), Ok(FileCategory::Documents));
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0B");
        assert_eq!(format_file_size(512), "512.00 B");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(50 * 1024 * 1024), "50.00 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
