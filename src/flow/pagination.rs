//! Stateless paginated view of a user's stored files.

use crate::file_policy::format_file_size;
use crate::localization::LocalizationManager;
use crate::store::StoredFile;

use super::{Button, Keyboard};

pub const FILES_PER_PAGE: usize = 5;

pub const PAGE_CALLBACK_PREFIX: &str = "files_page:";
pub const DOWNLOAD_CALLBACK_PREFIX: &str = "download:";
pub const DELETE_CALLBACK_PREFIX: &str = "delete:";

/// One page of a list, 1-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: usize,
    pub total_pages: usize,
    pub start: usize,
    pub end: usize,
}

impl Page {
    /// Clamp `requested` into `1..=ceil(total / per_page)`.
    ///
    /// An empty list still has one (empty) page.
    pub fn compute(total: usize, requested: usize, per_page: usize) -> Self {
        let per_page = per_page.max(1);
        let total_pages = total.div_ceil(per_page).max(1);
        let number = requested.clamp(1, total_pages);
        let start = (number - 1) * per_page;
        let end = (start + per_page).min(total);
        Self {
            number,
            total_pages,
            start,
            end,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }
}

/// Parse the numeric suffix of a `prefix<id>` callback
pub fn parse_callback_id<T: std::str::FromStr>(data: &str, prefix: &str) -> Option<T> {
    data.strip_prefix(prefix)?.parse().ok()
}

/// Text and keyboard for one page of `files` (already newest first)
pub fn render_files_page(
    files: &[StoredFile],
    requested_page: usize,
    localization: &LocalizationManager,
    language_code: Option<&str>,
) -> (String, Keyboard) {
    let page = Page::compute(files.len(), requested_page, FILES_PER_PAGE);

    let mut text = localization.t_args(
        "files-header",
        &[
            ("page", page.number.to_string()),
            ("pages", page.total_pages.to_string()),
        ],
        language_code,
    );
    text.push_str("\n\n");

    let mut keyboard: Keyboard = Vec::new();
    for file in &files[page.start..page.end] {
        text.push_str(&format!(
            "🆔 {}\n📄 {}\n📊 {}\n📅 {}\n",
            file.id,
            file.file_name,
            format_file_size(file.file_size.max(0) as u64),
            file.uploaded_at.format("%Y-%m-%d")
        ));
        if let Some(description) = &file.description {
            text.push_str(&format!("📝 {}\n", description));
        }
        text.push('\n');

        keyboard.push(vec![
            Button::new(
                format!("📥 {}", file.id),
                format!("{}{}", DOWNLOAD_CALLBACK_PREFIX, file.id),
            ),
            Button::new(
                format!("🗑️ {}", file.id),
                format!("{}{}", DELETE_CALLBACK_PREFIX, file.id),
            ),
        ]);
    }

    let mut navigation = Vec::new();
    if page.has_previous() {
        navigation.push(Button::new(
            format!("⬅️ {}", localization.t("previous", language_code)),
            format!("{}{}", PAGE_CALLBACK_PREFIX, page.number - 1),
        ));
    }
    if page.has_next() {
        navigation.push(Button::new(
            format!("{} ➡️", localization.t("next", language_code)),
            format!("{}{}", PAGE_CALLBACK_PREFIX, page.number + 1),
        ));
    }
    if !navigation.is_empty() {
        keyboard.push(navigation);
    }

    (text.trim_end().to_string(), keyboard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn files(count: i64) -> Vec<StoredFile> {
        (1..=count)
            .rev()
            .map(|id| StoredFile {
                id,
                user_id: 1,
                file_handle: format!("h{}", id),
                file_name: format!("file{}.pdf", id),
                file_type: "application/pdf".to_string(),
                file_size: 2048,
                uploaded_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                description: (id % 2 == 0).then(|| format!("note {}", id)),
            })
            .collect()
    }

    fn nav_row(keyboard: &Keyboard) -> Vec<String> {
        keyboard
            .last()
            .filter(|row| row.iter().all(|b| b.data.starts_with(PAGE_CALLBACK_PREFIX)))
            .map(|row| row.iter().map(|b| b.data.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_twelve_files_make_three_pages() {
        let first = Page::compute(12, 1, FILES_PER_PAGE);
        assert_eq!(first.total_pages, 3);
        assert!(!first.has_previous());
        assert!(first.has_next());

        let middle = Page::compute(12, 2, FILES_PER_PAGE);
        assert!(middle.has_previous());
        assert!(middle.has_next());

        let last = Page::compute(12, 3, FILES_PER_PAGE);
        assert!(last.has_previous());
        assert!(!last.has_next());
        assert_eq!((last.start, last.end), (10, 12));
    }

    #[test]
    fn test_out_of_range_pages_are_clamped() {
        assert_eq!(Page::compute(12, 0, FILES_PER_PAGE).number, 1);
        assert_eq!(Page::compute(12, 9, FILES_PER_PAGE).number, 3);
        assert_eq!(Page::compute(0, 1, FILES_PER_PAGE).total_pages, 1);
        assert_eq!(Page::compute(10, 2, FILES_PER_PAGE).end, 10);
    }

    #[test]
    fn test_render_navigation_rows() {
        let localization = LocalizationManager::new().unwrap();
        let all = files(12);

        let (text, keyboard) = render_files_page(&all, 1, &localization, None);
        assert!(text.contains("1/3"));
        assert!(text.contains("file12.pdf"));
        assert!(text.contains("note 12"));
        assert_eq!(keyboard.len(), 6);
        assert_eq!(nav_row(&keyboard), vec!["files_page:2"]);

        let (_, keyboard) = render_files_page(&all, 2, &localization, None);
        assert_eq!(nav_row(&keyboard), vec!["files_page:1", "files_page:3"]);

        let (text, keyboard) = render_files_page(&all, 3, &localization, None);
        assert!(text.contains("file1.pdf"));
        assert_eq!(keyboard.len(), 3);
        assert_eq!(nav_row(&keyboard), vec!["files_page:2"]);
        assert_eq!(keyboard[0][0].data, "download:2");
        assert_eq!(keyboard[0][1].data, "delete:2");
    }

    #[test]
    fn test_single_page_has_no_navigation() {
        let localization = LocalizationManager::new().unwrap();
        let (_, keyboard) = render_files_page(&files(3), 1, &localization, None);
        assert_eq!(keyboard.len(), 3);
        assert!(nav_row(&keyboard).is_empty());
    }

    #[test]
    fn test_parse_callback_id() {
        assert_eq!(parse_callback_id::<i64>("download:17", DOWNLOAD_CALLBACK_PREFIX), Some(17));
        assert_eq!(parse_callback_id::<usize>("files_page:x", PAGE_CALLBACK_PREFIX), None);
        assert_eq!(parse_callback_id::<i64>("delete:3", DOWNLOAD_CALLBACK_PREFIX), None);
    }
}
