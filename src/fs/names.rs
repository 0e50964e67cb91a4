/// Characters that are invalid in file names on at least one supported platform
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Device names Windows refuses as file stems regardless of extension
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Default maximum length of a block slug, in characters
pub const DEFAULT_SLUG_LENGTH: usize = 100;

const MAX_FILENAME_STEM: usize = 150;

/// Turns free text (a post title) into a filesystem-safe directory name
///
/// Invalid characters are removed, line breaks become spaces, runs of whitespace are
/// collapsed, and trailing dots/spaces are stripped. Empty results become `untitled`;
/// Windows device names get a leading underscore.
///
/// # Examples
///
/// ```
/// use forum_loader::fs::slugify;
///
/// assert_eq!(slugify("Hello: \"World\"?*", 100), "Hello World");
/// assert_eq!(slugify("   ", 100), "untitled");
/// assert_eq!(slugify("CON", 100), "_CON");
/// ```
pub fn slugify(text: &str, max_length: usize) -> String {
    let cleaned = clean(text, max_length);
    if cleaned.is_empty() {
        return "untitled".to_string();
    }
    guard_reserved(cleaned)
}

/// Sanitizes a file name while keeping its extension
///
/// ```
/// use forum_loader::fs::sanitize_filename;
///
/// assert_eq!(sanitize_filename("test: file?.jpg"), "test file.jpg");
/// assert_eq!(sanitize_filename(""), "unnamed");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let (stem, extension) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx + 1..]),
        _ => (name, ""),
    };

    let stem = clean(stem, MAX_FILENAME_STEM);
    let extension: String = extension
        .chars()
        .filter(|c| !INVALID_CHARS.contains(c) && !c.is_control() && !c.is_whitespace())
        .collect();

    if stem.is_empty() {
        return "unnamed".to_string();
    }

    let stem = guard_reserved(stem);
    if extension.is_empty() {
        stem
    } else {
        format!("{}.{}", stem, extension)
    }
}

fn clean(text: &str, max_length: usize) -> String {
    let stripped: String = text
        .chars()
        .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })
        .filter(|c| !INVALID_CHARS.contains(c) && !c.is_control())
        .collect();

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(max_length).collect();

    truncated
        .trim_end_matches(|c| c == '.' || c == ' ')
        .to_string()
}

fn guard_reserved(name: String) -> String {
    let stem = name.split('.').next().unwrap_or_default().to_uppercase();
    if RESERVED_NAMES.contains(&stem.as_str()) {
        format!("_{}", name)
    } else {
        name
    }
}
