use serde::Serialize;

/// How the presentation layer should render a previewed object.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    Image,
    Pdf,
    Text,
    Code,
    Unknown,
}

/// A preview URL plus enough type information to pick a renderer.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewTarget {
    pub key: String,
    pub url: String,
    pub kind: FileKind,
    pub language: &'static str,
}

fn extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => String::new(),
    }
}

pub fn file_kind(file_name: &str) -> FileKind {
    match extension(file_name).as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" | "bmp" => FileKind::Image,
        "pdf" => FileKind::Pdf,
        "txt" | "md" | "json" | "xml" | "csv" | "html" => FileKind::Text,
        "js" | "jsx" | "ts" | "tsx" | "css" | "scss" | "less" | "py" | "java" | "c" | "cpp"
        | "cs" | "go" | "php" | "rb" | "rs" | "swift" => FileKind::Code,
        _ => FileKind::Unknown,
    }
}

/// Syntax-highlighting language name for a file, `plaintext` when unknown.
pub fn code_language(file_name: &str) -> &'static str {
    match extension(file_name).as_str() {
        "js" => "javascript",
        "jsx" => "jsx",
        "ts" => "typescript",
        "tsx" => "tsx",
        "css" => "css",
        "scss" => "scss",
        "less" => "less",
        "html" => "html",
        "xml" => "xml",
        "json" => "json",
        "py" => "python",
        "java" => "java",
        "c" => "c",
        "cpp" => "cpp",
        "cs" => "csharp",
        "go" => "go",
        "php" => "php",
        "rb" => "ruby",
        "rs" => "rust",
        "swift" => "swift",
        "sh" => "bash",
        "yaml" | "yml" => "yaml",
        "md" => "markdown",
        _ => "plaintext",
    }
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "—".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_extension_case_insensitively() {
        assert_eq!(file_kind("photo.JPG"), FileKind::Image);
        assert_eq!(file_kind("docs/invoice.pdf"), FileKind::Pdf);
        assert_eq!(file_kind("notes.md"), FileKind::Text);
        assert_eq!(file_kind("main.rs"), FileKind::Code);
        assert_eq!(file_kind("archive.tar.gz"), FileKind::Unknown);
        assert_eq!(file_kind("Makefile"), FileKind::Unknown);
    }

    #[test]
    fn languages_fall_back_to_plaintext() {
        assert_eq!(code_language("lib.rs"), "rust");
        assert_eq!(code_language("ci.yml"), "yaml");
        assert_eq!(code_language("README"), "plaintext");
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_file_size(0), "—");
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
    }
}
