use std::io;
use std::path::Path;
use tempfile::NamedTempFile;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub fn display_path(path: &Path, base: Option<&Path>) -> String {
    if let Some(base) = base {
        if let Ok(relative) = path.strip_prefix(base) {
            return relative.display().to_string();
        }
    }
    path.display().to_string()
}

/// Keep the last `max_lines` lines of `text`, noting how many were dropped.
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    if lines.len() <= max_lines {
        return lines.join("\n");
    }
    let skipped = lines.len() - max_lines;
    format!(
        "[... {skipped} earlier lines omitted]\n{}",
        lines[skipped..].join("\n")
    )
}

/// Current UTC time as RFC 3339, e.g. `2026-10-16T12:00:00.123456Z`.
pub fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&Rfc3339)
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// Temp file in `dir` that is renamed into `boxes/` once complete. It is
/// created as 0644 (less the umask) because the web server serving `boxes/`
/// usually runs as another user.
pub fn publish_tempfile(dir: &Path, prefix: &str, suffix: &str) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(prefix).suffix(suffix);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o644));
    }
    builder.tempfile_in(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_lines_keeps_end_of_output() {
        let text = "one\ntwo\nthree\nfour\n";
        assert_eq!(tail_lines(text, 10), "one\ntwo\nthree\nfour");
        assert_eq!(
            tail_lines(text, 2),
            "[... 2 earlier lines omitted]\nthree\nfour"
        );
    }

    #[test]
    fn display_path_strips_base() {
        assert_eq!(
            display_path(Path::new("/opt/boxes/a/1.box"), Some(Path::new("/opt/boxes"))),
            "a/1.box"
        );
        assert_eq!(display_path(Path::new("/other/x"), Some(Path::new("/opt"))), "/other/x");
    }

    #[test]
    fn timestamps_are_rfc3339_utc() {
        let stamp = now_rfc3339();
        assert!(stamp.ends_with('Z'), "{stamp}");
        assert!(OffsetDateTime::parse(&stamp, &Rfc3339).is_ok());
    }
}
