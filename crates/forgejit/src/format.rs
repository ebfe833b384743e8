//! Output format resolution.

/// Resolves the format of an output file.
///
/// A non-empty `explicit` format wins. Otherwise the format is the path's
/// extension, or the empty string if the file name has none.
pub fn file_format(path: &str, explicit: &str) -> String {
    if !explicit.is_empty() {
        return explicit.to_string();
    }
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match file_name.rfind('.') {
        Some(dot) => file_name[dot + 1..].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_format_wins() {
        assert_eq!(file_format("out/unit.o", "ll"), "ll");
    }

    #[test]
    fn test_extension_used_when_not_explicit() {
        assert_eq!(file_format("out/unit.ll", ""), "ll");
        assert_eq!(file_format("unit.tar.bc", ""), "bc");
    }

    #[test]
    fn test_no_extension() {
        assert_eq!(file_format("out.d/unit", ""), "");
        assert_eq!(file_format("", ""), "");
    }
}
