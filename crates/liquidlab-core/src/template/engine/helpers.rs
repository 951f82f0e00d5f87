//! Text helpers shared by the tokenizer and the compiler

/// Count newlines in text
pub(crate) fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

/// Drop trailing spaces and tabs
pub(crate) fn trim_blank_end(text: &str) -> &str {
    text.trim_end_matches([' ', '\t'])
}

/// Drop leading spaces and tabs plus one line break (`\n` or `\r\n`)
pub(crate) fn trim_line_start(text: &str) -> &str {
    let rest = text.trim_start_matches([' ', '\t']);
    rest.strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest)
}

/// Prefix every line of `text` with `sign `, dropping its indentation
pub(crate) fn prefix_lines(text: &str, sign: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| format!("{} {}", sign, line.trim_start_matches([' ', '\t'])))
        .collect()
}

/// Split `keyword rest` at the first whitespace
pub(crate) fn split_keyword(text: &str) -> (&str, &str) {
    match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], text[i..].trim()),
        None => (text, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_line_start() {
        assert_eq!(trim_line_start("  \nnext\n"), "next\n");
        assert_eq!(trim_line_start("\t\r\nnext"), "next");
        assert_eq!(trim_line_start("  next"), "next");
        assert_eq!(trim_line_start("\n\nnext"), "\nnext");
    }

    #[test]
    fn test_trim_blank_end_keeps_newlines() {
        assert_eq!(trim_blank_end("a\n \t"), "a\n");
    }

    #[test]
    fn test_prefix_lines() {
        assert_eq!(prefix_lines("a\nb", "#"), "# a\n# b");
        assert_eq!(prefix_lines("a\n", "//"), "// a\n");
        assert_eq!(prefix_lines("", "#"), "");
        assert_eq!(prefix_lines("  indented\n\tnext", "#"), "# indented\n# next");
    }

    #[test]
    fn test_split_keyword() {
        assert_eq!(split_keyword("if  x > 1"), ("if", "x > 1"));
        assert_eq!(split_keyword("break"), ("break", ""));
    }
}
