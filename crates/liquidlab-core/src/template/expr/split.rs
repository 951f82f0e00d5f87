//! Quote and bracket aware splitting
//!
//! A best-effort lexical split, not a balanced-parser validator: unmatched
//! brackets never fail, they just keep the delimiter guarded.

/// Nesting state of a left-to-right scan
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Guard {
    /// Open `()`, `[]` and `{}` counts
    depth: [i32; 3],
    single_quoted: bool,
    double_quoted: bool,
    escaped: bool,
}

impl Guard {
    /// Feed one character; returns true when it is unguarded
    ///
    /// A character is unguarded when it is outside quotes and brackets and
    /// not escaped. Brackets and quotes themselves are never unguarded.
    pub(crate) fn feed(&mut self, c: char) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        match c {
            '\\' => {
                self.escaped = true;
                false
            }
            '\'' if !self.double_quoted => {
                self.single_quoted = !self.single_quoted;
                false
            }
            '"' if !self.single_quoted => {
                self.double_quoted = !self.double_quoted;
                false
            }
            _ if self.single_quoted || self.double_quoted => false,
            '(' | '[' | '{' => {
                self.depth[bracket_index(c)] += 1;
                false
            }
            ')' | ']' | '}' => {
                self.depth[bracket_index(c)] -= 1;
                false
            }
            _ => self.depth.iter().all(|d| *d == 0),
        }
    }
}

fn bracket_index(c: char) -> usize {
    match c {
        '(' | ')' => 0,
        '[' | ']' => 1,
        _ => 2,
    }
}

/// Split `text` on every unguarded `delimiter`, trimming each part
///
/// ```ignore
/// assert_eq!(split("'a,b',c", ','), vec!["'a,b'", "c"]);
/// ```
pub(crate) fn split(text: &str, delimiter: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut guard = Guard::default();
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if guard.feed(c) && c == delimiter {
            parts.push(text[start..i].trim().to_string());
            start = i + c.len_utf8();
        }
    }
    parts.push(text[start..].trim().to_string());
    parts
}

/// Split at the first unguarded `delimiter`
pub(crate) fn split_once(text: &str, delimiter: char) -> Option<(&str, &str)> {
    let mut guard = Guard::default();
    text.char_indices()
        .find(|(_, c)| guard.feed(*c) && *c == delimiter)
        .map(|(i, c)| (text[..i].trim(), text[i + c.len_utf8()..].trim()))
}
