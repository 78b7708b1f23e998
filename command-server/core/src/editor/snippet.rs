//! Snippet expansion.
//!
//! Supports the tab-stop subset clients send: `$1`, `${1}`, `${1:default}`
//! and `$0`. Placeholders expand to their default text. `\$`, `\}` and `\\`
//! escape. Nested placeholders and choice/variable syntax are not expanded.

/// Expanded snippet text plus the range of the first tab stop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpandedSnippet {
    /// Text to insert
    pub text: String,
    /// Character range (start, end) of the tab stop the cursor lands on
    pub cursor: Option<(usize, usize)>,
}

#[derive(Clone, Copy)]
struct TabStop {
    index: u32,
    start: usize,
    end: usize,
}

/// Expand a snippet body
#[must_use]
pub fn expand(snippet: &str) -> ExpandedSnippet {
    let chars: Vec<char> = snippet.chars().collect();
    let mut text = String::new();
    let mut len = 0usize;
    let mut stops: Vec<TabStop> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\\' && matches!(chars.get(i + 1), Some('$' | '}' | '\\')) {
            text.push(chars[i + 1]);
            len += 1;
            i += 2;
            continue;
        }

        if c == '$' {
            if let Some((index, default, consumed)) = parse_tab_stop(&chars[i + 1..]) {
                let start = len;
                text.push_str(&default);
                len += default.chars().count();
                stops.push(TabStop {
                    index,
                    start,
                    end: len,
                });
                i += 1 + consumed;
                continue;
            }
        }

        text.push(c);
        len += 1;
        i += 1;
    }

    let first = stops
        .iter()
        .filter(|s| s.index > 0)
        .min_by_key(|s| s.index)
        .or_else(|| stops.iter().find(|s| s.index == 0));

    ExpandedSnippet {
        text,
        cursor: first.map(|s| (s.start, s.end)),
    }
}

/// Parse what follows a `$`: returns (index, default text, chars consumed)
fn parse_tab_stop(rest: &[char]) -> Option<(u32, String, usize)> {
    let digits = rest.iter().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let index = rest[..digits].iter().collect::<String>().parse().ok()?;
        return Some((index, String::new(), digits));
    }

    if rest.first() != Some(&'{') {
        return None;
    }
    let body = &rest[1..];
    let digits = body.iter().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let index = body[..digits].iter().collect::<String>().parse().ok()?;

    match body.get(digits) {
        Some('}') => Some((index, String::new(), 1 + digits + 1)),
        Some(':') => {
            let default_start = digits + 1;
            let close = body[default_start..].iter().position(|&c| c == '}')?;
            let default: String = body[default_start..default_start + close].iter().collect();
            Some((index, default, 1 + default_start + close + 1))
        }
        _ => None,
    }
}
