// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;

/// Collapses the concrete type parameters of a generic function name, so all
/// instantiations share one display name.
///
/// Two spellings are recognized:
/// - bracketed lists, `pkg.F[go.shape.int].func1` becomes `pkg.F[...].func1`;
///   everything from the first `[` to the last `]` is replaced.
/// - turbofish lists, `collect::<Vec<u8>>` becomes `collect::<...>`.
///
/// A leading qualified path such as `<Vec<T> as Drop>::drop` names the impl,
/// not an instantiation, and is kept as is.
pub fn collapse_type_parameters(symbol: &str) -> Cow<'_, str> {
    let (prefix, path) = symbol.split_at(qualified_prefix_len(symbol));
    let brackets = collapse_brackets(path);
    let turbofish = collapse_turbofish(&brackets);
    if let (Cow::Borrowed(_), Cow::Borrowed(_)) = (&brackets, &turbofish) {
        return Cow::Borrowed(symbol);
    }
    Cow::Owned(format!("{prefix}{turbofish}"))
}

fn qualified_prefix_len(symbol: &str) -> usize {
    if !symbol.starts_with('<') {
        return 0;
    }
    matching_angle(symbol, 1).map_or(0, |end| end + 1)
}

/// Byte offset of the `>` closing the `<` that precedes `start`.
fn matching_angle(s: &str, start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut prev = '\0';
    for (i, c) in s.get(start..)?.char_indices() {
        match c {
            '<' => depth += 1,
            // `->` in a function pointer type is not a bracket.
            '>' if prev != '-' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
        prev = c;
    }
    None
}

fn collapse_brackets(path: &str) -> Cow<'_, str> {
    let (Some(open), Some(close)) = (path.find('['), path.rfind(']')) else {
        return Cow::Borrowed(path);
    };
    if close <= open {
        return Cow::Borrowed(path);
    }
    Cow::Owned(format!("{}[...]{}", &path[..open], &path[close + 1..]))
}

fn collapse_turbofish(path: &str) -> Cow<'_, str> {
    let mut out = String::new();
    let mut rest = path;
    while let Some(i) = rest.find("::<") {
        let open = i + 3;
        let Some(close) = matching_angle(rest, open) else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str("...>");
        rest = &rest[close + 1..];
    }
    if out.is_empty() {
        return Cow::Borrowed(path);
    }
    out.push_str(rest);
    Cow::Owned(out)
}
