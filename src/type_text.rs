//! Splitting of raw type references such as `numeric(10,2)[]`.
//!
//! This never touches the catalog. Catalog-internal array names (`_text`)
//! pass through untouched; the basic-info resolver discovers that they are
//! arrays.

/// A raw type reference split into its syntactic parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedType {
    /// The text exactly as it was requested.
    pub original: String,
    /// The type name with modifiers and array brackets removed.
    pub plain: String,
    /// Contents of the last parenthesized group, e.g. `10,2`.
    pub modifiers: Option<String>,
    /// Number of trailing `[]` (or `[N]`) pairs.
    pub explicit_dimensions: usize,
}

impl ParsedType {
    /// Split `text` into name, modifiers and explicit array depth.
    ///
    /// Total over any input: malformed text still produces a `ParsedType`,
    /// check [`is_well_formed`](Self::is_well_formed) before sending it to the catalog.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();

        let (without_modifiers, modifiers) = match last_paren_group(trimmed) {
            Some((open, close)) => {
                let mut rest = String::with_capacity(trimmed.len());
                rest.push_str(trimmed[..open].trim_end());
                rest.push_str(&trimmed[close + 1..]);

                (rest, Some(trimmed[open + 1..close].trim().to_owned()))
            }
            None => (trimmed.to_owned(), None),
        };

        let mut plain = without_modifiers.as_str();
        let mut explicit_dimensions = 0;

        while let Some(stripped) = strip_array_suffix(plain) {
            plain = stripped;
            explicit_dimensions += 1;
        }

        ParsedType {
            original: text.to_owned(),
            plain: plain.trim().to_owned(),
            modifiers,
            explicit_dimensions,
        }
    }

    /// `false` unless the plain name is something `to_regtype` can parse.
    ///
    /// That is up to three dot-separated parts, each an unquoted or a quoted
    /// identifier. Names of several words (`double precision`,
    /// `timestamp with time zone`) are only accepted unqualified and only
    /// for the SQL types spelled that way. Everything else, e.g. `foo(1)(2)`,
    /// `int4[]x`, `public.foo-bar` or `foo bar baz`, is rejected here;
    /// servers before PostgreSQL 16 raise a syntax error for such names
    /// instead of returning NULL.
    pub fn is_well_formed(&self) -> bool {
        let Some(parts) = split_qualified(&self.plain) else {
            return false;
        };

        let qualified = parts.len() > 1;

        parts.len() <= 3
            && parts.iter().all(|part| match part {
                NamePart::Quoted => true,
                NamePart::Words(words) if words.len() == 1 => true,
                NamePart::Words(words) => !qualified && is_multi_word_type(words),
            })
    }
}

/// SQL types whose standard spelling has more than one word.
const MULTI_WORD_TYPES: &[&str] = &[
    "bit varying",
    "char varying",
    "character varying",
    "double precision",
    "national char",
    "national char varying",
    "national character",
    "national character varying",
    "nchar varying",
    "time with time zone",
    "time without time zone",
    "timestamp with time zone",
    "timestamp without time zone",
    "interval year",
    "interval month",
    "interval day",
    "interval hour",
    "interval minute",
    "interval second",
    "interval year to month",
    "interval day to hour",
    "interval day to minute",
    "interval day to second",
    "interval hour to minute",
    "interval hour to second",
    "interval minute to second",
];

enum NamePart {
    Quoted,
    /// Lowercased words of an unquoted part.
    Words(Vec<String>),
}

fn is_multi_word_type(words: &[String]) -> bool {
    MULTI_WORD_TYPES.contains(&words.join(" ").as_str())
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit() || c == '$'
}

/// Split a possibly qualified name into its parts, or `None` if it is not
/// identifier syntax.
fn split_qualified(text: &str) -> Option<Vec<NamePart>> {
    let mut chars = text.chars().peekable();
    let mut parts = Vec::new();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        if chars.next_if_eq(&'"').is_some() {
            let mut empty = true;

            loop {
                match chars.next()? {
                    '"' if chars.next_if_eq(&'"').is_some() => empty = false,
                    '"' => break,
                    _ => empty = false,
                }
            }

            // zero-length delimited identifiers are not allowed
            if empty {
                return None;
            }

            parts.push(NamePart::Quoted);
        } else {
            let mut words = Vec::new();

            loop {
                if !chars.peek().copied().is_some_and(is_ident_start) {
                    return None;
                }

                let mut word = String::new();

                while let Some(c) = chars.next_if(|c| is_ident_char(*c)) {
                    word.push(c.to_ascii_lowercase());
                }

                words.push(word);

                while chars.next_if(|c| c.is_whitespace()).is_some() {}

                if !chars.peek().copied().is_some_and(is_ident_start) {
                    break;
                }
            }

            parts.push(NamePart::Words(words));
        }

        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        match chars.next() {
            None => return Some(parts),
            Some('.') => {}
            Some(_) => return None,
        }
    }
}

/// Byte offsets of the last `(` outside double quotes and the `)` closing it.
fn last_paren_group(text: &str) -> Option<(usize, usize)> {
    let mut in_quotes = false;
    let mut open = None;
    let mut close = None;

    for (i, c) in text.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => {
                open = Some(i);
                close = None;
            }
            ')' if !in_quotes && open.is_some() && close.is_none() => close = Some(i),
            _ => {}
        }
    }

    open.zip(close)
}

/// Strip one trailing `[]` or `[N]` pair.
fn strip_array_suffix(text: &str) -> Option<&str> {
    let text = text.trim_end();
    let inner = text.strip_suffix(']')?;
    let open = inner.rfind('[')?;

    if inner[open + 1..].trim().chars().all(|c| c.is_ascii_digit()) {
        Some(&inner[..open])
    } else {
        None
    }
}
