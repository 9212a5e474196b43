use std::borrow::Cow;

/// Placeholder substituted with the escaped login inside `ldap_filter`.
pub const USERNAME_PLACEHOLDER: &str = "%username";

/// Escape a raw assertion value per RFC 4515 (`*`, `(`, `)`, `\` and NUL).
pub fn escape_value(value: &str) -> Cow<'_, str> {
    ldap3::ldap_escape(value)
}

/// Build the search filter for a login attempt.
///
/// The login is always escaped before being embedded. With an empty `extra`
/// filter the result is the single equality clause `(attribute=login)`;
/// otherwise the clause is AND-ed with `extra`, in which every
/// [`USERNAME_PLACEHOLDER`] is replaced by the escaped login.
pub fn login_filter(attribute: &str, login: &str, extra: &str) -> String {
    let escaped = escape_value(login);
    let clause = format!("({}={})", attribute, escaped);

    if extra.is_empty() {
        clause
    } else {
        let extra = extra.replace(USERNAME_PLACEHOLDER, &escaped);
        format!("(&{}{})", clause, extra)
    }
}

/// Check that a configured filter is syntactically valid per RFC 4515.
///
/// ```text
/// filter     = "(" filtercomp ")"
/// filtercomp = and / or / not / item
/// filterlist = 1*filter
/// item       = attr filtertype value
/// filtertype = "=" / "~=" / ">=" / "<="
/// ```
pub fn validate_filter(filter: &str) -> Result<(), String> {
    let bytes = filter.trim().as_bytes();
    if bytes.is_empty() {
        return Err("filter cannot be empty".to_string());
    }

    let end = parse_filter(bytes, 0)?;
    if end != bytes.len() {
        return Err(format!("unexpected characters after position {}", end));
    }
    Ok(())
}

fn parse_filter(input: &[u8], pos: usize) -> Result<usize, String> {
    if input.get(pos) != Some(&b'(') {
        return Err(format!("expected '(' at position {}", pos + 1));
    }

    let end = match input.get(pos + 1) {
        Some(b'&') | Some(b'|') => parse_filter_list(input, pos + 2)?,
        Some(b'!') => parse_filter(input, pos + 2)?,
        Some(_) => parse_item(input, pos + 1)?,
        None => return Err(format!("unexpected end of filter at position {}", pos + 2)),
    };

    if input.get(end) != Some(&b')') {
        return Err(format!("expected ')' at position {}", end + 1));
    }
    Ok(end + 1)
}

fn parse_filter_list(input: &[u8], pos: usize) -> Result<usize, String> {
    if input.get(pos) != Some(&b'(') {
        return Err(format!("empty filter list at position {}", pos + 1));
    }
    let mut cur = pos;
    while input.get(cur) == Some(&b'(') {
        cur = parse_filter(input, cur)?;
    }
    Ok(cur)
}

fn parse_item(input: &[u8], pos: usize) -> Result<usize, String> {
    let mut cur = pos;
    while cur < input.len()
        && (input[cur].is_ascii_alphanumeric() || matches!(input[cur], b'-' | b'.' | b';'))
    {
        cur += 1;
    }
    if cur == pos {
        return Err(format!("expected attribute name at position {}", pos + 1));
    }

    match (input.get(cur), input.get(cur + 1)) {
        (Some(b'~' | b'>' | b'<'), Some(b'=')) => cur += 2,
        (Some(b'='), _) => cur += 1,
        _ => {
            return Err(format!(
                "expected comparison operator at position {}",
                cur + 1
            ))
        }
    }

    while cur < input.len() && input[cur] != b')' {
        cur += if input[cur] == b'\\' { 2 } else { 1 };
    }
    Ok(cur.min(input.len()))
}
