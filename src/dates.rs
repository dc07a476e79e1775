use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

/// Ledger keys must fall in this range; anything outside is treated as
/// "not a date" rather than an error.
const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

/// Convert an arbitrary textual date token into a canonical date, or `None`
/// if the token does not denote one.
///
/// Exported files are routinely hand-edited in spreadsheet tools that
/// silently reformat dates, so this is permissive and format-detecting.
/// Formats are tried in priority order: canonical `YYYY-MM-DD`, slash
/// month-first `M/D/YYYY`, dash day-first `D-M-YYYY`, `YYYY/MM/DD`, dot
/// day-first `DD.MM.YYYY`, compact `YYYYMMDD`, month-name forms
/// ("October 27, 2025", "27 Oct 2025"), then a general datetime fallback.
/// Slash dates are month-first and dash/dot dates are day-first; the
/// separator alone disambiguates `05/06` from `05-06`.
///
/// The same function classifies column headers as date columns, so header
/// detection and value parsing can never disagree.
pub fn normalize(token: &str) -> Option<NaiveDate> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    dashed(token)
        .or_else(|| slashed(token))
        .or_else(|| dotted(token))
        .or_else(|| compact(token))
        .or_else(|| month_name(token))
        .or_else(|| general_fallback(token))
        .filter(|date| (MIN_YEAR..=MAX_YEAR).contains(&date.year()))
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.len() <= 4 && s.bytes().all(|b| b.is_ascii_digit())
}

fn split3(token: &str, sep: char) -> Option<(&str, &str, &str)> {
    let mut parts = token.split(sep);
    let a = parts.next()?;
    let b = parts.next()?;
    let c = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    (all_digits(a) && all_digits(b) && all_digits(c)).then_some((a, b, c))
}

fn from_ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// `YYYY-MM-DD` (canonical) or `D-M-YYYY` (day-first).
fn dashed(token: &str) -> Option<NaiveDate> {
    let (a, b, c) = split3(token, '-')?;
    if a.len() == 4 {
        from_ymd(a, b, c)
    } else if c.len() == 4 {
        from_ymd(c, b, a)
    } else {
        None
    }
}

/// `M/D/YYYY` (month-first, the dominant export convention) or `YYYY/MM/DD`.
fn slashed(token: &str) -> Option<NaiveDate> {
    let (a, b, c) = split3(token, '/')?;
    if a.len() == 4 {
        from_ymd(a, b, c)
    } else if c.len() == 4 {
        from_ymd(c, a, b)
    } else {
        None
    }
}

/// `DD.MM.YYYY` (day-first).
fn dotted(token: &str) -> Option<NaiveDate> {
    let (a, b, c) = split3(token, '.')?;
    (c.len() == 4).then(|| from_ymd(c, b, a)).flatten()
}

/// `YYYYMMDD`, eight contiguous digits.
fn compact(token: &str) -> Option<NaiveDate> {
    if token.len() != 8 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    from_ymd(&token[0..4], &token[4..6], &token[6..8])
}

fn month_number(name: &str) -> Option<u32> {
    const NAMES: [&str; 12] = [
        "january", "february", "march", "april", "may", "june", "july", "august", "september",
        "october", "november", "december",
    ];
    let lower = name.to_ascii_lowercase();
    NAMES
        .iter()
        .position(|full| *full == lower || full[..3] == lower)
        .map(|i| i as u32 + 1)
}

/// `October 27, 2025`, `Oct 27 2025`, `27 October, 2025`, `27 Oct 2025`.
/// Case-insensitive, comma optional.
fn month_name(token: &str) -> Option<NaiveDate> {
    let cleaned = token.replace(',', " ");
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    let [first, second, year] = parts[..] else {
        return None;
    };
    if !all_digits(year) || year.len() != 4 {
        return None;
    }
    let (month, day) = if all_digits(second) {
        (month_number(first)?, second)
    } else if all_digits(first) {
        (month_number(second)?, first)
    } else {
        return None;
    };
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

/// Last resort: formats a general-purpose date parser would accept.
fn general_fallback(token: &str) -> Option<NaiveDate> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(token) {
        return Some(datetime.date_naive());
    }
    if let Ok(datetime) = DateTime::parse_from_rfc2822(token) {
        return Some(datetime.date_naive());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(token, format) {
            return Some(datetime.date());
        }
    }
    None
}
