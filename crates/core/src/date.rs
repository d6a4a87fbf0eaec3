use chrono::NaiveDate;

/// One accepted layout. Text must have a four-digit year and a one- or
/// two-digit day and month before the chrono pattern is tried.
#[derive(Debug, Clone, Copy)]
pub struct DateFormat {
    pub pattern: &'static str,
    pub separator: char,
    pub year_first: bool,
}

/// Accepted date formats, tried in this order. The first one that parses wins.
pub const DATE_FORMATS: [DateFormat; 3] = [
    DateFormat { pattern: "%d-%m-%Y", separator: '-', year_first: false },
    DateFormat { pattern: "%d/%m/%Y", separator: '/', year_first: false },
    DateFormat { pattern: "%Y-%m-%d", separator: '-', year_first: true },
];

impl DateFormat {
    fn matches_shape(&self, value: &str) -> bool {
        let parts: Vec<&str> = value.split(self.separator).collect();
        let [first, middle, last] = parts.as_slice() else {
            return false;
        };
        let (year, day_month) = if self.year_first {
            (*first, [*middle, *last])
        } else {
            (*last, [*first, *middle])
        };
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        year.len() == 4
            && digits(year)
            && day_month.into_iter().all(|p| p.len() <= 2 && digits(p))
    }

    fn parse(&self, value: &str) -> Option<NaiveDate> {
        if !self.matches_shape(value) {
            return None;
        }
        NaiveDate::parse_from_str(value, self.pattern).ok()
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS.iter().find_map(|fmt| fmt.parse(value))
}

/// Canonical storage form, `YYYY-MM-DD`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
