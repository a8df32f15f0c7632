use std::collections::BTreeSet;
use std::convert::Infallible;
use std::str::FromStr;

/// Resolves a page pattern such as `"1,3-5,8"` into zero-based indices.
pub fn select_by_pattern(pattern: &str, page_count: usize) -> BTreeSet<usize> {
    let mut selected = BTreeSet::new();

    for token in pattern.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        let (start, end) = match token.split_once('-') {
            Some((start, end)) => match (parse_page(start), parse_page(end)) {
                (Some(start), Some(end)) => (start.min(end), start.max(end)),
                _ => continue,
            },
            None => match parse_page(token) {
                Some(page) => (page, page),
                None => continue,
            },
        };

        let first = start.max(1);
        let last = end.min(page_count as i64);
        for page in first..=last {
            selected.insert((page - 1) as usize);
        }
    }

    selected
}

fn parse_page(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Even,
    Odd,
    None,
    Pattern(String),
}

impl Selection {
    pub fn resolve(&self, page_count: usize) -> BTreeSet<usize> {
        match self {
            Selection::All => (0..page_count).collect(),
            Selection::Even => (0..page_count).filter(|idx| (idx + 1) % 2 == 0).collect(),
            Selection::Odd => (0..page_count).filter(|idx| (idx + 1) % 2 == 1).collect(),
            Selection::None => BTreeSet::new(),
            Selection::Pattern(pattern) => select_by_pattern(pattern, page_count),
        }
    }
}

impl FromStr for Selection {
    type Err = Infallible;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "all" => Selection::All,
            "even" => Selection::Even,
            "odd" => Selection::Odd,
            "none" | "clear" => Selection::None,
            _ => Selection::Pattern(trimmed.to_owned()),
        })
    }
}
