//! Filtered, sorted and paged projections.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;

use super::EntityIndex;

/// Options of [`EntityIndex::view`].
#[derive(Clone, Copy, Default)]
pub struct ViewOptions<'a> {
    /// First match to return.
    pub start: usize,
    /// Page size; all matches when `None`.
    pub length: Option<usize>,
    /// 1-based page, overrides `start` when `length` is set.
    pub page: Option<usize>,
    /// Index predicate.
    pub matcher: Option<&'a dyn Fn(usize) -> bool>,
    /// Index comparator, applied to every match before slicing.
    pub sort: Option<&'a dyn Fn(usize, usize) -> Ordering>,
    /// Case-insensitive text searched in the index's filter properties.
    pub filter: Option<&'a str>,
}

impl<'a> ViewOptions<'a> {
    /// All entities, unsorted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips the first `start` matches.
    #[must_use]
    pub const fn start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    /// Limits the result to `length` matches.
    #[must_use]
    pub const fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Selects a 1-based page of `length` matches.
    #[must_use]
    pub const fn page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    /// Keeps only indices accepted by `matcher`.
    #[must_use]
    pub fn matcher(mut self, matcher: &'a dyn Fn(usize) -> bool) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Orders matches by an index comparator.
    #[must_use]
    pub fn sort(mut self, sort: &'a dyn Fn(usize, usize) -> Ordering) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Keeps only entities containing `text` in a filter property.
    #[must_use]
    pub const fn filter(mut self, text: &'a str) -> Self {
        self.filter = Some(text);
        self
    }
}

/// One page of matched indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct View {
    /// Matched indices of the requested page.
    pub matches: Vec<usize>,
    /// Number of matches before slicing.
    pub count: usize,
    /// Number of pages of the requested length.
    pub pages: usize,
    /// Whether a text filter narrowed the matches.
    pub is_filtered: bool,
}

pub(super) fn build<I>(index: &I, options: &ViewOptions<'_>) -> View
where
    I: EntityIndex + ?Sized,
{
    let needle = options
        .filter
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_lowercase);

    let mut matches = index.matching_entities(options.matcher, None);
    if let Some(needle) = &needle {
        matches.retain(|&at| matches_text(index, at, needle));
    }
    if let Some(sort) = options.sort {
        matches.sort_by(|&a, &b| sort(a, b));
    }

    let count = matches.len();
    let (start, pages) = match options.length {
        Some(0) | None => (options.start, 1),
        Some(length) => {
            let start = options
                .page
                .map_or(options.start, |page| length.saturating_mul(page.saturating_sub(1)));
            (start, count.div_ceil(length))
        }
    };
    let take = options.length.filter(|&length| length > 0).unwrap_or(count);

    View {
        matches: matches.into_iter().skip(start).take(take).collect(),
        count,
        pages,
        is_filtered: needle.is_some(),
    }
}

fn matches_text<I>(index: &I, at: usize, needle: &str) -> bool
where
    I: EntityIndex + ?Sized,
{
    index.filter_props().iter().any(|path| {
        let Some((head, rest)) = path.split_first() else {
            return false;
        };
        index
            .entity_prop_value(at, head)
            .as_ref()
            .and_then(|value| rest.iter().try_fold(value, |value, key| value.get(key.as_str())))
            .is_some_and(|value| text_of(value).to_lowercase().contains(needle))
    })
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
