//! Ordered header list with case-insensitive names.

/// Header entries in the order they were added.
///
/// Names compare ASCII case-insensitively but keep the spelling they were
/// added with, which is what a committed response writes. A name may appear
/// more than once: [`insert`](Self::insert) appends, [`set`](Self::set)
/// collapses to a single entry.
///
/// # Examples
///
/// ```
/// use waypoint::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("X-Custom", "first");
/// headers.insert("X-Custom", "second");
/// headers.set("x-custom", "only");
///
/// let all: Vec<_> = headers.get_all("X-CUSTOM").collect();
/// assert_eq!(all, vec!["only"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Adds an entry after the existing ones, keeping earlier values of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Leaves exactly one entry for `name`, holding `value`.
    ///
    /// The entry keeps the position of the first existing one; a new name goes
    /// to the end.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let Some(first) = self.position(&name) else {
            self.entries.push((name, value));
            return;
        };

        self.entries[first].1 = value;
        let mut index = 0;
        self.entries.retain(|(existing, _)| {
            let keep = index <= first || !existing.eq_ignore_ascii_case(&name);
            index += 1;
            keep
        });
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    /// Every value for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Distinct names in first-seen order, spelled as first added.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::with_capacity(self.entries.len());
        for (name, _) in &self.entries {
            if !names.iter().any(|seen| seen.eq_ignore_ascii_case(name)) {
                names.push(name);
            }
        }
        names
    }

    /// Number of entries, counting repeated names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut headers = Headers::new();
        headers.insert("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert!(headers.contains("Content-type"));
        assert_eq!(headers.get("accept"), None);
    }

    #[test]
    fn insert_keeps_every_value() {
        let mut headers = Headers::new();
        headers.insert("Cookie", "a=1");
        headers.insert("cookie", "b=2");
        let values: Vec<_> = headers.get_all("COOKIE").collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn set_collapses_onto_the_first_entry() {
        let mut headers = Headers::new();
        headers.insert("X-A", "1");
        headers.insert("X-B", "2");
        headers.insert("x-a", "3");
        headers.set("X-A", "4");
        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("X-A", "4"), ("X-B", "2")]);
    }

    #[test]
    fn set_appends_an_unseen_name() {
        let mut headers = Headers::new();
        headers.insert("X-A", "1");
        headers.set("X-B", "2");
        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, vec![("X-A", "1"), ("X-B", "2")]);
    }

    #[test]
    fn names_are_distinct_and_ordered() {
        let mut headers = Headers::new();
        headers.insert("X-Total", "1");
        headers.insert("ETag", "\"abc\"");
        headers.insert("x-total", "2");
        assert_eq!(headers.names(), vec!["X-Total", "ETag"]);
        assert!(Headers::new().names().is_empty());
    }
}
