//! Ordered header multimap.

/// Ordered collection of `name:value` pairs.
///
/// Repeated names are preserved in arrival order, but lookups only ever see
/// the first occurrence as STOMP 1.2 requires.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Create an empty header set.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Value of the first header called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether any header called `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool { self.get(name).is_some() }

    /// Append a header, keeping any earlier entry with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Replace every entry called `name` with a single new value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.0.push((name, value.into()));
    }

    /// Remove every entry called `name`, returning the first removed value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let mut first = None;
        self.0.retain_mut(|(key, value)| {
            if key != name {
                return true;
            }
            if first.is_none() {
                first = Some(std::mem::take(value));
            }
            false
        });
        first
    }

    /// Append every entry of `other`.
    pub fn extend_from(&mut self, other: &Headers) { self.0.extend(other.0.iter().cloned()); }

    /// Drop all entries.
    pub fn clear(&mut self) { self.0.clear(); }

    /// Iterate entries in arrival order, duplicates included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
