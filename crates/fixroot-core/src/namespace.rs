/// Literal path prefixes eligible for redirection.
///
/// Matching is a plain byte-prefix test: a prefix ending in `/` selects a
/// whole tree, one without (`/proc/cpuinfo`) selects anything spelled that way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSet {
    prefixes: Vec<Vec<u8>>,
}

impl NamespaceSet {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.as_ref().as_bytes().to_vec())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, absolute: &[u8]) -> bool {
        self.prefixes.iter().any(|p| absolute.starts_with(p))
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.prefixes.iter().map(Vec::as_slice)
    }
}

impl Default for NamespaceSet {
    fn default() -> Self {
        Self::new(fixroot_config::DEFAULT_NAMESPACES)
    }
}
