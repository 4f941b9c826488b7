use std::collections::HashSet;

/// Closed category taxonomy for one deployment. Labels are compared case-insensitively.
#[derive(Debug, Clone)]
pub struct CategoryRegistry {
    names: Vec<String>,
    lookup: HashSet<String>,
}

impl CategoryRegistry {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered = Vec::new();
        let mut lookup = HashSet::new();
        for name in names {
            let trimmed = name.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            if lookup.insert(trimmed.to_lowercase()) {
                ordered.push(trimmed.to_string());
            }
        }
        Self {
            names: ordered,
            lookup,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains(&name.trim().to_lowercase())
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        let wanted = name.trim().to_lowercase();
        self.names
            .iter()
            .find(|known| known.to_lowercase() == wanted)
            .map(String::as_str)
    }

    pub fn first(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
