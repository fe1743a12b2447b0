//! Raw counter readings as returned by a status query.

use std::collections::BTreeMap;

/// Unprocessed counter or variable values for one poll of one target.
///
/// Keys are stored upper-cased so `SHOW GLOBAL STATUS` (`Queries`) and
/// `information_schema.GLOBAL_STATUS` (`QUERIES`) spellings look the same.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReading {
    values: BTreeMap<String, String>,
}

impl RawReading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any earlier value under the same name.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.values
            .insert(name.as_ref().to_ascii_uppercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Iterate over `(NAME, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for RawReading
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut reading = Self::new();
        for (name, value) in iter {
            reading.insert(name, value);
        }
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_case_insensitive() {
        let reading: RawReading = [("Queries", "42"), ("Threads_connected", "3")]
            .into_iter()
            .collect();

        assert_eq!(reading.get("QUERIES"), Some("42"));
        assert_eq!(reading.get("queries"), Some("42"));
        assert_eq!(reading.get("THREADS_CONNECTED"), Some("3"));
        assert_eq!(reading.iter().count(), 2);
    }

    #[test]
    fn test_later_insert_wins() {
        let mut reading = RawReading::new();
        reading.insert("uptime", "10");
        reading.insert("UPTIME", "11");

        assert_eq!(reading.iter().count(), 1);
        assert_eq!(reading.get("Uptime"), Some("11"));
    }
}
