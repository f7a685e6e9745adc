
use memtable::ValueEntry;

/// Builds sorted entries from `(key, Some(value) | None)` pairs.
pub(crate) fn entries(items: &[(&str, Option<&str>)]) -> Vec<(String, ValueEntry)> {
    let mut out: Vec<(String, ValueEntry)> = items
        .iter()
        .map(|(k, v)| {
            let entry = match v {
                Some(v) => ValueEntry::live(v.to_string()),
                None => ValueEntry::tombstone(),
            };
            (k.to_string(), entry)
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

pub(crate) fn numbered(n: usize) -> Vec<(String, ValueEntry)> {
    (0..n)
        .map(|i| (format!("key{:05}", i), ValueEntry::live(format!("val{}", i))))
        .collect()
}
