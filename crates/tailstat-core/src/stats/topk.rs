//! Top-K selection over aggregated message counts.

use std::collections::HashMap;

/// Returns the `k` highest-count entries, sorted by descending count with
/// ascending byte order of the key as the tie-break.
pub fn top_k(counts: &HashMap<String, u64>, k: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts
        .iter()
        .map(|(key, &count)| (key.clone(), count))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_bytes().cmp(b.0.as_bytes())));
    entries.truncate(k);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
        pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn test_orders_by_count_then_key() {
        let map = counts(&[("b", 3), ("a", 3), ("c", 9), ("d", 1)]);
        let top = top_k(&map, 10);
        assert_eq!(
            top,
            vec![
                ("c".to_string(), 9),
                ("a".to_string(), 3),
                ("b".to_string(), 3),
                ("d".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_truncates_to_k() {
        let map = counts(&[("a", 5), ("b", 4), ("c", 3)]);
        let top = top_k(&map, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, "a");
        assert_eq!(top[1].0, "b");
    }

    #[test]
    fn test_empty_input() {
        assert!(top_k(&HashMap::new(), 5).is_empty());
    }

    #[test]
    fn test_ties_break_on_raw_bytes() {
        // 'Z' (0x5a) sorts before 'a' (0x61) in byte order.
        let map = counts(&[("a", 2), ("Z", 2)]);
        let top = top_k(&map, 2);
        assert_eq!(top[0].0, "Z");
        assert_eq!(top[1].0, "a");
    }
}
