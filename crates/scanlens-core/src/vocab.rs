//! Fixed label vocabulary for the last-resort classifier.
//!
//! The fallback MobileNet head emits raw ImageNet class indices. This table
//! covers the classes a handheld scanner is actually pointed at; indices
//! outside the table render as a placeholder instead of failing the scan.

/// Sparse (index, label) table, sorted by index for binary search.
pub const FALLBACK_VOCAB: &[(usize, &str)] = &[
    (0, "background"),
    (1, "tench, Tinca tinca"),
    (2, "goldfish, Carassius auratus"),
    (3, "great white shark, white shark"),
    (4, "tiger shark, Galeocerdo cuvieri"),
    (5, "hammerhead, hammerhead shark"),
    (101, "computer keyboard, keypad"),
    (102, "computer mouse"),
    (145, "coffee mug"),
    (199, "backpack"),
    (218, "clock"),
    (232, "digital watch"),
    (233, "wall clock"),
    (245, "cellular telephone, cellular phone, cellphone"),
    (248, "notebook, notebook computer"),
    (249, "monitor"),
    (276, "sunglasses, dark glasses, shades"),
    (283, "laptop, laptop computer"),
    (296, "pen"),
    (300, "book, books"),
    (329, "cat"),
    (331, "dog"),
    (371, "car, automobile"),
    (417, "shopping basket"),
    (442, "table"),
    (487, "bowl"),
    (488, "chair"),
    (506, "glass"),
    (530, "banana"),
    (549, "strawberry"),
    (660, "TV"),
    (720, "pillow"),
    (756, "computer monitor"),
    (761, "coffee table"),
    (764, "desk"),
    (770, "door"),
    (780, "window"),
    (834, "glasses, eyeglasses"),
    (849, "headphones"),
    (859, "lamp"),
    (950, "water bottle"),
    (999, "unknown"),
];

/// Look up a class index in the fixed table.
pub fn lookup(index: usize) -> Option<&'static str> {
    FALLBACK_VOCAB
        .binary_search_by_key(&index, |&(i, _)| i)
        .ok()
        .map(|pos| FALLBACK_VOCAB[pos].1)
}

/// Label for a class index; unmapped indices get a stable placeholder.
pub fn label_for(index: usize) -> String {
    match lookup(index) {
        Some(label) => label.to_string(),
        None => format!("unknown_{index}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted_by_index() {
        for pair in FALLBACK_VOCAB.windows(2) {
            assert!(pair[0].0 < pair[1].0, "table must be strictly ascending");
        }
    }

    #[test]
    fn test_lookup_known() {
        assert_eq!(lookup(145), Some("coffee mug"));
        assert_eq!(lookup(331), Some("dog"));
        assert_eq!(lookup(0), Some("background"));
        assert_eq!(lookup(999), Some("unknown"));
    }

    #[test]
    fn test_lookup_unknown() {
        assert_eq!(lookup(6), None);
        assert_eq!(lookup(1000), None);
    }

    #[test]
    fn test_label_for_placeholder() {
        assert_eq!(label_for(42), "unknown_42");
        assert_eq!(label_for(283), "laptop, laptop computer");
    }
}
