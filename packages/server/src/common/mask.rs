//! PII masking for API responses and logs.

const VISIBLE_CHARS: usize = 4;
const MASK_FULL: &str = "****";

/// Mask an identity document, keeping only the last four characters.
///
/// Documents at or below the visible length mask entirely so short values
/// never leak.
pub fn mask_document(document: &str) -> String {
    if document.is_empty() {
        return MASK_FULL.to_string();
    }

    let chars: Vec<char> = document.chars().collect();
    if chars.len() <= VISIBLE_CHARS {
        return MASK_FULL.to_string();
    }

    let masked_len = chars.len() - VISIBLE_CHARS;
    let mut out = "*".repeat(masked_len);
    out.extend(&chars[masked_len..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(mask_document("12345678Z"), "*****678Z");
    }

    #[test]
    fn short_documents_mask_entirely() {
        assert_eq!(mask_document("ABC"), "****");
        assert_eq!(mask_document("ABCD"), "****");
        assert_eq!(mask_document(""), "****");
    }

    #[test]
    fn mask_length_matches_hidden_prefix() {
        let masked = mask_document("HERM850101MDFRRR01");
        assert_eq!(masked.len(), 18);
        assert!(masked.starts_with(&"*".repeat(14)));
        assert!(masked.ends_with("RR01"));
    }
}
