use rand::Rng;

const ALPHABET: &[u8] = b"0123456789abcdef";

/// Random lowercase hex identifier of the given length.
///
/// Callers that need uniqueness against a registry must check for collisions
/// themselves and retry; the registry is the source of truth.
pub(crate) fn unique_identifier(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_and_alphabet() {
        let id = unique_identifier(16);
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }
}
