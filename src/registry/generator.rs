use base64::prelude::*;
use rand::RngExt;

/// Produces candidate short codes. Uniqueness is enforced by the registry.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random bytes rendered as unpadded base64url.
///
/// Three bytes give a four character code drawn from `[A-Za-z0-9_-]`, so the
/// result never contains '/', '?', '#' or whitespace.
#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    bytes: usize,
}

impl RandomCodeGenerator {
    pub const DEFAULT_BYTES: usize = 3;

    pub fn new(bytes: usize) -> Self {
        Self {
            bytes: bytes.max(1),
        }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BYTES)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::rng();
        let raw: Vec<u8> = (0..self.bytes).map(|_| rng.random::<u8>()).collect();
        BASE64_URL_SAFE_NO_PAD.encode(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_code_is_four_url_safe_chars() {
        let generator = RandomCodeGenerator::default();
        for _ in 0..500 {
            let code = generator.generate();
            assert_eq!(code.len(), 4);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn test_length_follows_byte_count() {
        assert_eq!(RandomCodeGenerator::new(6).generate().len(), 8);
        // Zero bytes would always collide; it is bumped to one.
        assert_eq!(RandomCodeGenerator::new(0).generate().len(), 2);
    }

    #[test]
    fn test_codes_vary() {
        let generator = RandomCodeGenerator::new(8);
        let codes: HashSet<String> = (0..100).map(|_| generator.generate()).collect();
        assert_eq!(codes.len(), 100);
    }
}
