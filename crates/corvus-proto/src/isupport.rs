//! ISUPPORT (005) token construction.

/// Builds RPL_ISUPPORT parameter lists, split into lines of at most 13
/// tokens as is conventional.
#[derive(Debug, Default)]
pub struct IsupportBuilder {
    tokens: Vec<String>,
}

const TOKENS_PER_LINE: usize = 13;

impl IsupportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bare token, e.g. `WHOX`.
    pub fn flag(mut self, name: &str) -> Self {
        self.tokens.push(name.to_string());
        self
    }

    /// Add a `NAME=value` token.
    pub fn value(mut self, name: &str, value: impl ToString) -> Self {
        self.tokens.push(format!("{}={}", name, value.to_string()));
        self
    }

    /// Produce the token groups, one per 005 line. The caller appends the
    /// trailing "are supported by this server" text.
    pub fn lines(self) -> Vec<Vec<String>> {
        self.tokens
            .chunks(TOKENS_PER_LINE)
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_tokens() {
        let lines = IsupportBuilder::new()
            .value("NICKLEN", 30)
            .value("CHANTYPES", "#&")
            .flag("WHOX")
            .lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], vec!["NICKLEN=30", "CHANTYPES=#&", "WHOX"]);
    }

    #[test]
    fn splits_long_lists() {
        let mut b = IsupportBuilder::new();
        for i in 0..20 {
            b = b.value("TOKEN", i);
        }
        let lines = b.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), 13);
        assert_eq!(lines[1].len(), 7);
    }
}
