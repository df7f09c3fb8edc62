use std::path::Path;

/// Grammar used to read a script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    TypeScript,
    Tsx,
}

impl Language {
    /// Detect grammar from file extension; anything unrecognised is read as JavaScript
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            _ => Language::JavaScript,
        }
    }

    /// Detect grammar from file path or URL path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::JavaScript)
    }

    /// Get language name as string
    pub fn as_str(self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
        }
    }

    /// Slot used by per-grammar caches
    pub(crate) const fn index(self) -> usize {
        match self {
            Language::JavaScript => 0,
            Language::TypeScript => 1,
            Language::Tsx => 2,
        }
    }

    /// Get Tree-sitter language instance
    pub fn tree_sitter_language(self) -> tree_sitter::Language {
        match self {
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(Language::from_extension("js"), Language::JavaScript);
        assert_eq!(Language::from_extension("MJS"), Language::JavaScript);
        assert_eq!(Language::from_extension("ts"), Language::TypeScript);
        assert_eq!(Language::from_extension("tsx"), Language::Tsx);
        assert_eq!(Language::from_extension("vue"), Language::JavaScript);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Language::from_path("webpack:///src/app.ts"), Language::TypeScript);
        assert_eq!(Language::from_path("static/js/main.3f2a.js"), Language::JavaScript);
        assert_eq!(Language::from_path("no_extension"), Language::JavaScript);
    }

    #[test]
    fn test_grammars_load() {
        for lang in [Language::JavaScript, Language::TypeScript, Language::Tsx] {
            let mut parser = tree_sitter::Parser::new();
            assert!(parser.set_language(&lang.tree_sitter_language()).is_ok());
        }
    }
}
