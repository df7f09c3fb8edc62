use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::types::ChunkType;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tree_sitter::{Node, Parser, Tree};

/// Initializer kinds that make a variable declaration worth its own chunk
const FUNCTION_LIKE: &[&str] = &[
    "function",
    "function_expression",
    "arrow_function",
    "generator_function",
    "class",
];

/// Top-level constructs extracted as chunks; every other node kind is descended into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Construct {
    Function,
    Class,
    Variable,
    Export,
    Method,
}

impl Construct {
    fn classify(node: Node) -> Option<Self> {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => Some(Self::Function),
            "class_declaration" | "abstract_class_declaration" => Some(Self::Class),
            "lexical_declaration" | "variable_declaration" => {
                function_valued_declarator(node).map(|_| Self::Variable)
            }
            "export_statement" if exports_declaration(node) => Some(Self::Export),
            "method_definition" => Some(Self::Method),
            _ => None,
        }
    }

    const fn chunk_type(self) -> ChunkType {
        match self {
            Self::Function => ChunkType::Function,
            Self::Class => ChunkType::Class,
            Self::Variable => ChunkType::Variable,
            Self::Export => ChunkType::Export,
            Self::Method => ChunkType::Method,
        }
    }

    fn symbol(self, node: Node, source: &[u8]) -> Option<String> {
        match self {
            Self::Export => export_name(node, source),
            Self::Variable => function_valued_declarator(node)
                .and_then(|declarator| field_text(declarator, "name", source)),
            Self::Function | Self::Class | Self::Method => field_text(node, "name", source),
        }
    }
}

/// A named construct found in the tree, in byte coordinates
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Declaration {
    pub start_byte: usize,
    pub end_byte: usize,
    pub chunk_type: ChunkType,
    pub symbol_name: Option<String>,
}

/// One lazily created parser per grammar, owned by a [`crate::Chunker`]
#[derive(Default)]
pub(crate) struct ParserPool {
    slots: [OnceCell<Mutex<Parser>>; 3],
}

impl ParserPool {
    fn parse(&self, language: Language, text: &str) -> Result<Option<Tree>> {
        let slot = self.slots[language.index()].get_or_try_init(|| {
            let mut parser = Parser::new();
            parser
                .set_language(&language.tree_sitter_language())
                .map_err(|e| ChunkerError::tree_sitter(format!("Failed to set language: {e}")))?;
            Ok::<_, ChunkerError>(Mutex::new(parser))
        })?;

        let mut parser = slot.lock().unwrap_or_else(PoisonError::into_inner);
        parser.reset();
        Ok(parser.parse(text, None))
    }
}

/// Runs the strict and lenient parse passes and walks the accepted tree
pub(crate) struct AstAnalyzer<'a> {
    parsers: &'a ParserPool,
    parse_attempts: &'a AtomicUsize,
}

impl<'a> AstAnalyzer<'a> {
    pub fn new(parsers: &'a ParserPool, parse_attempts: &'a AtomicUsize) -> Self {
        Self {
            parsers,
            parse_attempts,
        }
    }

    /// Named constructs of `text`, or `None` when neither parse pass is usable
    pub fn declarations(&self, text: &str, language: Language) -> Option<Vec<Declaration>> {
        let module_tree = self.parse(language, text);
        if let Some(tree) = &module_tree {
            if !tree.root_node().has_error() {
                return Some(collect_declarations(tree.root_node(), text.as_bytes()));
            }
        }

        // Script pass: plain JavaScript, tolerating recoverable errors.
        let script_tree = if language == Language::JavaScript {
            module_tree
        } else {
            self.parse(Language::JavaScript, text)
        }?;

        let root = script_tree.root_node();
        let broken = error_bytes(root);
        if broken.saturating_mul(2) > text.len() {
            log::debug!(
                "Rejecting parse: {broken} of {} bytes inside error nodes",
                text.len()
            );
            return None;
        }
        Some(collect_declarations(root, text.as_bytes()))
    }

    fn parse(&self, language: Language, text: &str) -> Option<Tree> {
        self.parse_attempts.fetch_add(1, Ordering::Relaxed);
        match self.parsers.parse(language, text) {
            Ok(tree) => tree,
            Err(e) => {
                log::warn!("{} parser unavailable: {e}", language.as_str());
                None
            }
        }
    }
}

/// Outermost matching constructs, skipping error subtrees
fn collect_declarations(root: Node, source: &[u8]) -> Vec<Declaration> {
    let mut declarations = Vec::new();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            continue;
        }

        if let Some(construct) = Construct::classify(node) {
            declarations.push(Declaration {
                start_byte: node.start_byte(),
                end_byte: node.end_byte(),
                chunk_type: construct.chunk_type(),
                symbol_name: construct.symbol(node, source),
            });
            continue;
        }

        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    declarations.sort_by_key(|d| (d.start_byte, d.end_byte));
    declarations
}

/// Total bytes covered by ERROR nodes
fn error_bytes(root: Node) -> usize {
    let mut total = 0;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() {
            total += node.end_byte() - node.start_byte();
            continue;
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }
    total
}

fn function_valued_declarator(node: Node) -> Option<Node> {
    let mut cursor = node.walk();
    let declarators: Vec<_> = node
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "variable_declarator")
        .collect();
    declarators.into_iter().find(|declarator| {
        declarator
            .child_by_field_name("value")
            .is_some_and(|value| FUNCTION_LIKE.contains(&value.kind()))
    })
}

fn exports_declaration(node: Node) -> bool {
    node.child_by_field_name("declaration").is_some()
        || node
            .child_by_field_name("value")
            .is_some_and(|value| FUNCTION_LIKE.contains(&value.kind()))
}

fn export_name(node: Node, source: &[u8]) -> Option<String> {
    if let Some(declaration) = node.child_by_field_name("declaration") {
        let name = match declaration.kind() {
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = declaration.walk();
                let first = declaration
                    .named_children(&mut cursor)
                    .find(|child| child.kind() == "variable_declarator");
                first.and_then(|declarator| field_text(declarator, "name", source))
            }
            _ => field_text(declaration, "name", source),
        };
        if name.is_some() {
            return name;
        }
    }

    node.child_by_field_name("value")
        .and_then(|value| field_text(value, "name", source))
        .or_else(|| Some("default".to_string()))
}

fn field_text(node: Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|child| child.utf8_text(source).ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declarations(code: &str, language: Language) -> Option<Vec<Declaration>> {
        let parsers = ParserPool::default();
        let attempts = AtomicUsize::new(0);
        AstAnalyzer::new(&parsers, &attempts).declarations(code, language)
    }

    fn kinds(decls: &[Declaration]) -> Vec<(ChunkType, Option<&str>)> {
        decls
            .iter()
            .map(|d| (d.chunk_type, d.symbol_name.as_deref()))
            .collect()
    }

    #[test]
    fn extracts_each_construct_kind() {
        let code = r"
function render() { return 1; }
class Widget { draw() {} }
const handler = (e) => e.target;
let plain = 42;
export function mount() {}
export default class {}
";
        let decls = declarations(code, Language::JavaScript).expect("parses");
        assert_eq!(
            kinds(&decls),
            vec![
                (ChunkType::Function, Some("render")),
                (ChunkType::Class, Some("Widget")),
                (ChunkType::Variable, Some("handler")),
                (ChunkType::Export, Some("mount")),
                (ChunkType::Export, Some("default")),
            ]
        );
    }

    #[test]
    fn nested_constructs_are_not_extracted_separately() {
        let code = "function outer() { function inner() {} class K {} }";
        let decls = declarations(code, Language::JavaScript).expect("parses");
        assert_eq!(kinds(&decls), vec![(ChunkType::Function, Some("outer"))]);
    }

    #[test]
    fn finds_declarations_inside_iife() {
        let code = "(function(){ function hidden(){ return 1 } })();";
        let decls = declarations(code, Language::JavaScript).expect("parses");
        assert_eq!(kinds(&decls), vec![(ChunkType::Function, Some("hidden"))]);
    }

    #[test]
    fn methods_in_object_literals_are_extracted() {
        let code = "window.api = { load() { return fetch('/x'); } };";
        let decls = declarations(code, Language::JavaScript).expect("parses");
        assert_eq!(kinds(&decls), vec![(ChunkType::Method, Some("load"))]);
    }

    #[test]
    fn typescript_uses_typescript_grammar() {
        let code = "export function sum(a: number, b: number): number { return a + b; }";
        let decls = declarations(code, Language::TypeScript).expect("parses");
        assert_eq!(kinds(&decls), vec![(ChunkType::Export, Some("sum"))]);
    }

    #[test]
    fn lenient_pass_skips_small_errors() {
        let code = "function ok() { return 1; }\nfunction alsoOk() { return 2; }\n)\nfunction third() { return 3; }\n";
        let decls = declarations(code, Language::JavaScript).expect("lenient parse");
        assert!(decls
            .iter()
            .any(|d| d.symbol_name.as_deref() == Some("ok")));
    }

    #[test]
    fn garbage_is_rejected() {
        let code = "}}}}}}}}}}}}}}}}}}}}}}}}}}}}}}}}}}}}}}}}";
        assert!(declarations(code, Language::JavaScript).is_none());
    }
}
