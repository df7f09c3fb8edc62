use insight_code_chunker::{ChunkType, Chunker, ChunkerConfig, CodeChunk};
use pretty_assertions::assert_eq;

const APP: &str = include_str!("fixtures/app.js");

fn chunk(code: &str, path: &str) -> Vec<CodeChunk> {
    let chunker = Chunker::new(ChunkerConfig::default()).expect("valid config");
    chunker.chunk(code, path)
}

#[test]
fn fixture_splits_into_declarations_and_gaps() {
    let chunks = chunk(APP, "static/app.js");
    let layout: Vec<_> = chunks
        .iter()
        .map(|c| {
            (
                c.metadata.chunk_type,
                c.metadata.symbol_name.as_deref(),
                c.start_line,
                c.end_line,
            )
        })
        .collect();

    assert_eq!(
        layout,
        vec![
            (ChunkType::Gap, None, 1, 8),
            (ChunkType::Export, Some("reducer"), 10, 21),
            (ChunkType::Class, Some("TodoList"), 23, 39),
            (ChunkType::Variable, Some("fetchItems"), 41, 47),
            (ChunkType::Gap, None, 49, 55),
        ]
    );
}

#[test]
fn fixture_chunks_reconstruct_the_file() {
    let chunks = chunk(APP, "static/app.js");
    let joined: String = chunks.iter().map(|c| c.content.as_str()).collect();
    let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    assert_eq!(strip(&joined), strip(APP));
}

#[test]
fn chunk_file_reads_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.js");
    std::fs::write(&path, APP).expect("write fixture");

    let chunker = Chunker::default();
    let chunks = chunker.chunk_file(&path).expect("chunk file");
    assert_eq!(chunks.len(), 5);
    assert!(chunks[0].file_path.ends_with("app.js"));
}

#[test]
fn minified_bundle_is_bounded_and_covered() {
    let modules: String = (0..300)
        .map(|i| format!("function m{i}(e,t){{return e+t*{i}}}var k{i}=m{i}(1,2);"))
        .collect();
    let bundle = format!("!function(){{{modules}}}();");
    let chunks = chunk(&bundle, "vendor.min.js");

    assert!(chunks.len() > 1);
    assert!(chunks.iter().all(|c| c.content.len() <= 4000));
    let mut offset = 0;
    for chunk in &chunks {
        let start = chunk.char_start.expect("minified chunks carry offsets");
        assert!(bundle[offset..start].trim().is_empty(), "gap before {start}");
        offset = chunk.char_end.expect("minified chunks carry offsets");
    }
    assert!(bundle[offset..].trim().is_empty());
}

#[test]
fn typescript_source_is_chunked_with_its_grammar() {
    let code = "interface Props { name: string }\n\nexport class Greeter {\n  greet(p: Props): string { return `hi ${p.name}`; }\n}\n";
    let chunks = chunk(code, "webpack:///src/greeter.ts");

    assert!(chunks
        .iter()
        .any(|c| c.metadata.chunk_type == ChunkType::Export
            && c.metadata.symbol_name.as_deref() == Some("Greeter")));
    assert!(chunks
        .iter()
        .all(|c| c.metadata.language.as_deref() == Some("typescript")));
}
