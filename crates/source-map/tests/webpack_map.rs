use insight_source_map::{map_reference, restore, MapReference, RestoreError};

const BUNDLE: &str = "(()=>{var e={};function t(){return 1}console.log(t())})();\n//# sourceMappingURL=main.js.map\n";

const MAP: &str = r#"{
  "version": 3,
  "file": "main.js",
  "sourceRoot": "",
  "sources": ["webpack:///./src/index.js", "webpack:///./src/util.js", "webpack:///webpack/bootstrap"],
  "sourcesContent": [
    "import { one } from './util';\nconsole.log(one());\n",
    "export function one() {\n  return 1;\n}\n",
    null
  ],
  "names": ["one", "console", "log"],
  "mappings": "CAAA,ECAA,YCAA;AFCA"
}"#;

#[test]
fn bundle_points_at_its_map() {
    assert_eq!(
        map_reference(BUNDLE),
        Some(MapReference::Url("main.js.map".to_string()))
    );
}

#[test]
fn webpack_map_restores_sources_with_content() {
    let restoration = restore(MAP.as_bytes()).expect("restores");
    let ids: Vec<_> = restoration
        .sources()
        .iter()
        .map(|s| s.original_file.as_str())
        .collect();
    assert_eq!(ids, vec!["webpack:///./src/index.js", "webpack:///./src/util.js"]);
    assert_eq!(restoration.missing(), &["webpack:///webpack/bootstrap".to_string()]);
    assert!(restoration.sources()[1].content.contains("export function one"));
}

#[test]
fn truncated_map_is_rejected() {
    let truncated = &MAP[..MAP.len() / 2];
    assert!(matches!(
        restore(truncated.as_bytes()),
        Err(RestoreError::Malformed(_))
    ));
}
