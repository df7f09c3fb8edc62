use crate::processor::FileProcessor;
use insight_protocol::{decode_request, serialize_json, Request, Response};
use std::io::{self, BufRead, Write};

/// Counts for one `serve` session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub requests: usize,
    pub malformed: usize,
    pub files: usize,
}

/// Answer requests read from `input`, one response line per request line,
/// until EOF. Each request is handled to completion before the next is read.
/// A malformed line gets an error response; the loop keeps going.
pub fn serve<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    processor: &FileProcessor,
) -> io::Result<ServeStats> {
    let mut stats = ServeStats::default();
    let mut raw = Vec::new();

    loop {
        raw.clear();
        if input.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&raw);
        if line.trim().is_empty() {
            continue;
        }
        stats.requests += 1;

        let response = match decode_request(&line) {
            Ok(Request::Ping) => Response::pong(),
            Ok(Request::Parse { files }) => {
                stats.files += files.len();
                Response::results(files.iter().map(|task| processor.process(task)).collect())
            }
            Err(e) => {
                stats.malformed += 1;
                log::warn!("Rejecting request line: {e:#}");
                Response::error(format!("{e:#}"))
            }
        };

        write_response(&mut output, &response)?;
    }

    log::debug!(
        "Worker input closed after {} requests ({} malformed, {} files)",
        stats.requests,
        stats.malformed,
        stats.files
    );
    Ok(stats)
}

fn write_response<W: Write>(output: &mut W, response: &Response) -> io::Result<()> {
    let line = serialize_json(response).unwrap_or_else(|e| {
        format!(
            r#"{{"status":"error","message":{}}}"#,
            serde_json::Value::String(format!("failed to encode response: {e}"))
        )
    });
    output.write_all(line.as_bytes())?;
    output.write_all(b"\n")?;
    output.flush()
}

/// Serve on the process's stdin/stdout. Logs must go to stderr.
pub fn run_stdio(processor: &FileProcessor) -> io::Result<ServeStats> {
    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    serve(stdin, stdout, processor)
}

/// Best-effort last words on stdout before the process becomes unusable
pub fn report_fatal(message: &str) {
    let mut stdout = io::stdout().lock();
    if let Err(e) = write_response(&mut stdout, &Response::error(message)) {
        log::error!("Failed to report fatal error: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_code_chunker::ChunkerConfig;
    use insight_protocol::decode_response;
    use std::io::Cursor;

    fn run(input: &str) -> (ServeStats, Vec<Response>) {
        let processor = FileProcessor::new(ChunkerConfig::default()).expect("valid config");
        let mut output = Vec::new();
        let stats = serve(Cursor::new(input.as_bytes().to_vec()), &mut output, &processor)
            .expect("serve");
        let responses = String::from_utf8(output)
            .expect("utf8 output")
            .lines()
            .map(|line| decode_response(line).expect("valid response"))
            .collect();
        (stats, responses)
    }

    #[test]
    fn ping_gets_pong() {
        let (stats, responses) = run("{\"command\":\"ping\"}\n");
        assert_eq!(stats.requests, 1);
        assert_eq!(responses, vec![Response::pong()]);
    }

    #[test]
    fn malformed_line_does_not_stop_the_loop() {
        let (stats, responses) = run("this is not json\n\n{\"command\":\"ping\"}\n{\"command\":\"nope\"}\n{\"command\":\"ping\"}");
        assert_eq!(stats.requests, 4);
        assert_eq!(stats.malformed, 2);
        assert_eq!(responses.len(), 4);
        assert!(matches!(responses[0], Response::Error { .. }));
        assert_eq!(responses[1], Response::pong());
        assert!(matches!(responses[2], Response::Error { .. }));
        assert_eq!(responses[3], Response::pong());
    }

    #[test]
    fn invalid_utf8_line_is_rejected_not_fatal() {
        let processor = FileProcessor::new(ChunkerConfig::default()).expect("valid config");
        let mut input = b"\xff\xfe\n".to_vec();
        input.extend_from_slice(b"{\"command\":\"ping\"}\n");
        let mut output = Vec::new();
        let stats = serve(Cursor::new(input), &mut output, &processor).expect("serve");
        assert_eq!(stats.malformed, 1);
        assert_eq!(String::from_utf8(output).expect("utf8").lines().count(), 2);
    }

    #[test]
    fn parse_reports_each_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = dir.path().join("good.js");
        std::fs::write(&good, "function a(){return 1}\nfunction b(){return 2}").expect("write");
        let request = format!(
            "{{\"command\":\"parse\",\"files\":[{{\"path\":{:?},\"mapPath\":\"\",\"url\":\"https://x/good.js\"}},{{\"path\":\"/nonexistent/bad.js\",\"url\":\"https://x/bad.js\"}}]}}\n",
            good.to_string_lossy()
        );

        let (stats, responses) = run(&request);
        assert_eq!(stats.files, 2);
        let Response::Success { results, .. } = &responses[0] else {
            panic!("expected success");
        };
        assert_eq!(results[0].url, "https://x/good.js");
        assert_eq!(results[0].chunk_count(), 2);
        assert_eq!(results[1].url, "https://x/bad.js");
        assert!(results[1].error.is_some());
    }
}
