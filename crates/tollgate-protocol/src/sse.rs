use bytes::Bytes;

/// SSE end-of-stream sentinel emitted by completion APIs.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental line buffer for `text/event-stream` payloads.
///
/// Chunks arrive at arbitrary byte boundaries; lines are only cut at `\n`,
/// so multi-byte UTF-8 sequences split across chunks are reassembled before
/// decoding. Yields the payload of each `data:` line; comment lines, field
/// lines other than `data`, blank separators and the `[DONE]` sentinel are
/// dropped.
#[derive(Debug, Default)]
pub struct DataLineBuffer {
    pending: Vec<u8>,
}

impl DataLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) -> Vec<String> {
        self.push(chunk.as_ref())
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut payloads = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line[..line.len() - 1]) {
                payloads.push(payload);
            }
        }

        payloads
    }

    /// Flushes a trailing line that never received its newline.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.pending);
        data_payload(&rest).into_iter().collect()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let mut line = line;
    if line.ends_with(b"\r") {
        line = &line[..line.len() - 1];
    }
    if line.is_empty() || line[0] == b':' {
        return None;
    }

    let text = String::from_utf8_lossy(line);
    let value = text.strip_prefix("data:")?.trim_start();
    if value.is_empty() || value == DONE_SENTINEL {
        return None;
    }
    Some(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_data_lines_and_skips_noise() {
        let mut buffer = DataLineBuffer::new();
        let payloads = buffer.push(b": ping\nevent: delta\ndata: {\"a\":1}\n\ndata: [DONE]\n");
        assert_eq!(payloads, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn reassembles_lines_across_chunk_boundaries() {
        let mut buffer = DataLineBuffer::new();
        assert!(buffer.push(b"data: {\"tok").is_empty());
        let payloads = buffer.push(b"ens\":2}\n");
        assert_eq!(payloads, vec!["{\"tokens\":2}".to_string()]);
    }

    #[test]
    fn reassembles_utf8_split_mid_character() {
        let mut buffer = DataLineBuffer::new();
        let line = "data: {\"text\":\"héllo\"}\n".as_bytes();
        // Split inside the two-byte 'é' sequence.
        let split = line.iter().position(|b| *b == 0xc3).unwrap() + 1;
        assert!(buffer.push(&line[..split]).is_empty());
        let payloads = buffer.push(&line[split..]);
        assert_eq!(payloads, vec!["{\"text\":\"héllo\"}".to_string()]);
    }

    #[test]
    fn handles_crlf_line_endings() {
        let mut buffer = DataLineBuffer::new();
        let payloads = buffer.push(b"data: {\"a\":1}\r\ndata: {\"b\":2}\r\n");
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[1], "{\"b\":2}");
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut buffer = DataLineBuffer::new();
        assert!(buffer.push(b"data: {\"a\":1}").is_empty());
        assert_eq!(buffer.finish(), vec!["{\"a\":1}".to_string()]);
        assert!(buffer.finish().is_empty());
    }
}
