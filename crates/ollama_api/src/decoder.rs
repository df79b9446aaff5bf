use crate::payload::GenerateRecord;

/// Incremental decoder for the generation record stream.
///
/// Every chunk is decoded on its own: its text is split into lines and each
/// line is read as one or more concatenated JSON objects. Text that does not
/// parse is logged and dropped together with the rest of its line; nothing is
/// carried over into the next chunk. Decoding stops after the first record
/// with `done: true`.
#[derive(Debug, Default)]
pub struct RecordDecoder {
    finished: bool,
    skipped: usize,
}

impl RecordDecoder {
    /// Feed one chunk and drain the records it contains.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<GenerateRecord> {
        let mut records = Vec::new();
        if self.finished {
            return records;
        }

        let text = String::from_utf8_lossy(chunk);
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let values = serde_json::Deserializer::from_str(line).into_iter::<GenerateRecord>();
            for value in values {
                match value {
                    Ok(record) => {
                        let done = record.done;
                        records.push(record);
                        if done {
                            self.finished = true;
                            return records;
                        }
                    }
                    Err(error) => {
                        self.skipped += 1;
                        tracing::warn!(%error, chunk = line, "skipping malformed stream record");
                        break;
                    }
                }
            }
        }

        records
    }

    /// Decode a complete sequence of chunks in one shot.
    pub fn decode_chunks<I, B>(chunks: I) -> Vec<GenerateRecord>
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut decoder = Self::default();
        let mut records = Vec::new();
        for chunk in chunks {
            records.extend(decoder.feed(chunk.as_ref()));
            if decoder.is_finished() {
                break;
            }
        }
        records
    }

    /// True once a `done` record has been decoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of malformed fragments dropped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
