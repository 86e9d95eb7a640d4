//! @ai:module:intent Worker-to-caller wire protocol: one JSON message per line
//! @ai:module:layer infrastructure
//! @ai:module:public_api EventSink, WorkFailure
//! @ai:module:stateless false

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;

/// @ai:intent A failure the work reports instead of crashing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkFailure {
    pub stage: String,
    pub message: String,
}

impl WorkFailure {
    pub fn new(stage: impl Into<String>, message: impl ToString) -> Self {
        Self {
            stage: stage.into(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for WorkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// Frames on the channel. `Done` is the completion sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub(crate) enum WireMessage<P, R> {
    Progress(P),
    Result(R),
    Failed(WorkFailure),
    Done,
}

pub(crate) fn encode<P: Serialize, R: Serialize>(message: &WireMessage<P, R>) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

pub(crate) fn decode<P: DeserializeOwned, R: DeserializeOwned>(
    line: &str,
) -> Result<WireMessage<P, R>, serde_json::Error> {
    serde_json::from_str(line)
}

/// @ai:intent Worker-side end of the channel handed to the unit of work
///
/// Every message is flushed before `progress`/`result` return, so the caller
/// sees it even if the worker dies right after.
pub struct EventSink<P, R> {
    writer: BufWriter<File>,
    _events: PhantomData<fn(P, R)>,
}

impl<P: Serialize, R: Serialize> EventSink<P, R> {
    pub(crate) fn new(file: File) -> Self {
        Self {
            writer: BufWriter::new(file),
            _events: PhantomData,
        }
    }

    /// @ai:intent Stream an intermediate progress payload
    /// @ai:effects ipc:write
    pub fn progress(&mut self, payload: P) -> Result<(), WorkFailure> {
        self.send(&WireMessage::Progress(payload))
    }

    /// @ai:intent Stream a result payload
    /// @ai:effects ipc:write
    pub fn result(&mut self, payload: R) -> Result<(), WorkFailure> {
        self.send(&WireMessage::Result(payload))
    }

    pub(crate) fn send(&mut self, message: &WireMessage<P, R>) -> Result<(), WorkFailure> {
        let line = encode(message).map_err(|e| WorkFailure::new("channel", e))?;
        writeln!(self.writer, "{line}")
            .and_then(|_| self.writer.flush())
            .map_err(|e| WorkFailure::new("channel", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Seek, SeekFrom};

    #[test]
    fn test_messages_are_single_json_lines() {
        let line = encode::<String, u32>(&WireMessage::Progress("line one\nline two".to_string())).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(line, r#"{"type":"progress","payload":"line one\nline two"}"#);

        let done = encode::<(), ()>(&WireMessage::Done).unwrap();
        assert_eq!(done, r#"{"type":"done"}"#);
        assert_eq!(decode::<(), ()>(&done).unwrap(), WireMessage::Done);
    }

    #[test]
    fn test_sink_writes_in_order() {
        let mut file = tempfile::tempfile().unwrap();
        let mut sink: EventSink<String, u32> = EventSink::new(file.try_clone().unwrap());

        sink.progress("a".to_string()).unwrap();
        sink.result(7).unwrap();
        sink.send(&WireMessage::Done).unwrap();

        file.seek(SeekFrom::Start(0)).unwrap();
        let decoded: Vec<WireMessage<String, u32>> = BufReader::new(file)
            .lines()
            .map(|line| decode(&line.unwrap()).unwrap())
            .collect();

        assert_eq!(
            decoded,
            vec![
                WireMessage::Progress("a".to_string()),
                WireMessage::Result(7),
                WireMessage::Done
            ]
        );
    }

    #[test]
    fn test_unreadable_line_is_an_error() {
        assert!(decode::<String, u32>("{\"type\":\"progr").is_err());
        assert!(decode::<String, u32>(r#"{"type":"result","payload":"not a number"}"#).is_err());
    }
}
