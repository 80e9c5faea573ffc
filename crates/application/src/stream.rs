//! Stream consumption
//!
//! Drives a [`TreeBuilder`] from a chunked response body. Whatever happens
//! (protocol violation, transport failure, cancellation) the call returns
//! normally: the outcome is recorded in the builder's state and error, and
//! summarized in a [`StreamSummary`].

use std::future::Future;

use apixt_domain::{LineFramer, TreeBuilder, TreeState};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ports::{CancellationReceiver, ChunkReader, StreamError};

/// Counters and final state of one consumed stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    /// Builder state after the stream.
    pub state: TreeState,
    /// Lines processed.
    pub lines: usize,
    /// Bytes received.
    pub bytes: usize,
    /// Captured error message, if the stream failed.
    pub error: Option<String>,
}

enum Ending {
    Exhausted,
    Cancelled,
}

/// Consumes the stream opened by `fetch` into `builder`.
///
/// Both the open and every read are raced against `cancel`; cancellation
/// aborts the builder and stops reading. A stream that already received
/// `END` finishes instead. Lines already read are always processed to
/// completion.
pub async fn process_stream<F>(builder: &mut TreeBuilder, fetch: F, cancel: &mut CancellationReceiver) -> StreamSummary
where
    F: Future<Output = Result<Box<dyn ChunkReader>, StreamError>> + Send,
{
    builder.start();
    let mut framer = LineFramer::new();
    let mut lines = 0;

    match consume(builder, &mut framer, &mut lines, fetch, cancel).await {
        Ok(Ending::Exhausted) => builder.finish(),
        Ok(Ending::Cancelled) => {
            if builder.abort() {
                info!(lines, "stream aborted");
            } else {
                builder.finish();
            }
        }
        Err(message) => {
            warn!(lines, error = %message, "stream failed");
            builder.fail(message);
        }
    }

    let summary = StreamSummary {
        state: builder.state(),
        lines,
        bytes: framer.bytes(),
        error: builder.error().map(str::to_string),
    };
    info!(state = ?summary.state, lines, bytes = summary.bytes, "stream processed");
    summary
}

async fn consume<F>(
    builder: &mut TreeBuilder,
    framer: &mut LineFramer,
    lines: &mut usize,
    fetch: F,
    cancel: &mut CancellationReceiver,
) -> Result<Ending, String>
where
    F: Future<Output = Result<Box<dyn ChunkReader>, StreamError>> + Send,
{
    let mut reader = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(Ending::Cancelled),
        reader = fetch => reader.map_err(|e| e.to_string())?,
    };

    loop {
        let chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(Ending::Cancelled),
            chunk = reader.read() => chunk.map_err(|e| e.to_string())?,
        };
        let Some(chunk) = chunk else {
            break;
        };
        debug!(bytes = chunk.len(), "chunk received");
        for line in framer.push(&chunk) {
            builder.process_line(&line).map_err(|e| e.to_string())?;
            *lines += 1;
        }
    }

    if let Some(line) = framer.finish() {
        builder.process_line(&line).map_err(|e| e.to_string())?;
        *lines += 1;
    }
    Ok(Ending::Exhausted)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ports::CancellationToken;
    use apixt_domain::{Cmd, Command, Node};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    /// Serves scripted chunks, then end of stream.
    pub(crate) struct ScriptedReader {
        chunks: VecDeque<Result<Vec<u8>, StreamError>>,
    }

    impl ScriptedReader {
        pub(crate) fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self {
                chunks: chunks.into_iter().map(Ok).collect(),
            }
        }

        fn failing_after(chunks: Vec<Vec<u8>>, error: StreamError) -> Self {
            let mut reader = Self::new(chunks);
            reader.chunks.push_back(Err(error));
            reader
        }
    }

    #[async_trait]
    impl ChunkReader for ScriptedReader {
        async fn read(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
            self.chunks.pop_front().transpose()
        }
    }

    pub(crate) fn wire(commands: &[Command]) -> Vec<u8> {
        commands.iter().map(Command::to_line).collect::<String>().into_bytes()
    }

    fn well_formed() -> Vec<u8> {
        wire(&[
            Command::new(Cmd::OpenSection).field("name", "A"),
            Command::new(Cmd::AddCodeBlock).field("name", "B").field("content", "Grüße"),
            Command::new(Cmd::CloseSection),
            Command::new(Cmd::End),
        ])
    }

    async fn run(reader: ScriptedReader) -> (TreeBuilder, StreamSummary) {
        let mut builder = TreeBuilder::new();
        let mut cancel = CancellationReceiver::never();
        let fetch = async move { Ok::<_, StreamError>(Box::new(reader) as Box<dyn ChunkReader>) };
        let summary = process_stream(&mut builder, fetch, &mut cancel).await;
        (builder, summary)
    }

    #[tokio::test]
    async fn well_formed_stream_finishes() {
        let (builder, summary) = run(ScriptedReader::new(vec![well_formed()])).await;

        assert_eq!(summary.state, TreeState::Finished);
        assert_eq!(summary.lines, 4);
        assert_eq!(summary.error, None);
        let Some(Node::Root { nodes }) = builder.tree() else {
            panic!("expected a root");
        };
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].kind(), "section");
        assert_eq!(nodes[0].children().unwrap()[0].kind(), "code-block");
    }

    #[tokio::test]
    async fn split_chunks_build_the_same_tree() {
        let bytes = well_formed();
        let (expected, _) = run(ScriptedReader::new(vec![bytes.clone()])).await;

        for at in 1..bytes.len() {
            let chunks = vec![bytes[..at].to_vec(), bytes[at..].to_vec()];
            let (builder, summary) = run(ScriptedReader::new(chunks)).await;
            assert_eq!(summary.state, TreeState::Finished, "split at {at}");
            assert_eq!(builder.tree(), expected.tree(), "split at {at}");
        }
    }

    #[tokio::test]
    async fn mismatched_close_errors_without_failing_the_call() {
        let bytes = wire(&[Command::new(Cmd::OpenSection), Command::new(Cmd::CloseSectionDetails)]);

        let (builder, summary) = run(ScriptedReader::new(vec![bytes])).await;

        assert_eq!(summary.state, TreeState::Errored);
        assert_eq!(
            builder.error(),
            Some("Type mismatch while adding: expected \"section-group\" but got \"section\"")
        );
    }

    #[tokio::test]
    async fn malformed_line_stops_processing() {
        let mut bytes = b"{\"cmd\":6,\"name\":\"B\"}\nnot json\n".to_vec();
        bytes.extend(wire(&[Command::new(Cmd::End)]));

        let (builder, summary) = run(ScriptedReader::new(vec![bytes])).await;

        assert_eq!(summary.state, TreeState::Errored);
        assert_eq!(summary.lines, 1);
        assert_eq!(builder.nodes().len(), 1);
        assert!(!builder.is_ended());
    }

    #[tokio::test]
    async fn unterminated_last_line_is_processed() {
        let mut bytes = well_formed();
        bytes.pop();

        let (_, summary) = run(ScriptedReader::new(vec![bytes])).await;

        assert_eq!(summary.state, TreeState::Finished);
        assert_eq!(summary.lines, 4);
    }

    #[tokio::test]
    async fn read_failure_is_captured() {
        let reader = ScriptedReader::failing_after(
            vec![wire(&[Command::new(Cmd::OpenSection)])],
            StreamError::Read("connection reset".into()),
        );

        let (builder, summary) = run(reader).await;

        assert_eq!(summary.state, TreeState::Errored);
        assert_eq!(builder.error(), Some("Stream read failed: connection reset"));
    }

    #[tokio::test]
    async fn failed_open_is_captured() {
        let mut builder = TreeBuilder::new();
        let mut cancel = CancellationReceiver::never();
        let fetch = async { Err::<Box<dyn ChunkReader>, _>(StreamError::UnexpectedStatus(401)) };

        let summary = process_stream(&mut builder, fetch, &mut cancel).await;

        assert_eq!(summary.state, TreeState::Errored);
        assert_eq!(summary.error.as_deref(), Some("Unexpected HTTP response code 401 from API"));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_builder() {
        let (token, mut cancel) = CancellationToken::new();
        let mut builder = TreeBuilder::new();
        let fetch = async {
            token.cancel();
            std::future::pending::<Result<Box<dyn ChunkReader>, StreamError>>().await
        };

        let summary = process_stream(&mut builder, fetch, &mut cancel).await;

        assert_eq!(summary.state, TreeState::Canceled);
        assert_eq!(
            builder.tree(),
            Some(Node::Root {
                nodes: vec![Node::Status {
                    status: "aborted".into()
                }]
            })
        );
    }

    /// Serves its chunks, then never yields again.
    struct StallingReader {
        chunks: VecDeque<Vec<u8>>,
        token: CancellationToken,
    }

    #[async_trait]
    impl ChunkReader for StallingReader {
        async fn read(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
            if let Some(chunk) = self.chunks.pop_front() {
                return Ok(Some(chunk));
            }
            self.token.cancel();
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancellation_after_end_finishes_the_builder() {
        let (token, mut cancel) = CancellationToken::new();
        let reader = StallingReader {
            chunks: VecDeque::from([wire(&[
                Command::new(Cmd::AddCodeBlock).field("name", "B"),
                Command::new(Cmd::End),
            ])]),
            token,
        };
        let mut builder = TreeBuilder::new();
        let fetch = async move { Ok::<_, StreamError>(Box::new(reader) as Box<dyn ChunkReader>) };

        let summary = process_stream(&mut builder, fetch, &mut cancel).await;

        assert_eq!(summary.state, TreeState::Finished);
        assert_eq!(summary.lines, 2);
        let Some(Node::Root { nodes }) = builder.tree() else {
            panic!("expected a root");
        };
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].kind(), "code-block");
    }
}
