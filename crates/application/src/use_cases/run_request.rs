//! Run request use case
//!
//! Sends a request to the active API environment and folds the streamed
//! command response into a [`TreeBuilder`]. Runs as a stage operation: a
//! preprocessor resolves constants and builds the [`StreamRequest`], a second
//! one applies the request's assignments, and a single stage opens and
//! consumes the stream.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use apixt_domain::{ContentTypeChoice, RequestAssignments, Settings, TreeBuilder, generate_id};
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::assignment_resolver::{AssignmentResolver, ResolvedAssignments, merge_body};
use crate::ports::{Clock, StreamFetcher, StreamRequest};
use crate::processor::{
    AbortHandle, Processed, Stage, StageContext, StageOperation, StageProcessor, StatusCallback,
};
use crate::stream::{StreamSummary, process_stream};
use crate::variable_resolver::VariableResolver;
use crate::{ApplicationError, ApplicationResult};

/// What to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequestInput {
    /// HTTP method.
    pub method: String,
    /// Path appended to the base URL; may reference constants.
    pub path: String,
    /// Request body; may reference constants.
    pub body: Option<String>,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// Base URL overriding the active API environment's.
    pub base_url: Option<String>,
    /// Assignments filling in query parameters, headers and body fields.
    pub assignments: RequestAssignments,
    /// Answers to `PROMPT` assignments, by parameter name.
    pub prompts: IndexMap<String, String>,
}

impl RunRequestInput {
    /// A `GET` of `path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.into(),
            body: None,
            headers: Vec::new(),
            base_url: None,
            assignments: RequestAssignments::default(),
            prompts: IndexMap::new(),
        }
    }

    /// A `POST` of `body` to `path`.
    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            body: Some(body.into()),
            ..Self::get(path)
        }
    }

    /// Sets the assignments.
    #[must_use]
    pub fn with_assignments(mut self, assignments: RequestAssignments) -> Self {
        self.assignments = assignments;
        self
    }

    /// Answers the prompt of the assignment `name`.
    #[must_use]
    pub fn prompt(mut self, name: impl Into<String>, answer: impl Into<String>) -> Self {
        self.prompts.insert(name.into(), answer.into());
        self
    }
}

/// Context of a running request.
pub struct RequestRun {
    /// Settings the request is resolved against.
    pub settings: Settings,
    /// The request as given.
    pub input: RunRequestInput,
    /// The request as sent, once resolved.
    pub request: Option<StreamRequest>,
    /// Constants referenced but not defined.
    pub unresolved: Vec<String>,
    /// What the assignments resolved to, if there were any.
    pub assignments: Option<ResolvedAssignments>,
    /// Builder receiving the response tree.
    pub builder: TreeBuilder,
    /// Outcome of the stream, once consumed.
    pub summary: Option<StreamSummary>,
}

/// Joins a base URL and a path, dropping one trailing `/` of the base.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    format!("{base}{path}")
}

/// Use case for running streamed requests.
///
/// Stream failures do not fail the operation: they are recorded in the
/// builder and in [`RequestRun::summary`]. The operation fails when the
/// request cannot be resolved and ends as cancelled when aborted.
pub struct RunRequest<F: StreamFetcher> {
    fetcher: Arc<F>,
    processor: StageProcessor,
}

impl<F: StreamFetcher + 'static> RunRequest<F> {
    /// Creates the use case over `fetcher`.
    pub fn new(fetcher: Arc<F>, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetcher,
            processor: StageProcessor::new(clock),
        }
    }

    /// Sets the receiver of stage status events.
    #[must_use]
    pub fn with_status(mut self, status: StatusCallback) -> Self {
        self.processor = self.processor.with_status(status);
        self
    }

    /// Starts the request; `builder` receives the response tree.
    pub fn start(
        &self,
        settings: Settings,
        input: RunRequestInput,
        builder: TreeBuilder,
    ) -> (AbortHandle, impl Future<Output = Processed<RequestRun>> + Send + 'static) {
        let run = RequestRun {
            settings,
            input,
            request: None,
            unresolved: Vec::new(),
            assignments: None,
            builder,
            summary: None,
        };
        let operation = StageOperation::new(generate_id(), run)
            .preprocessor(ResolveRequest)
            .preprocessor(ApplyAssignments)
            .stage(ConsumeStream {
                fetcher: Arc::clone(&self.fetcher),
            });
        self.processor.start(operation)
    }

    /// Runs the request to completion.
    pub async fn execute(
        &self,
        settings: Settings,
        input: RunRequestInput,
        builder: TreeBuilder,
    ) -> Processed<RequestRun> {
        self.start(settings, input, builder).1.await
    }
}

struct ResolveRequest;

#[async_trait]
impl Stage<RequestRun> for ResolveRequest {
    fn name(&self) -> &str {
        "resolve"
    }

    async fn run(&self, ctx: &mut StageContext<'_, RequestRun>) -> ApplicationResult<()> {
        let run = ctx.context();
        let settings = &run.settings;
        let base_url = run
            .input
            .base_url
            .clone()
            .or_else(|| settings.active_base_url())
            .ok_or_else(|| ApplicationError::NotFound("no active API environment".to_string()))?;

        let resolver =
            VariableResolver::for_env(&settings.constant_index(), settings.active_api_env.as_deref());
        let path = resolver.resolve(&run.input.path);
        let body = run.input.body.as_deref().map(|body| resolver.resolve(body));

        let mut unresolved = path.unresolved;
        for name in body.iter().flat_map(|body| &body.unresolved) {
            if !unresolved.contains(name) {
                unresolved.push(name.clone());
            }
        }

        let request = StreamRequest {
            method: run.input.method.to_uppercase(),
            url: join_url(&base_url, &path.resolved),
            query: Vec::new(),
            headers: run.input.headers.clone(),
            body: body.map(|body| body.resolved),
            expected_status: settings.stream.expected_status.clone(),
            timeout: Duration::from_millis(settings.stream.timeout_ms),
        };

        if !unresolved.is_empty() {
            warn!(unresolved = ?unresolved, "request references undefined constants");
            ctx.report(format!("unresolved constants: {}", unresolved.join(", ")));
        }
        info!(method = %request.method, url = %request.url, "request resolved");

        let run = ctx.context_mut();
        run.unresolved = unresolved;
        run.request = Some(request);
        Ok(())
    }
}

struct ApplyAssignments;

#[async_trait]
impl Stage<RequestRun> for ApplyAssignments {
    fn name(&self) -> &str {
        "assignments"
    }

    async fn run(&self, ctx: &mut StageContext<'_, RequestRun>) -> ApplicationResult<()> {
        let run = ctx.context();
        if run.input.assignments.is_empty() {
            return Ok(());
        }
        let constants = run.settings.constant_index();
        let resolved = AssignmentResolver::new(&constants, run.settings.active_api_env.as_deref(), &run.input.prompts)
            .resolve(&run.input.assignments);

        for reason in &resolved.skipped {
            warn!(%reason, "assignment skipped");
        }
        if !resolved.skipped.is_empty() {
            ctx.report(format!("skipped assignments: {}", resolved.skipped.join("; ")));
        }

        let run = ctx.context_mut();
        let request = run
            .request
            .as_mut()
            .ok_or_else(|| ApplicationError::Internal("request was not resolved".to_string()))?;

        request.query.extend(resolved.query.iter().cloned());
        for (name, value) in &resolved.headers {
            // headers given explicitly win
            if !request.headers.iter().any(|(given, _)| given.eq_ignore_ascii_case(name)) {
                request.headers.push((name.clone(), value.clone()));
            }
        }
        if resolved.content_type == Some(ContentTypeChoice::Raw) {
            if !resolved.body.is_empty() {
                warn!("raw body, body assignments not applied");
            }
        } else {
            let (body, merged) = merge_body(request.body.as_deref(), &resolved.body);
            if !merged {
                warn!("body is not a JSON object, body assignments not applied");
            }
            request.body = body;
        }

        for name in &resolved.unresolved {
            if !run.unresolved.contains(name) {
                run.unresolved.push(name.clone());
            }
        }
        info!(
            query = resolved.query.len(),
            headers = resolved.headers.len(),
            body = resolved.body.len(),
            "assignments applied"
        );
        run.assignments = Some(resolved);
        Ok(())
    }
}

struct ConsumeStream<F> {
    fetcher: Arc<F>,
}

#[async_trait]
impl<F: StreamFetcher> Stage<RequestRun> for ConsumeStream<F> {
    fn name(&self) -> &str {
        "stream"
    }

    async fn run(&self, ctx: &mut StageContext<'_, RequestRun>) -> ApplicationResult<()> {
        let request = ctx
            .context()
            .request
            .clone()
            .ok_or_else(|| ApplicationError::Internal("request was not resolved".to_string()))?;
        let mut cancel = ctx.cancellation();

        let run = ctx.context_mut();
        let summary = process_stream(&mut run.builder, self.fetcher.open(&request), &mut cancel).await;
        run.summary = Some(summary);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ChunkReader, StreamError};
    use crate::processor::{StageEvent, StagePhase};
    use crate::stream::tests::{ScriptedReader, wire};
    use apixt_domain::{Cmd, Command, Node, TreeState};
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::<Utc>::UNIX_EPOCH
        }
    }

    /// Records requests and serves a fixed body, or a status error.
    struct FakeFetcher {
        body: Vec<u8>,
        status: Option<u16>,
        sent: Mutex<Vec<StreamRequest>>,
    }

    impl FakeFetcher {
        fn serving(body: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                body,
                status: None,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn rejecting(status: u16) -> Arc<Self> {
            Arc::new(Self {
                body: Vec::new(),
                status: Some(status),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl StreamFetcher for FakeFetcher {
        async fn open(&self, request: &StreamRequest) -> Result<Box<dyn ChunkReader>, StreamError> {
            self.sent.lock().push(request.clone());
            if let Some(status) = self.status {
                return Err(StreamError::UnexpectedStatus(status));
            }
            Ok(Box::new(ScriptedReader::new(vec![self.body.clone()])))
        }
    }

    fn settings() -> Settings {
        serde_json::from_value(json!({
            "api_envs": {
                "dev": { "url": "http://localhost:8080/", "name": "Development" }
            },
            "active_api_env": "dev",
            "constants": {
                "c1": { "name": "tenant", "constValue": "acme", "envValues": { "dev": "acme-dev" } }
            },
            "stream": { "expected_status": [200, 202], "timeout_ms": 1500 }
        }))
        .unwrap()
    }

    fn response() -> Vec<u8> {
        wire(&[
            Command::new(Cmd::AddCodeBlock).field("name", "result"),
            Command::new(Cmd::End),
        ])
    }

    fn use_case(fetcher: &Arc<FakeFetcher>) -> RunRequest<FakeFetcher> {
        RunRequest::new(Arc::clone(fetcher), Arc::new(FixedClock))
    }

    #[test]
    fn join_url_drops_one_trailing_slash() {
        assert_eq!(join_url("http://host/", "/api"), "http://host/api");
        assert_eq!(join_url("http://host", "/api"), "http://host/api");
        assert_eq!(join_url("http://host//", "/api"), "http://host//api");
    }

    #[tokio::test]
    async fn resolves_constants_and_streams_the_tree() {
        let fetcher = FakeFetcher::serving(response());
        let input = RunRequestInput::post("/{{tenant}}/run", r#"{"tenant":"{{tenant}}"}"#);

        let processed = use_case(&fetcher).execute(settings(), input, TreeBuilder::new()).await;

        assert!(processed.result.is_ok());
        let sent = fetcher.sent.lock()[0].clone();
        assert_eq!(sent.method, "POST");
        assert_eq!(sent.url, "http://localhost:8080/acme-dev/run");
        assert_eq!(sent.body.as_deref(), Some(r#"{"tenant":"acme-dev"}"#));
        assert_eq!(sent.expected_status, vec![200, 202]);
        assert_eq!(sent.timeout, Duration::from_millis(1500));

        let run = processed.context;
        assert_eq!(run.builder.state(), TreeState::Finished);
        assert_eq!(run.summary.map(|s| s.lines), Some(2));
        let Some(Node::Root { nodes }) = run.builder.tree() else {
            panic!("expected a root");
        };
        assert_eq!(nodes[0].kind(), "code-block");
    }

    #[tokio::test]
    async fn unresolved_constants_are_left_verbatim() {
        let fetcher = FakeFetcher::serving(response());
        let input = RunRequestInput::get("/{{missing}}/{{tenant}}");

        let processed = use_case(&fetcher).execute(settings(), input, TreeBuilder::new()).await;

        assert_eq!(processed.context.unresolved, vec!["missing"]);
        assert_eq!(fetcher.sent.lock()[0].url, "http://localhost:8080/{{missing}}/acme-dev");
    }

    #[tokio::test]
    async fn base_url_override_wins() {
        let fetcher = FakeFetcher::serving(response());
        let mut input = RunRequestInput::get("/health");
        input.base_url = Some("https://staging.example.com".to_string());

        use_case(&fetcher).execute(settings(), input, TreeBuilder::new()).await;

        assert_eq!(fetcher.sent.lock()[0].url, "https://staging.example.com/health");
    }

    #[tokio::test]
    async fn missing_environment_fails_before_sending() {
        let fetcher = FakeFetcher::serving(response());

        let processed = use_case(&fetcher)
            .execute(Settings::default(), RunRequestInput::get("/"), TreeBuilder::new())
            .await;

        assert!(matches!(processed.result, Err(ApplicationError::NotFound(_))));
        assert!(fetcher.sent.lock().is_empty());
        assert_eq!(processed.context.builder.state(), TreeState::Waiting);
    }

    #[tokio::test]
    async fn rejected_status_is_recorded_in_the_tree() {
        let fetcher = FakeFetcher::rejecting(401);

        let processed = use_case(&fetcher)
            .execute(settings(), RunRequestInput::get("/"), TreeBuilder::new())
            .await;

        assert!(processed.result.is_ok());
        let run = processed.context;
        assert_eq!(run.builder.state(), TreeState::Errored);
        assert_eq!(run.builder.error(), Some("Unexpected HTTP response code 401 from API"));
    }

    #[tokio::test]
    async fn abort_before_start_cancels_the_operation() {
        let fetcher = FakeFetcher::serving(response());

        let (handle, running) = use_case(&fetcher).start(settings(), RunRequestInput::get("/"), TreeBuilder::new());
        handle.abort();
        let processed = running.await;

        assert!(matches!(processed.result, Err(ApplicationError::Cancelled)));
        assert!(fetcher.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn assignments_fill_in_query_headers_and_body() {
        let fetcher = FakeFetcher::serving(response());
        let assignments: RequestAssignments = serde_json::from_value(json!({
            "query": {
                "q": { "action": 5, "type": 1, "assignmentValue": "" },
                "page": { "action": 1, "type": 2, "assignmentValue": "2" }
            },
            "headers": {
                "X-Tenant": { "action": 1, "type": 1, "assignmentValue": "{{tenant}}" },
                "Accept": { "action": 1, "type": 1, "assignmentValue": "text/plain" },
                "X-Region": { "action": 4, "type": 1, "assignmentValue": "region" }
            },
            "body": {
                "tenant": { "action": 4, "type": 1, "assignmentValue": "c1" }
            }
        }))
        .unwrap();
        let mut input = RunRequestInput::post("/search", r#"{"limit":10}"#)
            .with_assignments(assignments)
            .prompt("q", "red shoes");
        input.headers.push(("accept".to_string(), "application/x-ndjson".to_string()));

        let processed = use_case(&fetcher).execute(settings(), input, TreeBuilder::new()).await;

        assert!(processed.result.is_ok());
        let sent = fetcher.sent.lock()[0].clone();
        assert_eq!(
            sent.query,
            vec![
                ("q".to_string(), "red shoes".to_string()),
                ("page".to_string(), "2".to_string())
            ]
        );
        assert_eq!(
            sent.headers,
            vec![
                ("accept".to_string(), "application/x-ndjson".to_string()),
                ("X-Tenant".to_string(), "acme-dev".to_string())
            ]
        );
        assert_eq!(sent.body.as_deref(), Some(r#"{"limit":10,"tenant":"acme-dev"}"#));
        assert_eq!(processed.context.unresolved, vec!["region"]);
        assert!(processed.context.assignments.is_some());
    }

    #[tokio::test]
    async fn unanswered_prompt_is_reported_and_skipped() {
        let fetcher = FakeFetcher::serving(response());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let assignments: RequestAssignments = serde_json::from_value(json!({
            "query": { "q": { "action": 5, "type": 1, "assignmentValue": "" } }
        }))
        .unwrap();

        let processed = use_case(&fetcher)
            .with_status(Arc::new(move |event: &StageEvent| sink.lock().push(event.clone())))
            .execute(settings(), RunRequestInput::get("/search").with_assignments(assignments), TreeBuilder::new())
            .await;

        assert!(processed.result.is_ok());
        assert!(fetcher.sent.lock()[0].query.is_empty());
        assert!(events.lock().iter().any(|event| event.stage == "assignments"
            && matches!(&event.phase, StagePhase::Progress(detail) if detail.contains("no answer to the prompt"))));
    }
}
