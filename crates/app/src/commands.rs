//! Subcommand implementations.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use apixt_application::{
    ApplicationError, CancellationToken, ChunkReader, RunRequest, RunRequestInput, StageEvent,
    StagePhase, StreamError, StreamSummary, process_stream,
};
use apixt_domain::{
    AssignmentListing, EntityIndex, EntityObject, EntityResult, Settings, TreeBuilder, TreeState,
    generate_id,
};
use apixt_infrastructure::{
    ReplayReader, ReqwestStreamFetcher, SettingsRepository, SystemClock,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cli::{ReplayArgs, SettingsCommand, StreamArgs};

/// Settings as loaded, with the environment overrides applied.
pub struct Loaded {
    pub repository: SettingsRepository,
    pub settings: Settings,
    pub base_url: Option<String>,
}

/// Applies `APIXT_TIMEOUT_MS` and reads `APIXT_BASE_URL`.
pub fn apply_env_overrides(settings: &mut Settings) -> anyhow::Result<Option<String>> {
    if let Ok(timeout) = std::env::var("APIXT_TIMEOUT_MS") {
        settings.stream.timeout_ms = timeout
            .parse()
            .with_context(|| format!("APIXT_TIMEOUT_MS must be a number of milliseconds, got {timeout:?}"))?;
    }
    Ok(std::env::var("APIXT_BASE_URL").ok().filter(|url| !url.is_empty()))
}

fn builder(watch: bool) -> TreeBuilder {
    let mut builder = TreeBuilder::new();
    if watch {
        builder.set_tree_setter(|tree| {
            if let Some(tree) = tree
                && let Ok(line) = serde_json::to_string(tree)
            {
                println!("{line}");
            }
        });
    }
    builder
}

/// Prints the final tree and turns a failed stream into an error.
fn report(builder: &TreeBuilder, summary: Option<&StreamSummary>) -> anyhow::Result<()> {
    let tree = builder.tree();
    println!("{}", serde_json::to_string_pretty(&tree)?);

    if let Some(summary) = summary {
        info!(state = ?summary.state, lines = summary.lines, bytes = summary.bytes, "done");
    }
    match builder.state() {
        TreeState::Errored => bail!("stream failed: {}", builder.error().unwrap_or("unknown error")),
        TreeState::Canceled => bail!("stream aborted"),
        TreeState::Streaming => {
            warn!("stream ended without an END command");
            Ok(())
        }
        TreeState::Waiting | TreeState::Finished => Ok(()),
    }
}

fn log_event(event: &StageEvent) {
    match &event.phase {
        StagePhase::Failed(message) => {
            warn!(op_id = %event.op_id, stage = %event.stage, error = %message, "stage failed");
        }
        StagePhase::Progress(detail) => {
            info!(op_id = %event.op_id, stage = %event.stage, "{detail}");
        }
        phase => debug!(op_id = %event.op_id, stage = %event.stage, ?phase, "stage event"),
    }
}

fn parse_header(header: &str) -> anyhow::Result<(String, String)> {
    let Some((name, value)) = header.split_once(':') else {
        bail!("header must look like \"Name: value\", got {header:?}");
    };
    Ok((name.trim().to_string(), value.trim().to_string()))
}

fn parse_prompt(prompt: &str) -> anyhow::Result<(String, String)> {
    let Some((name, answer)) = prompt.split_once('=') else {
        bail!("prompt answer must look like \"name=value\", got {prompt:?}");
    };
    Ok((name.trim().to_string(), answer.to_string()))
}

/// The request to send: the saved request if one is named, with the command
/// line options over it.
fn request_input(settings: &Settings, args: &StreamArgs) -> anyhow::Result<RunRequestInput> {
    let mut input = match &args.saved {
        Some(key) => {
            let requests = settings.request_index();
            let Some(index) = requests.find(key) else {
                bail!("unknown saved request {key:?}");
            };
            let Some(saved) = requests.saved_request(index) else {
                bail!("saved request {key:?} has no valid request");
            };
            RunRequestInput {
                method: saved.method,
                body: saved.body,
                ..RunRequestInput::get(saved.path)
            }
            .with_assignments(requests.assignments(index))
        }
        None => RunRequestInput::get(args.path.clone().unwrap_or_default()),
    };

    if let Some(path) = &args.path {
        input.path.clone_from(path);
    }
    if let Some(method) = &args.method {
        input.method.clone_from(method);
    }
    if let Some(data) = &args.data {
        input.body = Some(data.clone());
    }
    for header in &args.headers {
        input.headers.push(parse_header(header)?);
    }
    for prompt in &args.prompts {
        let (name, answer) = parse_prompt(prompt)?;
        input.prompts.insert(name, answer);
    }
    input.base_url.clone_from(&args.base_url);
    Ok(input)
}

/// `apixt stream`
pub async fn stream(loaded: Loaded, args: StreamArgs) -> anyhow::Result<()> {
    let mut input = request_input(&loaded.settings, &args)?;
    if input.base_url.is_none() {
        input.base_url = loaded.base_url;
    }

    let fetcher = Arc::new(ReqwestStreamFetcher::new()?);
    let use_case = RunRequest::new(fetcher, Arc::new(SystemClock::new())).with_status(Arc::new(log_event));
    let (handle, running) = use_case.start(loaded.settings, input, builder(args.watch));

    let abort = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, aborting");
            abort.abort();
        }
    });

    let processed = running.await;
    let run = processed.context;
    if !run.unresolved.is_empty() {
        warn!(constants = %run.unresolved.join(", "), "sent with unresolved constants");
    }
    match processed.result {
        Ok(()) => report(&run.builder, run.summary.as_ref()),
        Err(ApplicationError::Cancelled) => {
            report(&run.builder, run.summary.as_ref())?;
            bail!("request aborted")
        }
        Err(e) => Err(e.into()),
    }
}

/// `apixt replay`
pub async fn replay(loaded: Loaded, args: ReplayArgs) -> anyhow::Result<()> {
    let interval = args
        .interval_ms
        .unwrap_or(loaded.settings.stream.replay_interval_ms);
    let reader = ReplayReader::load(&args.file)
        .await
        .with_context(|| format!("cannot read {}", args.file.display()))?
        .with_interval(Duration::from_millis(interval));

    let (token, mut cancel) = CancellationToken::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let mut builder = builder(args.watch);
    let fetch = async move { Ok::<_, StreamError>(Box::new(reader) as Box<dyn ChunkReader>) };
    let summary = process_stream(&mut builder, fetch, &mut cancel).await;
    report(&builder, Some(&summary))
}

/// Upserts the mapping entry stored under `key`. Properties not given keep
/// their stored values.
fn upsert_keyed<I: EntityIndex>(index: &mut I, key: &str, props: Vec<(&str, Value)>) -> EntityResult<Option<usize>> {
    let existing = index.entity_by_prop_value("value", &Value::from(key));
    let mut object = match existing {
        Some(position) => {
            let mut object = index.entity_object(position).unwrap_or_default();
            object.index = Some(position);
            object.value = Some(Value::from(key));
            object
        }
        None => EntityObject::with_value(key),
    };
    for (name, value) in props {
        object = object.prop(name, value);
    }
    index.set_entity_object(object, existing.is_some())
}

fn set_constant(settings: &mut Settings, name: &str, value: &str, env: Option<&str>) -> EntityResult<()> {
    let mut constants = settings.constant_index();
    let position = match constants.entity_by_prop_value("name", &Value::from(name)) {
        Some(position) => position,
        None => {
            let object = EntityObject::with_value(generate_id()).prop("name", name);
            constants.set_entity_object(object, false)?.unwrap_or_default()
        }
    };

    match env {
        Some(env) => {
            let mut overrides = constants.overrides(position);
            upsert_keyed(&mut overrides, env, vec![("overrideValue", Value::from(value))])?;
            constants.set_overrides(position, overrides)?;
        }
        None => constants.set_entity_prop_value(position, "constValue", Some(Value::from(value)))?,
    }
    settings.constants = constants.into_model();
    Ok(())
}

/// `apixt settings ...`
pub async fn settings(loaded: Loaded, command: SettingsCommand) -> anyhow::Result<()> {
    let Loaded {
        repository,
        mut settings,
        ..
    } = loaded;

    match command {
        SettingsCommand::Show => {
            print!("{}", SettingsRepository::encode(&settings)?);
            return Ok(());
        }
        SettingsCommand::Path => {
            match repository.path() {
                Some(path) => println!("{}", path.display()),
                None => bail!("no config directory on this platform"),
            }
            return Ok(());
        }
        SettingsCommand::Env { key, url, name } => {
            let mut envs = settings.api_env_index();
            let mut props = vec![("url", Value::from(url))];
            if let Some(name) = name {
                props.push(("name", Value::from(name)));
            }
            upsert_keyed(&mut envs, &key, props)?;
            settings.api_envs = envs.into_model();
            if settings.active_api_env.is_none() {
                settings.active_api_env = Some(key);
            }
        }
        SettingsCommand::Requests { all } => {
            let listing = if all {
                AssignmentListing::All
            } else {
                AssignmentListing::NonDefault
            };
            let requests = settings.request_index();
            for (index, key) in requests.model().keys().enumerate() {
                let name = requests
                    .entity_prop_value(index, "name")
                    .and_then(|name| name.as_str().map(str::to_string))
                    .unwrap_or_default();
                match requests.saved_request(index) {
                    Some(saved) => println!("{key}\t{name}\t{} {}", saved.method, saved.path),
                    None => println!("{key}\t{name}\t<invalid request>"),
                }
                for (target, assignment) in requests.assignments(index).listed(listing) {
                    let action = assignment
                        .action
                        .map_or_else(|| "?".to_string(), |action| format!("{action:?}").to_uppercase());
                    println!("\t{target:?} {}: {action} {}", assignment.name, assignment.value);
                }
            }
            return Ok(());
        }
        SettingsCommand::Use { key } => {
            if settings.api_env_index().find(&key).is_none() {
                bail!("unknown API environment {key:?}");
            }
            settings.active_api_env = Some(key);
        }
        SettingsCommand::Const { name, value, env } => {
            set_constant(&mut settings, &name, &value, env.as_deref())?;
        }
        SettingsCommand::Bind { action, hot_key } => {
            let mut bindings = settings.key_binding_index();
            if let Some(previous) = bindings.assign(&action, &hot_key)? {
                info!(action = %previous, hot_key = %hot_key, "hot key taken from another action");
            }
            settings.key_bindings = bindings.into_model();
        }
        SettingsCommand::Theme { mode } => settings.theme = mode.into(),
    }

    repository.save(&settings).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn header_parsing() {
        assert_eq!(
            parse_header("Accept:  application/json ").unwrap(),
            ("Accept".to_string(), "application/json".to_string())
        );
        assert!(parse_header("no colon").is_err());
    }

    fn saved_settings() -> Settings {
        serde_json::from_value(serde_json::json!({
            "requests": {
                "r1": {
                    "name": "Search",
                    "request": { "method": "POST", "path": "/search", "body": "{}" },
                    "assignments": {
                        "query": { "q": { "action": 5, "type": 1, "assignmentValue": "" } }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn saved_request_is_loaded_and_overridden() {
        let args = StreamArgs {
            saved: Some("Search".to_string()),
            method: Some("PUT".to_string()),
            prompts: vec!["q=red=shoes".to_string()],
            ..StreamArgs::default()
        };

        let input = request_input(&saved_settings(), &args).unwrap();

        assert_eq!(input.method, "PUT");
        assert_eq!(input.path, "/search");
        assert_eq!(input.body.as_deref(), Some("{}"));
        assert_eq!(input.assignments.query.len(), 1);
        assert_eq!(input.prompts.get("q").map(String::as_str), Some("red=shoes"));
    }

    #[test]
    fn plain_path_and_unknown_saved_request() {
        let args = StreamArgs {
            path: Some("/health".to_string()),
            ..StreamArgs::default()
        };
        let input = request_input(&Settings::default(), &args).unwrap();
        assert_eq!((input.method.as_str(), input.path.as_str()), ("GET", "/health"));
        assert!(input.assignments.is_empty());

        let args = StreamArgs {
            saved: Some("nope".to_string()),
            ..StreamArgs::default()
        };
        assert!(request_input(&saved_settings(), &args).is_err());
        assert!(parse_prompt("no equals").is_err());
    }

    #[test]
    fn constants_are_created_then_overridden() {
        let mut settings = Settings::default();

        set_constant(&mut settings, "tenant", "acme", None).unwrap();
        set_constant(&mut settings, "tenant", "acme-dev", Some("dev")).unwrap();
        set_constant(&mut settings, "tenant", "acme-qa", Some("dev")).unwrap();

        let constants = settings.constant_index();
        assert_eq!(settings.constants.len(), 1);
        assert_eq!(constants.resolve("tenant", None).as_deref(), Some("acme"));
        assert_eq!(constants.resolve("tenant", Some("dev")).as_deref(), Some("acme-qa"));
    }

    #[test]
    fn keyed_upsert_updates_in_place() {
        let mut envs = Settings::default().api_env_index();

        upsert_keyed(
            &mut envs,
            "dev",
            vec![("url", Value::from("http://a")), ("name", Value::from("Development"))],
        )
        .unwrap();
        upsert_keyed(&mut envs, "dev", vec![("url", Value::from("http://b"))]).unwrap();

        assert_eq!(envs.model().len(), 1);
        assert_eq!(envs.url("dev").as_deref(), Some("http://b"));
        assert_eq!(envs.display_name("dev"), "Development");
    }
}
