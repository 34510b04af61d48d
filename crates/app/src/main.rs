use std::fmt;
use std::io::{BufRead, Write};
use std::sync::Arc;

use services::{
    Clock, CommitMode, HttpRemote, RemoteConfig, SessionConfig, SubmitOutcome, SurveySession,
    SurveySessionService,
};
use storage::repository::Storage;
use survey_core::model::{
    AnswerValue, QuestionType, RespondentId, Step, SurveyDefinitionDraft, SurveyId,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidId { flag: &'static str, raw: String },
    Required { flag: &'static str },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw:?}"),
            ArgsError::Required { flag } => write!(f, "{flag} is required for this command"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_id<T: std::str::FromStr>(flag: &'static str, raw: String) -> Result<T, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidId { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- take      [--db <sqlite_url>] --survey <id> --respondent <token> [--definition <file.json>]");
    eprintln!("  cargo run -p app -- import    [--db <sqlite_url>] --definition <file.json>");
    eprintln!("  cargo run -p app -- responses [--db <sqlite_url>] --survey <id>");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:survey.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SURVEY_DB_URL, SURVEY_ID, SURVEY_RESPONDENT");
    eprintln!("  SURVEY_DEBOUNCE_MS, SURVEY_COMPLETED_GRACE_MS, SURVEY_PREVIEW");
    eprintln!("  SURVEY_API_BASE_URL, SURVEY_API_TOKEN  # remote responses instead of SQLite");
    eprintln!("  RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Take,
    Import,
    Responses,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "take" => Some(Self::Take),
            "import" => Some(Self::Import),
            "responses" => Some(Self::Responses),
            _ => None,
        }
    }
}

struct Args {
    database: Database,
    survey_id: Option<SurveyId>,
    respondent_id: Option<RespondentId>,
    definition: Option<std::path::PathBuf>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let env = |var: &str| {
            std::env::var(var)
                .ok()
                .filter(|value| !value.trim().is_empty())
        };
        let mut database = Database::parse(
            env("SURVEY_DB_URL")
                .as_deref()
                .unwrap_or("survey.sqlite3"),
        )?;
        let mut survey_id = env("SURVEY_ID")
            .map(|raw| parse_id("SURVEY_ID", raw))
            .transpose()?;
        let mut respondent_id = env("SURVEY_RESPONDENT")
            .map(|raw| parse_id("SURVEY_RESPONDENT", raw))
            .transpose()?;
        let mut definition = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    database = Database::parse(&require_value(args, "--db")?)?;
                }
                "--survey" => {
                    survey_id = Some(parse_id("--survey", require_value(args, "--survey")?)?);
                }
                "--respondent" => {
                    respondent_id = Some(parse_id(
                        "--respondent",
                        require_value(args, "--respondent")?,
                    )?);
                }
                "--definition" => {
                    definition = Some(require_value(args, "--definition")?.into());
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            database,
            survey_id,
            respondent_id,
            definition,
        })
    }
}

/// Where the SQLite adapter keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Database {
    /// `sqlite::memory:` or a `sqlite:file:…?mode=memory` URL, passed through.
    InMemory(String),
    File(std::path::PathBuf),
}

impl Database {
    /// Accepts a URL (`sqlite://path`, `sqlite:path`) or a bare file path.
    /// Relative paths are anchored at the working directory.
    fn parse(raw: &str) -> Result<Self, ArgsError> {
        let raw = raw.trim();
        let shared_memory = raw.starts_with("sqlite:file:") && raw.contains("mode=memory");
        if raw == "sqlite::memory:" || shared_memory {
            return Ok(Self::InMemory(raw.to_string()));
        }

        let path = raw
            .strip_prefix("sqlite://")
            .or_else(|| raw.strip_prefix("sqlite:"))
            .unwrap_or(raw);
        let path = path.split('?').next().unwrap_or_default();
        if path.is_empty() {
            return Err(ArgsError::InvalidDbUrl { raw: raw.to_string() });
        }

        let path = std::path::Path::new(path);
        if path.is_absolute() {
            return Ok(Self::File(path.to_path_buf()));
        }
        let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
        Ok(Self::File(cwd.join(path)))
    }

    fn url(&self) -> String {
        match self {
            Self::InMemory(url) => url.clone(),
            Self::File(path) => format!("sqlite://{}", path.display()),
        }
    }

    /// sqlx refuses to open a file that does not exist yet.
    fn ensure_file(&self) -> std::io::Result<()> {
        let Self::File(path) = self else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(drop)
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "app=info,services=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn import_definition(
    service: &SurveySessionService,
    path: &std::path::Path,
) -> Result<SurveyId, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let draft: SurveyDefinitionDraft = serde_json::from_str(&raw)?;
    let definition = service.import(draft).await?;
    Ok(definition.id().clone())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // No subcommand means `take`.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Take,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Take,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let parsed = Args::parse(&mut argv.into_iter()).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing();

    parsed.database.ensure_file()?;
    let storage = Storage::sqlite(&parsed.database.url()).await?;
    let mut service = SurveySessionService::new(Clock::system(), &storage)
        .with_config(SessionConfig::from_env()?);
    if let Some(remote) = RemoteConfig::from_env()? {
        tracing::info!(base_url = %remote.base_url, "using remote response endpoints");
        service = service.with_remote(Arc::new(HttpRemote::new(remote)));
    }

    match cmd {
        Command::Import => {
            let path = parsed
                .definition
                .ok_or(ArgsError::Required { flag: "--definition" })?;
            let id = import_definition(&service, &path).await?;
            println!("imported survey {id}");
            Ok(())
        }
        Command::Responses => {
            let survey_id = parsed
                .survey_id
                .ok_or(ArgsError::Required { flag: "--survey" })?;
            for response in service.responses(&survey_id).await? {
                println!("{}", serde_json::to_string(&response)?);
            }
            Ok(())
        }
        Command::Take => {
            let survey_id = match (&parsed.definition, parsed.survey_id) {
                (Some(path), _) => import_definition(&service, path).await?,
                (None, Some(id)) => id,
                (None, None) => return Err(ArgsError::Required { flag: "--survey" }.into()),
            };
            let respondent_id = parsed
                .respondent_id
                .ok_or(ArgsError::Required { flag: "--respondent" })?;
            let mut session = service.open(&survey_id, respondent_id).await?;
            take(&mut session).await?;
            session.settle().await;
            Ok(())
        }
    }
}

//
// ─── TERMINAL HOST ─────────────────────────────────────────────────────────────
//

fn prompt(label: &str) -> std::io::Result<Option<String>> {
    print!("{label}> ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn hint(kind: &QuestionType) -> String {
    match kind {
        QuestionType::Text { .. } => "free text".into(),
        QuestionType::Choice { options } => format!("one of: {}", options.join(" | ")),
        QuestionType::MultiChoice { options } => {
            format!("comma separated, from: {}", options.join(" | "))
        }
        QuestionType::Scale { min, max } => format!("{min}..={max}"),
        QuestionType::Date => "YYYY-MM-DD".into(),
        QuestionType::File => "file reference".into(),
    }
}

fn report(outcome: &SubmitOutcome) {
    match outcome {
        SubmitOutcome::Submitted {
            response_id,
            missing_required,
        } => {
            println!("Submitted as {response_id}.");
            if !missing_required.is_empty() {
                println!("({} required questions left blank)", missing_required.len());
            }
        }
        SubmitOutcome::AlreadySubmitted { response_id } => {
            println!("Already submitted as {response_id}.");
        }
        SubmitOutcome::Failed { reason } => println!("Submission failed: {reason}"),
        SubmitOutcome::Preview { payload } => {
            println!("Preview only, {} answers not sent.", payload.responses.len());
        }
    }
}

fn describe(session: &SurveySession) {
    match session.step() {
        Step::Welcome => println!("Press enter to begin."),
        Step::Section(id) => {
            if let Some(section) = session.definition().section(id) {
                println!("== {} ==", section.name);
            }
        }
        Step::Question(id) => {
            if let Some(question) = session.definition().question(id) {
                let marker = if question.required { "*" } else { "" };
                println!("{}{marker} ({})", question.title, hint(&question.kind));
                if let Some(answer) = session.state().answer(id) {
                    println!("  current: {}", answer.display_text());
                }
            }
        }
        Step::ThankYou => println!("Thank you. `:r` starts over, `:q` quits."),
    }
}

/// Drive one session from stdin. `:b` goes back, `:s` submits, `:r`
/// restarts, `:q` quits; an empty line on a question leaves it blank.
async fn take(session: &mut SurveySession) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", session.definition().title());
    loop {
        describe(session);
        let progress = session.progress();
        let label = format!(
            "[{}/{} {:.0}%]",
            progress.current_step, progress.total_steps, progress.percent
        );
        let step = session.step().clone();

        let Some(line) = prompt(&label)? else {
            return Ok(());
        };
        match line.trim() {
            ":q" => return Ok(()),
            ":r" => {
                session.on_restart().await;
                continue;
            }
            ":b" => {
                session.on_back().await;
                continue;
            }
            ":s" => {
                match session.on_submit().await {
                    Ok(outcome) => report(&outcome),
                    Err(err) => println!("{err}"),
                }
                continue;
            }
            _ => {}
        }

        match step {
            Step::Welcome => {
                session.on_start().await;
            }
            Step::Section(id) => {
                session.on_section_continue(&id).await?;
            }
            Step::Question(id) => {
                let Some(question) = session.definition().question(&id).cloned() else {
                    continue;
                };
                let answer = match AnswerValue::from_input(&question.kind, &line) {
                    Ok(Some(answer)) => answer,
                    Ok(None) => AnswerValue::Text(String::new()),
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                match session
                    .on_question_answer(&id, answer, CommitMode::Navigate)
                    .await
                {
                    Ok(Step::ThankYou) => {
                        if let Some(reason) = session.last_submit_error() {
                            println!("Submission failed: {reason}");
                        } else if let Some(response_id) = session.response_id() {
                            println!("Submitted as {response_id}.");
                        }
                    }
                    Ok(_) => {}
                    Err(err) => println!("{err}"),
                }
            }
            Step::ThankYou => {}
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_memory_urls_pass_through() {
        for raw in ["sqlite::memory:", "sqlite:file:memdb_take?mode=memory&cache=shared"] {
            let db = Database::parse(raw).unwrap();
            assert_eq!(db, Database::InMemory(raw.to_string()));
            assert_eq!(db.url(), raw);
        }
    }

    #[test]
    fn file_urls_and_bare_paths_become_absolute() {
        let db = Database::parse("sqlite:///var/lib/survey.db?mode=rwc").unwrap();
        assert_eq!(db, Database::File("/var/lib/survey.db".into()));
        assert_eq!(db.url(), "sqlite:///var/lib/survey.db");

        let Database::File(path) = Database::parse("data/survey.sqlite3").unwrap() else {
            panic!("expected a file database");
        };
        assert!(path.is_absolute());
        assert!(path.ends_with("data/survey.sqlite3"));
    }

    #[test]
    fn empty_paths_are_rejected() {
        for raw in ["", "  ", "sqlite://", "sqlite:?mode=rwc"] {
            assert!(matches!(
                Database::parse(raw),
                Err(ArgsError::InvalidDbUrl { .. })
            ));
        }
    }
}
