//! sealctl binary entrypoint.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use seal_attest::{AttestError, ContentHasher, RecordStore, SoftwareHasher, Stage};
use seal_cli::cli::{Cli, Commands};
use seal_cli::commands::{AttestCommand, IdentityCommand, QueryCommand, VerifyCommand};
use seal_cli::config::SealConfig;
use seal_cli::element::open_session;
use seal_cli::output::OutputFormat;
use seal_cli::CliError;
use seal_element::{BoxedKeyStore, ElementSession};
use seal_ledger::HttpLedger;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("SEAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = SealConfig::resolve(&cli)?;
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    let ledger = HttpLedger::new(&config.ledger_url, config.request_timeout())
        .map_err(|e| CliError::Config(format!("cannot create ledger client: {e}")))?
        .with_search_limit(config.search_limit);
    let url = config.ledger_url.clone();

    match cli.command {
        Commands::Identity { command } => {
            let records = open_records(&config)?;
            let session = Arc::new(open_session(&config)?);
            let cmd = IdentityCommand::new(
                Arc::clone(&session),
                ledger,
                records,
                config.machine.clone(),
                &url,
            );
            let result = cmd.execute(&mut stdout, &format, &command).await;
            release(&session, result)?;
        }
        Commands::Attest(args) => {
            let records = open_records(&config)?;
            let session = Arc::new(open_session(&config)?);
            let cmd = AttestCommand::new(Arc::clone(&session), ledger, records, &url);
            let result = cmd.execute(&mut stdout, &format, &args).await;
            release(&session, result)?;
        }
        Commands::Query { subject } => {
            let cmd = QueryCommand::new(ledger, &url);
            cmd.query(&mut stdout, &format, &subject).await?;
        }
        Commands::Lookup { public_key } => {
            let cmd = QueryCommand::new(ledger, &url);
            cmd.lookup(&mut stdout, &format, &public_key).await?;
        }
        Commands::Verify { tx_id } => {
            let records = open_records(&config)?;
            let (session, hasher) = verification_hasher(&config, cli.software_hash);
            let cmd = VerifyCommand::new(ledger, records, hasher, config.check_concurrency, &url);
            let result = cmd.verify(&mut stdout, &format, &tx_id).await;
            release_optional(session.as_deref(), result)?;
        }
        Commands::Check => {
            let records = open_records(&config)?;
            let (session, hasher) = verification_hasher(&config, cli.software_hash);
            let cmd = VerifyCommand::new(ledger, records, hasher, config.check_concurrency, &url);
            let result = cmd.check(&mut stdout, &format).await;
            release_optional(session.as_deref(), result)?;
        }
    }

    Ok(())
}

type Session = ElementSession<BoxedKeyStore>;

fn open_records(config: &SealConfig) -> Result<RecordStore, CliError> {
    RecordStore::open(&config.database_dir).map_err(|source| {
        CliError::Attest(AttestError::Store {
            stage: Stage::Load,
            source,
        })
    })
}

/// Hash on the element when it can be opened, else in software.
fn verification_hasher(
    config: &SealConfig,
    software: bool,
) -> (Option<Arc<Session>>, Box<dyn ContentHasher>) {
    if software {
        return (None, Box::new(SoftwareHasher));
    }
    match open_session(config) {
        Ok(session) => {
            let session = Arc::new(session);
            let hasher: Box<dyn ContentHasher> = Box::new(Arc::clone(&session));
            (Some(session), hasher)
        }
        Err(e) => {
            warn!(error = %e, "secure element unavailable, recomputing hashes in software");
            (None, Box::new(SoftwareHasher))
        }
    }
}

/// Close the element after a command. The command's own error wins.
fn release<T>(session: &Session, result: Result<T, CliError>) -> Result<T, CliError> {
    let closed = session.close();
    let value = result?;
    closed?;
    Ok(value)
}

fn release_optional<T>(session: Option<&Session>, result: Result<T, CliError>) -> Result<T, CliError> {
    match session {
        Some(session) => release(session, result),
        None => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seal_cli::cli::{Format, IdentityCommands};

    #[test]
    fn cli_parses_identity_create() {
        let cli = Cli::parse_from(["sealctl", "identity", "create", "-n", "press-4", "--force"]);
        match cli.command {
            Commands::Identity {
                command:
                    IdentityCommands::Create {
                        name,
                        force,
                        no_register,
                    },
            } => {
                assert_eq!(name, "press-4");
                assert!(force);
                assert!(!no_register);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_attest_with_metadata() {
        let cli = Cli::parse_from([
            "sealctl", "attest", "lot.json", "-s", "lot-1", "-m", "a=1", "-m", "b=x",
        ]);
        match cli.command {
            Commands::Attest(args) => {
                assert_eq!(args.subject.as_deref(), Some("lot-1"));
                assert_eq!(args.meta, vec!["a=1", "b=x"]);
                assert!(!args.allow_duplicate);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_verify_with_global_flags() {
        let cli = Cli::parse_from([
            "sealctl",
            "verify",
            "abc",
            "--format",
            "json",
            "--software-hash",
        ]);
        assert!(matches!(cli.command, Commands::Verify { ref tx_id } if tx_id == "abc"));
        assert_eq!(cli.format, Format::Json);
        assert!(cli.software_hash);
    }

    #[test]
    fn cli_parses_check() {
        let cli = Cli::parse_from(["sealctl", "check"]);
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["sealctl"]).is_err());
    }

    #[test]
    fn software_flag_skips_element() {
        let (session, hasher) = verification_hasher(&SealConfig::default(), true);
        assert!(session.is_none());
        assert_eq!(hasher.anchor(), seal_attest::HashAnchor::Software);
    }

    #[test]
    fn release_closes_and_keeps_command_error() {
        let session = open_session(&SealConfig::default()).expect("open");
        let result: Result<(), CliError> = release(&session, Err(CliError::Mismatch(1)));
        assert!(matches!(result, Err(CliError::Mismatch(1))));
        assert!(!session.is_open());
    }
}
