//! CLI entry point for brivo-bulk. Drives the Brivo API for one member at a time.
//!
//! Credentials come from flags or, preferably, the `BRIVO_*` environment
//! variables. The OAuth token state is persisted as JSON in `--token-file`:
//! it is read before the command runs and written back afterwards, so a
//! refresh performed during the command is never lost.
//!
//! Typical first run:
//! 1. `brivo-bulk login-url`: open the printed URL and authorize.
//! 2. `brivo-bulk exchange-code <code>`: stores the token pair.
//! 3. `brivo-bulk healthcheck`: verifies credentials and connectivity.
//!
//! Exit codes:
//! - 0: success
//! - 1: runtime error (auth failure, API error, conflict, etc.)
//! - 2: argument validation error (clap handles this automatically)

use std::convert::Infallible;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use brivo_bulk::api::BrivoApi;
use brivo_bulk::auth::{Credentials, TokenState};
use brivo_bulk::directory::{CreateUserRequest, SuspendRequest};
use brivo_bulk::users::RemoteId;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Brivo developer API key.
    #[arg(long, env = "BRIVO_APIKEY", hide_env_values = true)]
    api_key: String,

    /// OAuth client id of the Brivo application.
    #[arg(long, env = "BRIVO_CLIENT_ID")]
    client_id: String,

    /// OAuth client secret. Prefer the BRIVO_CLIENT_SECRET environment
    /// variable to keep the secret out of process listings and shell history.
    #[arg(long, env = "BRIVO_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Redirect URI registered for the authorization-code flow.
    #[arg(long, env = "BRIVO_REDIRECT_URI")]
    redirect_uri: String,

    /// Where the OAuth token state is read from and saved to.
    #[arg(long, env = "BRIVO_TOKEN_FILE", default_value = "brivo-token.json")]
    token_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the URL that starts the OAuth authorization-code flow.
    LoginUrl,

    /// Exchange an authorization code for a token pair and save it.
    ExchangeCode {
        /// The `code` query parameter Brivo redirected back with.
        code: String,
    },

    /// Refresh the saved token pair.
    Refresh,

    /// Check connectivity and credentials with an authenticated probe.
    Healthcheck,

    /// Create a member, or reset and reuse the existing one with the same
    /// member id and name.
    CreateUser {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        member_id: String,
        /// Comma-separated group names.
        #[arg(long, value_delimiter = ',')]
        groups: Vec<String>,
        /// Card number printed on the credential (requires --facility-code).
        #[arg(long)]
        card_number: Option<String>,
        /// Facility code of the card (requires --card-number).
        #[arg(long)]
        facility_code: Option<String>,
    },

    /// Suspend a member, or resume with --resume.
    Suspend {
        #[arg(long)]
        member_id: String,
        /// Lift the suspension instead of applying it.
        #[arg(long)]
        resume: bool,
        /// Expected first name; the command refuses on mismatch.
        #[arg(long)]
        first_name: Option<String>,
        /// Expected last name; the command refuses on mismatch.
        #[arg(long)]
        last_name: Option<String>,
    },

    /// Delete a user by Brivo user id. Requires --confirm.
    DeleteUser {
        #[arg(value_parser = parse_remote_id)]
        user_id: RemoteId,
        #[arg(long)]
        confirm: bool,
    },

    /// List the credential ids assigned to a user.
    ListCredentials {
        #[arg(value_parser = parse_remote_id)]
        user_id: RemoteId,
    },

    /// Unassign every credential from a user.
    ClearCredentials {
        #[arg(value_parser = parse_remote_id)]
        user_id: RemoteId,
    },

    /// Remove a user from every group.
    ClearGroups {
        #[arg(value_parser = parse_remote_id)]
        user_id: RemoteId,
    },
}

/// Numeric ids become `RemoteId::Number` so they are echoed back to Brivo
/// as JSON numbers.
fn parse_remote_id(value: &str) -> Result<RemoteId, Infallible> {
    value.parse()
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();
}

/// Reads the persisted token state. A missing file means "not yet authorized".
fn load_token_state(path: &Path) -> io::Result<Option<TokenState>> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map(Some)
            .map_err(io::Error::other),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn save_token_state(path: &Path, state: &TokenState) -> io::Result<()> {
    let content = serde_json::to_string_pretty(state).map_err(io::Error::other)?;
    fs::write(path, content)
}

/// Runs one command and returns the text to print on success.
async fn run(api: &BrivoApi, command: Command) -> brivo_bulk::error::Result<String> {
    match command {
        Command::LoginUrl => Ok(api.start_oauth_link()),
        Command::ExchangeCode { code } => {
            let state = api.exchange_code_for_token(&code).await?;
            Ok(format!("Authorized; token valid until {}", state.expires_after))
        }
        Command::Refresh => {
            let state = api.refresh_token().await?;
            Ok(format!("Token refreshed; valid until {}", state.expires_after))
        }
        Command::Healthcheck => {
            api.healthcheck().await?;
            Ok("Brivo API reachable and credentials valid".to_string())
        }
        Command::CreateUser {
            first_name,
            last_name,
            member_id,
            groups,
            card_number,
            facility_code,
        } => {
            let request = CreateUserRequest {
                first_name,
                last_name,
                member_id,
                group_names: groups
                    .into_iter()
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect(),
                card_number,
                facility_code,
            };
            let user_id = api.create_user(&request).await?;
            Ok(format!("Member {} processed as user {user_id}", request.member_id))
        }
        Command::Suspend {
            member_id,
            resume,
            first_name,
            last_name,
        } => {
            let request = SuspendRequest {
                member_id,
                suspend: !resume,
                first_name,
                last_name,
            };
            api.toggle_member_suspend(&request).await?;
            let verb = if resume { "resumed" } else { "suspended" };
            Ok(format!("Member {} {verb}", request.member_id))
        }
        Command::DeleteUser { user_id, confirm } => {
            api.delete_user(&user_id, confirm).await?;
            Ok(format!("User {user_id} deleted"))
        }
        Command::ListCredentials { user_id } => {
            let ids = api.list_all_user_credentials(&user_id).await?;
            Ok(ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Command::ClearCredentials { user_id } => {
            let removed = api.remove_all_credentials_from_user(&user_id).await?;
            Ok(format!("Removed {removed} credential(s) from user {user_id}"))
        }
        Command::ClearGroups { user_id } => {
            let removed = api.remove_all_groups_from_user(&user_id).await?;
            Ok(format!("Removed user {user_id} from {removed} group(s)"))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let token = match load_token_state(&cli.token_file) {
        Ok(token) => token,
        Err(e) => {
            error!(path = %cli.token_file.display(), error = %e, "could not read token file");
            return ExitCode::FAILURE;
        }
    };

    let credentials = Credentials::new(
        &cli.api_key,
        &cli.client_id,
        &cli.client_secret,
        &cli.redirect_uri,
    );
    let api = BrivoApi::new(credentials, token);

    let outcome = {
        let session = api.session();
        run(&session, cli.command).await
    };

    // Persist even on failure: a refresh may have succeeded before the
    // command itself failed, and the old refresh token is now spent.
    if let Some(state) = api.token_state().await {
        if let Err(e) = save_token_state(&cli.token_file, &state) {
            error!(path = %cli.token_file.display(), error = %e, "could not save token file");
            return ExitCode::FAILURE;
        }
        debug!(path = %cli.token_file.display(), "token state saved");
    }

    match outcome {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
