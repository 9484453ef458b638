//! `SealRow` CLI for key generation and user record management.

#![warn(clippy::pedantic, clippy::nursery)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sealrow::key_source::{EnvKeySource, KeySource};
use sealrow::keys::{RecipientKey, DEFAULT_KEY_BITS};
use sealrow::policy::{Field, TransitPolicy};
use sealrow::service::{RecordService, ServiceConfig};
use sealrow::validation::{NewUser, Role};
use sealrow_key_file::FileKeySource;
use sealrow_sqlite::SqliteStore;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the recipient public key PEM.
const CLIENT_PUBLIC_KEY_VAR: &str = "SEALROW_CLIENT_PUBLIC_KEY";

#[derive(Parser)]
#[command(name = "sealrow")]
#[command(about = "Encrypted user record store", long_about = None)]
struct Cli {
    #[command(flatten)]
    keys: KeyArgs,

    /// SQLite database file
    #[arg(long, global = true, env = "SEALROW_DATABASE", default_value = "sealrow.db")]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct KeyArgs {
    /// Directory holding public.pem, private.pem and pepper.key
    #[arg(long, global = true, env = "SEALROW_KEY_DIR", default_value = "./keys")]
    key_dir: PathBuf,

    /// Read keys from SEALROW_PUBLIC_KEY / SEALROW_PRIVATE_KEY instead
    #[arg(long, global = true)]
    keys_from_env: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a storage keypair and digest pepper
    Keygen {
        /// Output directory for keys (defaults to --key-dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// RSA modulus size
        #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
        bits: usize,
    },
    /// Add a user
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Admin, Editor or Viewer
        #[arg(long)]
        role: String,
    },
    /// List users, optionally sealed for a recipient
    List {
        /// Only users with this role
        #[arg(long)]
        role: Option<Role>,
        #[command(flatten)]
        transit: TransitArgs,
    },
    /// Look a user up by exact email
    Lookup {
        #[arg(long)]
        email: String,
    },
    /// Delete a user by id
    Delete { id: i64 },
}

#[derive(Args)]
struct TransitArgs {
    /// Seal output under the recipient public key
    #[arg(long)]
    sealed: bool,
    /// Recipient public key PEM file (implies --sealed)
    #[arg(long)]
    recipient_key: Option<PathBuf>,
    /// Also seal created_at
    #[arg(long)]
    seal_created_at: bool,
    /// Leave a field in the clear (repeatable)
    #[arg(long = "plain", value_name = "FIELD")]
    plain: Vec<Field>,
}

impl TransitArgs {
    const fn requested(&self) -> bool {
        self.sealed || self.recipient_key.is_some()
    }

    fn policy(&self) -> TransitPolicy {
        let mut policy = TransitPolicy::default();
        if self.seal_created_at {
            policy = policy.seal(Field::CreatedAt);
        }
        self.plain.iter().fold(policy, |policy, field| policy.pass(*field))
    }

    fn recipient(&self) -> Result<RecipientKey> {
        let pem = match &self.recipient_key {
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?,
            ),
            None => std::env::var(CLIENT_PUBLIC_KEY_VAR).ok(),
        };
        Ok(RecipientKey::from_optional_pem(pem.as_deref())?)
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let client_error =
                err.downcast_ref::<sealrow::error::Error>().is_some_and(|e| e.is_client_error());
            if client_error {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run(cli: Cli) -> Result<()> {
    let Cli { keys, database, command } = cli;

    let service = match command {
        Commands::Keygen { ref output, bits } => {
            let output = output.as_deref().unwrap_or(&keys.key_dir);
            let source = FileKeySource::init(output, bits)
                .with_context(|| format!("initializing {}", output.display()))?;
            println!("{}", source.key_dir().join(sealrow_key_file::PUBLIC_KEY_FILE).display());
            return Ok(());
        }
        Commands::List { ref transit, .. } => open_service(&keys, &database)?
            .with_config(ServiceConfig { transit_policy: transit.policy() }),
        _ => open_service(&keys, &database)?,
    };

    match command {
        Commands::Keygen { .. } => Ok(()),
        Commands::Add { name, email, role } => {
            let user = service.add_user(&NewUser::new(name, email, role))?;
            info!(user_id = user.id, "user added");
            print_json(&user)
        }
        Commands::List { role, transit } => {
            if transit.requested() {
                let recipient = transit.recipient()?;
                print_json(&service.list_users_sealed(&recipient, role)?)
            } else {
                let users = match role {
                    Some(role) => service.list_users_by_role(role)?,
                    None => service.list_users()?,
                };
                print_json(&users)
            }
        }
        Commands::Lookup { email } => match service.find_user_by_email(&email)? {
            Some(user) => print_json(&user),
            None => Err(sealrow::error::Error::NotFound.into()),
        },
        Commands::Delete { id } => {
            service.delete_user(id)?;
            info!(user_id = id, "user deleted");
            Ok(())
        }
    }
}

fn open_service(keys: &KeyArgs, database: &Path) -> Result<RecordService<SqliteStore>> {
    let source: Box<dyn KeySource> = if keys.keys_from_env {
        Box::new(EnvKeySource::default())
    } else {
        Box::new(
            FileKeySource::new(&keys.key_dir)
                .with_context(|| format!("opening key directory {}", keys.key_dir.display()))?,
        )
    };
    let store = SqliteStore::open(database)
        .with_context(|| format!("opening database {}", database.display()))?;
    Ok(RecordService::from_key_source(store, source.as_ref())?)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
