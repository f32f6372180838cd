use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::info;

use crate::api::state::AppState;
use crate::config::Config;
use crate::database::Database;
use crate::error::AbsensiError;
use crate::users::User;

#[derive(Parser)]
#[command(
    name = "absensi",
    version,
    about = "Absensi: QR-code school attendance server"
)]
pub struct Cli {
    /// Directory holding config.toml, the database and logs
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the server (default if no command specified)
    Serve,

    /// Create an admin account
    CreateAdmin {
        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,
    },
}

impl Cli {
    pub fn handle_command_line() -> Result<(), AbsensiError> {
        let args = Cli::parse();

        let data_dir = match args.data_dir {
            Some(dir) => dir,
            None => Config::project_dirs()?.data_local_dir().to_path_buf(),
        };
        let config = Config::init(Config::load_config(&data_dir));
        let _logger = start_logging(config, &data_dir)?;

        // Default to Serve if no command specified
        match args.command.unwrap_or(Command::Serve) {
            Command::Serve => Self::start_server(config),
            Command::CreateAdmin { username, password } => {
                Self::create_admin(config, &username, &password)
            }
        }
    }

    fn open_database(config: &Config) -> Result<Database, AbsensiError> {
        Database::open(&config.database.path, config.database.pool_size)
    }

    fn start_server(config: &Config) -> Result<(), AbsensiError> {
        info!(
            "Starting server on {}:{}",
            config.server.host, config.server.port
        );

        let db = Self::open_database(config)?;
        let state = AppState::new(db, config);

        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| AbsensiError::Error(format!("Failed to create runtime: {}", e)))?;

        rt.block_on(async {
            let web_server = crate::server::WebServer::new(&config.server);
            web_server.start(state).await
        })
    }

    fn create_admin(config: &Config, username: &str, password: &str) -> Result<(), AbsensiError> {
        let db = Self::open_database(config)?;
        let conn = db.get_connection()?;
        let user_id = User::create_admin(&conn, username, password)?;

        println!(
            "Admin account '{}' created (id: {}) in {}",
            username.trim(),
            user_id,
            db.path().display()
        );
        Ok(())
    }
}

/// Rotating file log under `<data_dir>/logs`, with warnings echoed to stderr.
/// The returned handle must stay alive for buffered records to be flushed.
fn start_logging(config: &Config, data_dir: &Path) -> Result<LoggerHandle, AbsensiError> {
    let spec = format!("absensi={}", config.logging.absensi);

    Logger::try_with_str(&spec)
        .and_then(|logger| {
            logger
                .log_to_file(
                    FileSpec::default()
                        .directory(data_dir.join("logs"))
                        .basename("absensi"),
                )
                .rotate(
                    Criterion::Size(10 * 1024 * 1024),
                    Naming::Timestamps,
                    Cleanup::KeepLogFiles(7),
                )
                .duplicate_to_stderr(Duplicate::Warn)
                .write_mode(WriteMode::BufferAndFlush)
                .start()
        })
        .map_err(|e| AbsensiError::Error(format!("Failed to start logging: {}", e)))
}
