mod academic_years;
mod api;
mod attendance;
mod auth;
mod classes;
mod cli;
mod config;
mod database;
mod error;
mod export;
mod homerooms;
mod notifications;
mod qr;
mod recap;
mod schema;
mod server;
mod settings;
mod students;
mod teachers;
mod users;

#[cfg(test)]
mod test_support;

use cli::Cli;
use log::{debug, error};

fn main() {
    if let Err(err) = Cli::handle_command_line() {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
    debug!("Exiting cleanly");
}
