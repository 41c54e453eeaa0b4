pub mod cli;

use std::process::ExitCode;

use clap::Parser;
use common::logger::init_logger;
use session::Credentials;

use cli::*;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logger("sessionctl", &cli.log);

    let config = build_config(&cli);
    let manager = open_manager(&config)?;

    let ok = match cli.command {
        Command::Login { identifier, secret } => {
            let outcome = manager.login(&Credentials::new(identifier, secret)).await;
            match (outcome.session(), outcome.error()) {
                (Some(session), _) => println!("signed in: {}", describe(session)),
                (None, Some(e)) => eprintln!("login failed: {e}"),
                (None, None) => eprintln!("login failed"),
            }
            outcome.is_success()
        }

        Command::Logout => {
            let outcome = manager.logout().await;
            if let Some(e) = &outcome.error {
                eprintln!("remote sign-out failed ({e}); local session cleared");
            }
            if let Some(e) = &outcome.storage_error {
                eprintln!("could not remove the stored session: {e}");
            }
            if outcome.is_success() {
                println!("signed out");
            }
            outcome.storage_error.is_none()
        }

        Command::Status => match manager.current_session() {
            Some(session) if manager.is_authenticated() => {
                println!("authenticated (unverified): {}", describe(&session));
                true
            }
            _ => {
                println!("not authenticated");
                false
            }
        },

        Command::Init => match manager.initialize().await {
            Some(session) => {
                println!("session valid: {}", describe(&session));
                true
            }
            None => {
                println!("no valid session");
                false
            }
        },

        Command::Whoami => {
            // the HTTP adapter only knows tokens it was handed this run
            manager.initialize().await;
            match manager.get_current_user().await {
                Ok(Some(user)) => {
                    println!("{} {}", user.id, user.email.as_deref().unwrap_or(""));
                    true
                }
                Ok(None) => {
                    println!("not signed in");
                    false
                }
                Err(e) => {
                    eprintln!("whoami failed: {e}");
                    false
                }
            }
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
