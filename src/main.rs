//! chatrelay binary entry point.

use std::io::Write;
use std::sync::Arc;

use chatrelay::cli::{ChatArgs, Cli, Commands, ServeArgs};
use chatrelay::config::RelayConfig;
use chatrelay::relay::RelayService;
use chatrelay::session::{ChatSession, HttpTransport, RejectReason, TurnOutcome};
use chatrelay::types::ChatEvent;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Commands::Serve(_) => "info,chatrelay=debug",
        Commands::Chat(_) => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Serve(args) => handle_serve(args).await,
        Commands::Chat(args) => handle_chat(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn handle_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = RelayConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if config.require_api_key().is_err() {
        tracing::warn!("AI_GATEWAY_API_KEY is not set; /chat will answer 500");
    }

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, model = %config.model, "chatrelay listening");

    chatrelay::relay::server::serve(RelayService::new(config), listener).await?;
    Ok(())
}

async fn handle_chat(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(HttpTransport::new(args.endpoint.clone(), args.token.clone())?);
    let session = ChatSession::new(transport, args.chat_config())?;

    session.subscribe(Arc::new(|event: ChatEvent| match event {
        ChatEvent::Delta { text, .. } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        ChatEvent::HistoryPruned { dropped } => {
            eprintln!("[{dropped} older messages trimmed]");
        }
        _ => {}
    }));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let interrupt = {
            let session = session.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    session.cancel().await;
                }
                futures::future::pending::<()>().await
            }
        };

        let outcome = tokio::select! {
            outcome = session.send_turn(line) => outcome,
            () = interrupt => unreachable!("interrupt future never completes"),
        };

        match outcome {
            TurnOutcome::Completed { .. } => println!(),
            TurnOutcome::Cancelled => eprintln!("\n[cancelled]"),
            TurnOutcome::Failed { notice, .. } => eprintln!("\n{notice}"),
            TurnOutcome::Rejected(RejectReason::EmptyInput) => {}
            TurnOutcome::Rejected(RejectReason::Busy) => eprintln!("[still answering]"),
        }
    }
    Ok(())
}
