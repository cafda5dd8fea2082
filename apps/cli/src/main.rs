use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use parley_auth::{PasscodeStep, CODE_LENGTH};
use parley_config::load as load_config;
use parley_runtime::{telemetry, ChatClient, SyncPhase};
use parley_transport::{Credential, Message, RemoteTransport, TransportError};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::info;

type Client = ChatClient<RemoteTransport>;
type Input = Lines<BufReader<Stdin>>;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley chat client (console by default)")]
struct Cli {
    /// Access token from an earlier login
    #[arg(long, global = true, env = "PARLEY_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with an emailed one-time code and print the access token
    Login { email: String },
    /// List chats visible to the signed-in user
    Chats,
    /// Follow a conversation until Ctrl+C
    Watch { conversation: Option<String> },
    /// Send one message to a conversation
    Send {
        conversation: String,
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Start interactive console (default)
    Console,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing().context("failed to initialise tracing")?;

    let config = load_config().context("failed to load configuration")?;
    let mut client = parley_runtime::connect(&config)
        .await
        .context("failed to start client")?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    if let Some(token) = cli.token {
        client
            .restore_credential(Credential::new(token))
            .await
            .context("server rejected the supplied token")?;
    }

    match cli.command.unwrap_or(Commands::Console) {
        Commands::Login { email } => {
            let credential = login(&mut client, &email, &mut input).await?;
            println!("{}", credential.access);
            Ok(())
        }
        Commands::Chats => list_chats(&client).await,
        Commands::Watch { conversation } => {
            require_login(&client)?;
            let conversation = conversation
                .or_else(|| client.default_conversation().map(|id| id.to_string()))
                .context("no conversation given and none configured")?;
            watch(&mut client, conversation).await
        }
        Commands::Send { conversation, text } => {
            require_login(&client)?;
            send_once(&mut client, conversation, &text.join(" ")).await
        }
        Commands::Console => run_console(&mut client, &mut input).await,
    }
}

fn require_login(client: &Client) -> anyhow::Result<()> {
    if !client.is_authenticated() {
        bail!("not signed in; run `parley login <email>` or pass --token");
    }
    Ok(())
}

fn prompt(text: &str) -> anyhow::Result<()> {
    print!("{text}");
    std::io::Write::flush(&mut std::io::stdout())?;
    Ok(())
}

fn print_message(message: &Message) {
    let time = message
        .timestamp
        .map(|timestamp| timestamp.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let author = message.author_email().unwrap_or("unknown");
    println!("[{time}] {author}: {}", message.text);
}

async fn login(client: &mut Client, email: &str, input: &mut Input) -> anyhow::Result<Credential> {
    client.submit_email(email).await;
    if client.passcode().step() != PasscodeStep::CollectCode {
        match client.passcode().last_error() {
            Some(error) => bail!("{error}"),
            None => bail!("could not request a one-time code"),
        }
    }
    println!("A {CODE_LENGTH}-digit code was sent to {email}");

    loop {
        prompt("code> ")?;
        let Some(line) = input.next_line().await? else {
            bail!("no code entered");
        };

        let mut issued = None;
        for (index, digit) in line.trim().chars().take(CODE_LENGTH).enumerate() {
            if let Some(credential) = client.submit_digit(index, &digit.to_string()).await {
                issued = Some(credential);
            }
        }
        if issued.is_none() && client.passcode().code().is_some() {
            issued = client.submit_code().await;
        }

        if let Some(credential) = issued {
            info!("signed in");
            return Ok(credential);
        }
        if client.passcode().step() == PasscodeStep::Authenticated {
            bail!("signed in, but the server did not accept the channel");
        }
        match client.passcode().last_error() {
            Some(error) => println!("{error}"),
            None => println!("Enter all {CODE_LENGTH} digits"),
        }
    }
}

async fn list_chats(client: &Client) -> anyhow::Result<()> {
    require_login(client)?;
    let chats = client.list_chats().await.context("failed to list chats")?;
    if chats.is_empty() {
        println!("No chats found");
    } else {
        println!("Chats:");
        for chat in chats {
            println!("  {} - {}", chat.id, chat.title);
        }
    }
    Ok(())
}

async fn send_once(client: &mut Client, conversation: String, text: &str) -> anyhow::Result<()> {
    client.enter_conversation(conversation.as_str());
    match client.send_message(text).await {
        Ok(Some(ack)) => println!("sent {}", ack.message_id),
        Ok(None) => println!("Nothing to send"),
        Err(error) => {
            return Err(error).with_context(|| format!("failed to send to {conversation}"))
        }
    }
    client.leave_conversation();
    Ok(())
}

fn refresh_ticker(client: &Client) -> Option<Interval> {
    client.refresh_interval().map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    })
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Print messages that arrived since `printed`, returning the new count.
fn print_new(client: &Client, printed: usize) -> usize {
    let messages = client.ordered_messages();
    for message in messages.iter().skip(printed) {
        print_message(message);
    }
    messages.len()
}

fn check_phase(client: &Client) -> anyhow::Result<()> {
    match client.conversation_phase() {
        SyncPhase::Error(TransportError::NotFound(what)) => bail!("conversation not found: {what}"),
        SyncPhase::Error(error) => bail!("conversation sync failed: {error}"),
        _ => Ok(()),
    }
}

async fn watch(client: &mut Client, conversation: String) -> anyhow::Result<()> {
    client.enter_conversation(conversation.as_str());
    client.settle().await;
    check_phase(client)?;
    let mut printed = print_new(client, 0);
    println!("--- watching {conversation}, Ctrl+C to stop");

    let mut ticker = refresh_ticker(client);
    let shutdown = parley_runtime::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = tick(&mut ticker) => {
                client.refresh_conversation();
            }
            update = client.next_event() => {
                if update.is_none() {
                    break;
                }
                check_phase(client)?;
                printed = print_new(client, printed);
            }
        }
    }

    client.leave_conversation();
    Ok(())
}

async fn open(client: &mut Client, conversation: &str) -> usize {
    client.enter_conversation(conversation);
    client.settle().await;
    if let Err(error) = check_phase(client) {
        println!("{error}");
        return 0;
    }
    println!("--- {conversation}");
    print_new(client, 0)
}

async fn run_console(client: &mut Client, input: &mut Input) -> anyhow::Result<()> {
    info!("starting interactive console");

    println!("Parley Interactive Console");
    println!("Type '/help' for commands; any other line is sent to the open chat");
    println!("Use Ctrl+C or '/quit' to exit");
    println!("---");

    let mut printed = 0;
    if client.is_authenticated() {
        if let Some(conversation) = client.default_conversation().map(|id| id.to_string()) {
            printed = open(client, &conversation).await;
        }
    }

    let mut ticker = refresh_ticker(client);
    let shutdown = parley_runtime::shutdown_signal();
    tokio::pin!(shutdown);

    let mut show_prompt = true;
    loop {
        if show_prompt {
            prompt("> ")?;
            show_prompt = false;
        }
        let line = tokio::select! {
            _ = &mut shutdown => break,
            _ = tick(&mut ticker) => {
                client.refresh_conversation();
                continue;
            }
            update = client.next_event() => {
                if update.is_some_and(|update| update.changed_messages()) {
                    println!();
                    printed = print_new(client, printed);
                    show_prompt = true;
                }
                continue;
            }
            line = input.next_line() => line?,
        };
        let Some(line) = line else {
            break; // EOF
        };
        show_prompt = true;

        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        let (name, argument) = command
            .split_once(' ')
            .map(|(name, rest)| (name, rest.trim()))
            .unwrap_or((command, ""));

        match name {
            "/quit" | "/exit" | "/q" => {
                println!("Goodbye!");
                break;
            }
            "/help" | "/h" => {
                println!("Available commands:");
                println!("  /help, /h           - Show this help");
                println!("  /login <email>      - Sign in with a one-time code");
                println!("  /chats, /c          - List chats");
                println!("  /open <id>, /o      - Open a chat");
                println!("  /refresh, /r        - Refetch the open chat");
                println!("  /leave              - Close the open chat");
                println!("  /logout             - Sign out");
                println!("  /quit, /exit, /q    - Exit console");
            }
            "/login" => {
                if argument.is_empty() {
                    println!("Usage: /login <email>");
                    continue;
                }
                match login(client, argument, input).await {
                    Ok(_) => {
                        println!("Signed in");
                        if let Some(conversation) =
                            client.default_conversation().map(|id| id.to_string())
                        {
                            printed = open(client, &conversation).await;
                        }
                    }
                    Err(error) => println!("Login failed: {error:#}"),
                }
            }
            "/chats" | "/c" => {
                if let Err(error) = list_chats(client).await {
                    println!("{error:#}");
                }
            }
            "/open" | "/o" => {
                if argument.is_empty() {
                    println!("Usage: /open <id>");
                } else if let Err(error) = require_login(client) {
                    println!("{error}");
                } else {
                    printed = open(client, argument).await;
                }
            }
            "/refresh" | "/r" => {
                if !client.refresh_conversation() {
                    println!("Nothing to refresh");
                }
            }
            "/leave" => {
                client.leave_conversation();
                printed = 0;
            }
            "/logout" => {
                client.logout();
                printed = 0;
                println!("Signed out");
            }
            _ if name.starts_with('/') => {
                println!("Unknown command '{name}', type '/help'");
            }
            _ => match client.send_message(command).await {
                Ok(_) => {}
                Err(error) => println!("Send failed: {error}"),
            },
        }
    }

    client.leave_conversation();
    Ok(())
}
