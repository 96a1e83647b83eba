//! Filegate CLI: browse, upload and download files behind an OIDC-protected API
//!
//! Usage:
//!   filegate shell                      Sign in and browse interactively
//!   filegate ls [prefix] [--search s]   List a folder
//!   filegate get <file> [--out dir]     Download a file
//!   filegate put <path> [--prefix p]    Upload a file
//!   filegate config [--init]            Show or create the config file

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::ProgressBar;
use std::future::Future;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use filegate::config::{default_config_path, load_app_config, save_app_config};
use filegate::render::render_view;
use filegate::{
    AppConfig, AuthContext, FileBrowser, IdentityProvider, Navigator, OidcClient, OidcSession, RestFileApi,
    SaveToDirectory, SystemBrowser, ViewState,
};

#[derive(Parser)]
#[command(
    name = "filegate",
    about = "Filegate: browse, upload and download files behind an OIDC-protected API",
    version,
    long_about = "Signs in through the Cognito hosted UI in your browser, then talks to the file API with the issued id token.\nConfiguration: ~/.config/filegate/config.json, FILEGATE_* environment variables, or flags."
)]
struct Cli {
    /// Config file (default: <config dir>/filegate/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// File API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Print sign-in and download URLs instead of opening a browser
    #[arg(long, global = true)]
    no_browser: bool,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and browse interactively
    Shell,
    /// List a folder
    Ls {
        /// Folder prefix (default: root)
        #[arg(default_value = "")]
        prefix: String,
        /// Only show entries containing this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Download a file
    Get {
        /// Full file key, e.g. notes/b.txt
        filename: String,
        /// Save into this directory instead of opening the browser
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Upload a file
    Put {
        /// Local file
        path: PathBuf,
        /// Destination folder prefix (default: root)
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// Show the config file location, or write a template
    Config {
        #[arg(long)]
        init: bool,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run `fut` behind a spinner
async fn with_spinner<F: Future>(message: &str, fut: F) -> F::Output {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    let out = fut.await;
    spinner.finish_and_clear();
    out
}

fn navigator_for(out: Option<&Path>, no_browser: bool) -> Box<dyn Navigator> {
    match out {
        Some(dir) => Box::new(SaveToDirectory::new(dir)),
        None if no_browser => Box::new(SaveToDirectory::new(".")),
        None => Box::new(SystemBrowser),
    }
}

async fn sign_in(config: &AppConfig, no_browser: bool) -> anyhow::Result<OidcSession> {
    let client = OidcClient::new(config.oidc_config()).context("Invalid sign-in configuration")?;
    let mut session = OidcSession::new(client)
        .with_announcer(|url| eprintln!("Open this URL to continue:\n  {}\n", url));
    if no_browser {
        session = session.without_browser();
    }

    eprintln!("Signing in through the hosted UI...");
    if session.sign_in().await.is_err() {
        print!("{}", render_view(&session.context(), &ViewState::default()));
        bail!("Sign-in failed");
    }
    Ok(session)
}

fn print_view(auth: &AuthContext, browser: &FileBrowser) {
    print!("{}", render_view(auth, browser.state()));
}

/// Resolve a shell argument to a folder prefix
fn resolve_folder(state: &ViewState, arg: &str) -> String {
    let wanted = arg.trim_end_matches('/');
    state
        .folders()
        .iter()
        .find(|f| {
            f.prefix.trim_end_matches('/') == wanted || state.display_name(&f.prefix).trim_end_matches('/') == wanted
        })
        .map(|f| f.prefix.clone())
        .unwrap_or_else(|| format!("{}/", wanted))
}

/// Resolve a shell argument to a file key
fn resolve_file(state: &ViewState, arg: &str) -> String {
    state
        .files()
        .iter()
        .find(|f| f.name == arg || state.display_name(&f.name) == arg)
        .map(|f| f.name.clone())
        .unwrap_or_else(|| format!("{}{}", state.current_prefix(), arg))
}

const SHELL_HELP: &str = "\
Commands:
  ls                 Refresh the current folder
  cd <folder>        Open a folder
  root               Back to root
  find [text]        Filter the listing (no text clears the filter)
  get <file> [dir]   Download (browser, or save into dir)
  put <path>         Upload into the current folder
  whoami             Show the signed-in user
  signout            Sign out and exit
  help, quit";

async fn run_shell(config: &AppConfig, no_browser: bool) -> anyhow::Result<()> {
    let mut session = sign_in(config, no_browser).await?;
    let api = RestFileApi::new(&config.api_url)?;
    let mut browser = FileBrowser::new(Box::new(api), navigator_for(None, no_browser));

    let mut auth = session.context();
    with_spinner("Loading items...", browser.on_auth_changed(&auth)).await;
    print_view(&auth, &browser);
    println!("Type `help` for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("filegate:/{}> ", browser.state().current_prefix());
        std::io::stdout().flush().ok();

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let line = line.trim();
        let (cmd, arg) = line.split_once(' ').map(|(c, a)| (c, a.trim())).unwrap_or((line, ""));

        // Tokens can expire mid-session; the API answers 401 and we show it.
        auth = session.context();
        match cmd {
            "" => continue,
            "help" | "?" => {
                println!("{}", SHELL_HELP);
                continue;
            }
            "quit" | "exit" => break,
            "ls" | "refresh" => with_spinner("Loading items...", browser.refresh(&auth)).await,
            "cd" if arg.is_empty() || arg == "/" => {
                with_spinner("Loading items...", browser.back_to_root(&auth)).await
            }
            "cd" => {
                let prefix = resolve_folder(browser.state(), arg);
                with_spinner("Loading items...", browser.list_items(&auth, &prefix)).await
            }
            "root" => with_spinner("Loading items...", browser.back_to_root(&auth)).await,
            "find" | "search" => browser.set_search(arg),
            "get" => {
                let (name, dir) = arg.split_once(' ').map(|(n, d)| (n, Some(d.trim()))).unwrap_or((arg, None));
                if name.is_empty() {
                    println!("usage: get <file> [dir]");
                    continue;
                }
                let key = resolve_file(browser.state(), name);
                match dir {
                    Some(dir) => {
                        let api = RestFileApi::new(&config.api_url)?;
                        let mut saver = FileBrowser::new(Box::new(api), Box::new(SaveToDirectory::new(dir)));
                        with_spinner("Downloading...", saver.request_download(&auth, &key)).await;
                        if let Some(msg) = saver.state().download_message() {
                            println!("{}", msg.text());
                        }
                        continue;
                    }
                    None => with_spinner("Downloading...", browser.request_download(&auth, &key)).await,
                }
            }
            "put" => {
                if arg.is_empty() {
                    println!("usage: put <path>");
                    continue;
                }
                with_spinner("Uploading...", browser.upload_file(&auth, arg)).await
            }
            "whoami" => {
                match auth.user {
                    Some(ref user) => println!("{} ({})", user.display_name(), user.profile.sub),
                    None => println!("Not signed in"),
                }
                continue;
            }
            "signout" | "logout" => {
                session.sign_out().await?;
                browser.on_auth_changed(&session.context()).await;
                println!("Signed out.");
                return Ok(());
            }
            other => {
                println!("Unknown command '{}'. Type `help`.", other);
                continue;
            }
        }
        print_view(&auth, &browser);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Config { init } = cli.command {
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        if init {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            save_app_config(&path, &AppConfig::default())?;
            println!("Wrote template to {}", path.display());
        } else {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let mut config = load_app_config(cli.config.as_deref())?;
    if let Some(ref url) = cli.api_url {
        config.api_url = url.clone();
    }
    config.validate()?;

    match cli.command {
        Commands::Shell => run_shell(&config, cli.no_browser).await,
        Commands::Ls { prefix, search } => {
            let session = sign_in(&config, cli.no_browser).await?;
            let auth = session.context();
            let mut browser = FileBrowser::new(Box::new(RestFileApi::new(&config.api_url)?), Box::new(SystemBrowser));
            if prefix.is_empty() {
                with_spinner("Loading items...", browser.on_auth_changed(&auth)).await;
            } else {
                with_spinner("Loading items...", browser.list_items(&auth, &prefix)).await;
            }
            if let Some(search) = search {
                browser.set_search(search);
            }
            print_view(&auth, &browser);
            if browser.state().error.is_some() {
                bail!("Listing failed");
            }
            Ok(())
        }
        Commands::Get { filename, out } => {
            let session = sign_in(&config, cli.no_browser).await?;
            let auth = session.context();
            let mut browser = FileBrowser::new(
                Box::new(RestFileApi::new(&config.api_url)?),
                navigator_for(out.as_deref(), cli.no_browser),
            );
            with_spinner("Downloading...", browser.request_download(&auth, &filename)).await;
            match browser.state().download_message() {
                Some(msg) if msg.is_error() => bail!("{}", msg.text()),
                Some(msg) => println!("{}", msg.text()),
                None => {}
            }
            Ok(())
        }
        Commands::Put { path, prefix } => {
            let session = sign_in(&config, cli.no_browser).await?;
            let auth = session.context();
            let mut browser = FileBrowser::new(Box::new(RestFileApi::new(&config.api_url)?), Box::new(SystemBrowser));
            with_spinner("Loading items...", browser.list_items(&auth, &prefix)).await;
            if let Some(ref error) = browser.state().error {
                bail!("{}", error);
            }
            with_spinner("Uploading...", browser.upload_file(&auth, &path)).await;
            print_view(&auth, &browser);
            match browser.state().upload_message() {
                Some(msg) if msg.is_error() => bail!("Upload failed"),
                _ => Ok(()),
            }
        }
        Commands::Config { .. } => Ok(()),
    }
}
